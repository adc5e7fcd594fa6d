// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::llm::LLMError;
use crate::domain::repository::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a Mysis.
///
/// `Idle` is the initial state and also the state an agent settles into when
/// the nudge policy gives up on it. Only `Running` owns a run token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    #[default]
    Idle,
    Running,
    Stopped,
    Errored,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Running => "running",
            AgentState::Stopped => "stopped",
            AgentState::Errored => "errored",
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted agent record, owned by the store.
///
/// Runtime-only fields (run token, activity, server tick) live on the
/// in-memory `Agent` and never reach the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub state: AgentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            name: name.into(),
            provider: provider.into(),
            model: model.into(),
            system_prompt: system_prompt.into(),
            state: AgentState::Idle,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Errors returned by agent operations.
///
/// `AlreadyRunning` and `NotRunning` are usage errors and never change state.
/// `Cancelled` marks a turn that ended because its run was stopped.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent is already running")]
    AlreadyRunning,

    #[error("Agent is not running")]
    NotRunning,

    #[error("Turn cancelled by stop")]
    Cancelled,

    #[error("Provider error: {0}")]
    Provider(#[from] LLMError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_roundtrip() {
        let id = AgentId::new();
        let parsed = AgentId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(AgentId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_new_record_starts_idle() {
        let record = AgentRecord::new("scout", "ollama", "llama3.2", "You are a scout.");
        assert_eq!(record.state, AgentState::Idle);
        assert!(record.last_error.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&AgentState::Errored).unwrap();
        assert_eq!(json, "\"errored\"");
    }
}
