// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use mysis_core::domain::agent::{AgentError, AgentId};
use mysis_core::domain::llm::LLMError;
use mysis_core::domain::repository::RepositoryError;

/// Errors returned by swarm-level operations.
#[derive(Debug, thiserror::Error)]
pub enum CommanderError {
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Swarm is at capacity ({max} agents)")]
    CapacityExceeded { max: usize },

    #[error("No running agents to receive the broadcast")]
    NoRunningAgents,

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Provider resolution failed: {0}")]
    Provider(#[from] LLMError),

    #[error("Invalid request: {0}")]
    Config(String),

    /// Delivery failed for some recipients; the rest received the message.
    #[error("Broadcast failed for {} agent(s)", failures.len())]
    Broadcast { failures: Vec<(AgentId, AgentError)> },
}

impl CommanderError {
    /// Agents the broadcast did not reach, if this is a broadcast failure.
    pub fn failed_agents(&self) -> Vec<AgentId> {
        match self {
            CommanderError::Broadcast { failures } => failures.iter().map(|(id, _)| *id).collect(),
            _ => Vec::new(),
        }
    }
}
