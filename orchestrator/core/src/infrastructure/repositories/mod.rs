// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the store contracts defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve agent records and memories
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **InMemoryAgentRepository** - Thread-safe HashMap-backed agent records
//! - **InMemoryMemoryRepository** - Append-only per-agent history
//!
//! Both are ephemeral; a durable store plugs in behind the same traits.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::agent::{AgentId, AgentRecord, AgentState};
use crate::domain::memory::{Memory, MemoryRole};
use crate::domain::repository::{AgentRepository, MemoryRepository, Repositories, RepositoryError};

fn poisoned() -> RepositoryError {
    RepositoryError::Unknown("Lock poisoned".to_string())
}

#[derive(Clone, Default)]
pub struct InMemoryAgentRepository {
    agents: Arc<RwLock<HashMap<AgentId, AgentRecord>>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn save(&self, record: &AgentRecord) -> Result<(), RepositoryError> {
        let mut agents = self.agents.write().map_err(|_| poisoned())?;
        agents.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<AgentRecord>, RepositoryError> {
        let agents = self.agents.read().map_err(|_| poisoned())?;
        Ok(agents.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<AgentRecord>, RepositoryError> {
        let agents = self.agents.read().map_err(|_| poisoned())?;
        let mut records: Vec<AgentRecord> = agents.values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn update_state(
        &self,
        id: AgentId,
        state: AgentState,
        last_error: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut agents = self.agents.write().map_err(|_| poisoned())?;
        let record = agents
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Agent {}", id)))?;
        record.state = state;
        record.last_error = last_error;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn update_config(
        &self,
        id: AgentId,
        provider: &str,
        model: &str,
    ) -> Result<(), RepositoryError> {
        let mut agents = self.agents.write().map_err(|_| poisoned())?;
        let record = agents
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Agent {}", id)))?;
        record.provider = provider.to_string();
        record.model = model.to_string();
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: AgentId) -> Result<(), RepositoryError> {
        let mut agents = self.agents.write().map_err(|_| poisoned())?;
        agents.remove(&id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMemoryRepository {
    memories: Arc<RwLock<HashMap<AgentId, Vec<Memory>>>>,
}

impl InMemoryMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryRepository for InMemoryMemoryRepository {
    async fn append(&self, memory: &Memory) -> Result<(), RepositoryError> {
        let mut memories = self.memories.write().map_err(|_| poisoned())?;
        memories
            .entry(memory.agent_id)
            .or_default()
            .push(memory.clone());
        Ok(())
    }

    async fn list_recent(
        &self,
        agent_id: AgentId,
        limit: usize,
    ) -> Result<Vec<Memory>, RepositoryError> {
        let memories = self.memories.read().map_err(|_| poisoned())?;
        let history = memories.get(&agent_id).map(Vec::as_slice).unwrap_or_default();
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }

    async fn first_system(&self, agent_id: AgentId) -> Result<Option<Memory>, RepositoryError> {
        let memories = self.memories.read().map_err(|_| poisoned())?;
        Ok(memories
            .get(&agent_id)
            .and_then(|history| history.iter().find(|m| m.role == MemoryRole::System))
            .cloned())
    }

    async fn count(&self, agent_id: AgentId) -> Result<usize, RepositoryError> {
        let memories = self.memories.read().map_err(|_| poisoned())?;
        Ok(memories.get(&agent_id).map(Vec::len).unwrap_or(0))
    }

    async fn delete_for_agent(&self, agent_id: AgentId) -> Result<(), RepositoryError> {
        let mut memories = self.memories.write().map_err(|_| poisoned())?;
        memories.remove(&agent_id);
        Ok(())
    }
}

/// In-memory store handles, for development and tests.
pub fn in_memory() -> Repositories {
    Repositories::new(
        Arc::new(InMemoryAgentRepository::new()),
        Arc::new(InMemoryMemoryRepository::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::memory::MemorySource;

    #[tokio::test]
    async fn test_agent_record_crud() {
        let repo = InMemoryAgentRepository::new();
        let record = AgentRecord::new("scout", "ollama", "llama3.2", "");
        repo.save(&record).await.unwrap();

        repo.update_state(record.id, AgentState::Errored, Some("boom".to_string()))
            .await
            .unwrap();
        repo.update_config(record.id, "openai", "gpt-4o").await.unwrap();

        let stored = repo.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.state, AgentState::Errored);
        assert_eq!(stored.last_error.as_deref(), Some("boom"));
        assert_eq!(stored.provider, "openai");

        repo.delete(record.id).await.unwrap();
        assert!(repo.find_by_id(record.id).await.unwrap().is_none());
        assert!(matches!(
            repo.update_state(record.id, AgentState::Idle, None).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_recent_is_chronological_tail() {
        let repo = InMemoryMemoryRepository::new();
        let agent_id = AgentId::new();
        repo.append(&Memory::system(agent_id, "prompt")).await.unwrap();
        for n in 0..5 {
            repo.append(&Memory::new(
                agent_id,
                MemoryRole::User,
                MemorySource::Direct,
                format!("msg-{}", n),
            ))
            .await
            .unwrap();
        }

        let recent = repo.list_recent(agent_id, 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg-2", "msg-3", "msg-4"]);

        let system = repo.first_system(agent_id).await.unwrap().unwrap();
        assert_eq!(system.content, "prompt");
        assert_eq!(repo.count(agent_id).await.unwrap(), 6);

        repo.delete_for_agent(agent_id).await.unwrap();
        assert_eq!(repo.count(agent_id).await.unwrap(), 0);
        assert!(repo.list_recent(agent_id, 3).await.unwrap().is_empty());
    }
}
