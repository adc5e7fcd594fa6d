// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the two record kinds the swarm keeps. Interfaces
//! are defined in the domain layer and implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|----------------|
//! | `AgentRepository` | `AgentRecord` | `InMemoryAgentRepository` |
//! | `MemoryRepository` | `Memory` | `InMemoryMemoryRepository` |
//!
//! The core never retries a failed store call; errors propagate to the caller.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::agent::{AgentId, AgentRecord, AgentState};
use crate::domain::memory::Memory;

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Save agent record (create or update)
    async fn save(&self, record: &AgentRecord) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: AgentId) -> Result<Option<AgentRecord>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<AgentRecord>, RepositoryError>;

    async fn update_state(
        &self,
        id: AgentId,
        state: AgentState,
        last_error: Option<String>,
    ) -> Result<(), RepositoryError>;

    async fn update_config(
        &self,
        id: AgentId,
        provider: &str,
        model: &str,
    ) -> Result<(), RepositoryError>;

    async fn delete(&self, id: AgentId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MemoryRepository: Send + Sync {
    async fn append(&self, memory: &Memory) -> Result<(), RepositoryError>;

    /// Most recent `limit` records for an agent, oldest first.
    async fn list_recent(
        &self,
        agent_id: AgentId,
        limit: usize,
    ) -> Result<Vec<Memory>, RepositoryError>;

    /// The earliest system record, i.e. the agent's original system prompt.
    async fn first_system(&self, agent_id: AgentId) -> Result<Option<Memory>, RepositoryError>;

    async fn count(&self, agent_id: AgentId) -> Result<usize, RepositoryError>;

    async fn delete_for_agent(&self, agent_id: AgentId) -> Result<(), RepositoryError>;
}

/// Store handles shared by the Commander and every Agent.
#[derive(Clone)]
pub struct Repositories {
    pub agents: Arc<dyn AgentRepository>,
    pub memories: Arc<dyn MemoryRepository>,
}

impl Repositories {
    pub fn new(agents: Arc<dyn AgentRepository>, memories: Arc<dyn MemoryRepository>) -> Self {
        Self { agents, memories }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
