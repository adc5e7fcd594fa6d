// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Commander
//!
//! Registry and coordinator for every agent in the swarm.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Capacity-bounded create/delete, broadcast, aggregate tick
//!   and orderly shutdown
//!
//! The registry lock is a `parking_lot::RwLock` and is only ever held to copy
//! or mutate the map. Anything that awaits works on cloned `Arc<Agent>`s.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use mysis_core::application::agent::{Agent, AgentDeps};
use mysis_core::domain::account::AccountLeaser;
use mysis_core::domain::agent::{AgentError, AgentId, AgentRecord, AgentState};
use mysis_core::domain::events::Event;
use mysis_core::domain::memory::{Memory, MemorySource};
use mysis_core::domain::repository::Repositories;
use mysis_core::domain::swarm_config::AgentRuntimeConfig;
use mysis_core::domain::tick::aggregate_tick;
use mysis_core::infrastructure::event_bus::{AgentEventReceiver, EventBus, EventReceiver};
use mysis_core::infrastructure::llm::ProviderRegistry;

use crate::domain::CommanderError;

/// Parameters for a new agent. Empty provider or model fall back to the
/// registry defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
}

pub struct Commander {
    agents: RwLock<HashMap<AgentId, Arc<Agent>>>,
    max_agents: usize,
    registry: Arc<ProviderRegistry>,
    repos: Repositories,
    event_bus: EventBus,
    settings: AgentRuntimeConfig,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    leaser: Option<Arc<dyn AccountLeaser>>,
}

impl Commander {
    pub fn new(
        max_agents: usize,
        registry: Arc<ProviderRegistry>,
        repos: Repositories,
        event_bus: EventBus,
        settings: AgentRuntimeConfig,
    ) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            max_agents,
            registry,
            repos,
            event_bus,
            settings,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            leaser: None,
        }
    }

    /// Lease a game account to each agent for the duration of its runs.
    pub fn with_account_leaser(mut self, leaser: Arc<dyn AccountLeaser>) -> Self {
        self.leaser = Some(leaser);
        self
    }

    fn agent_deps(&self) -> AgentDeps {
        AgentDeps {
            repos: self.repos.clone(),
            event_bus: self.event_bus.clone(),
            settings: self.settings.clone(),
            tracker: self.tracker.clone(),
            shutdown: self.shutdown.clone(),
            leaser: self.leaser.clone(),
        }
    }

    pub async fn create_agent(&self, request: CreateAgentRequest) -> Result<Arc<Agent>, CommanderError> {
        if request.name.trim().is_empty() {
            return Err(CommanderError::Config("Agent name must not be empty".to_string()));
        }
        // Cheap early rejection; the authoritative check happens at insert
        if self.agent_count() >= self.max_agents {
            return Err(CommanderError::CapacityExceeded { max: self.max_agents });
        }

        let resolved = self.registry.resolve(&request.provider, &request.model)?;
        let record = AgentRecord::new(
            request.name.as_str(),
            resolved.provider_name.as_str(),
            resolved.model.as_str(),
            request.system_prompt.as_str(),
        );
        self.repos.agents.save(&record).await?;
        if !record.system_prompt.is_empty() {
            let prompt = Memory::system(record.id, record.system_prompt.as_str());
            if let Err(e) = self.repos.memories.append(&prompt).await {
                self.discard_stored(record.id).await;
                return Err(e.into());
            }
        }

        let agent = Arc::new(Agent::new(&record, resolved.provider, self.agent_deps()));
        let inserted = {
            let mut agents = self.agents.write();
            if agents.len() < self.max_agents {
                agents.insert(record.id, Arc::clone(&agent));
                true
            } else {
                false
            }
        };
        if !inserted {
            self.discard_stored(record.id).await;
            return Err(CommanderError::CapacityExceeded { max: self.max_agents });
        }

        info!(
            agent_id = %record.id,
            agent = %record.name,
            provider = %record.provider,
            model = %record.model,
            "Agent created"
        );
        metrics::counter!("mysis_agents_created_total").increment(1);
        metrics::gauge!("mysis_agents").set(self.agent_count() as f64);
        self.event_bus.publish(Event::created(
            record.id,
            &record.name,
            &record.provider,
            &record.model,
        ));

        Ok(agent)
    }

    /// Remove an agent, stopping it first if it is Running.
    pub async fn delete_agent(&self, id: AgentId) -> Result<(), CommanderError> {
        let agent = self
            .agents
            .write()
            .remove(&id)
            .ok_or(CommanderError::AgentNotFound(id))?;

        match agent.stop().await {
            Ok(()) | Err(AgentError::NotRunning) => {}
            Err(e) => warn!(agent_id = %id, error = %e, "Stop during delete failed"),
        }

        self.repos.memories.delete_for_agent(id).await?;
        self.repos.agents.delete(id).await?;
        agent.close_provider().await;

        info!(agent_id = %id, agent = %agent.name(), "Agent deleted");
        metrics::gauge!("mysis_agents").set(self.agent_count() as f64);
        self.event_bus.publish(Event::deleted(id, agent.name()));
        Ok(())
    }

    pub async fn start_agent(&self, id: AgentId) -> Result<(), CommanderError> {
        self.get_agent(id)?.start().await?;
        Ok(())
    }

    pub async fn stop_agent(&self, id: AgentId) -> Result<(), CommanderError> {
        self.get_agent(id)?.stop().await?;
        Ok(())
    }

    /// Deliver a direct message and wait for the turn to finish.
    pub async fn send_message(&self, id: AgentId, content: &str) -> Result<(), CommanderError> {
        self.get_agent(id)?
            .send_message(content, MemorySource::Direct)
            .await?;
        Ok(())
    }

    /// Validate, then deliver a direct message in the background.
    pub fn send_message_async(&self, id: AgentId, content: &str) -> Result<(), CommanderError> {
        let agent = self.get_agent(id)?;
        if !agent.is_running() {
            return Err(AgentError::NotRunning.into());
        }

        let event_bus = self.event_bus.clone();
        let content = content.to_string();
        self.tracker.spawn(async move {
            if let Err(e) = agent.send_message(&content, MemorySource::Direct).await {
                report_delivery_failure(&event_bus, &agent, e);
            }
        });
        Ok(())
    }

    /// Deliver to every Running agent concurrently and wait for all turns.
    pub async fn broadcast(&self, content: &str) -> Result<(), CommanderError> {
        let targets = self.running_agents();
        if targets.is_empty() {
            return Err(CommanderError::NoRunningAgents);
        }

        info!(recipients = targets.len(), "Broadcasting to swarm");
        self.event_bus.publish(Event::broadcast(content));

        let results = join_all(
            targets
                .iter()
                .map(|agent| agent.send_message(content, MemorySource::Broadcast)),
        )
        .await;

        let failures: Vec<(AgentId, AgentError)> = targets
            .iter()
            .zip(results)
            .filter_map(|(agent, result)| result.err().map(|e| (agent.id(), e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            warn!(failed = failures.len(), "Broadcast not delivered to every agent");
            Err(CommanderError::Broadcast { failures })
        }
    }

    pub fn broadcast_async(&self, content: &str) -> Result<(), CommanderError> {
        let targets = self.running_agents();
        if targets.is_empty() {
            return Err(CommanderError::NoRunningAgents);
        }

        self.event_bus.publish(Event::broadcast(content));
        for agent in targets {
            let event_bus = self.event_bus.clone();
            let content = content.to_string();
            self.tracker.spawn(async move {
                if let Err(e) = agent.send_message(&content, MemorySource::Broadcast).await {
                    report_delivery_failure(&event_bus, &agent, e);
                }
            });
        }
        Ok(())
    }

    /// Point a non-Running agent at a different provider or model.
    pub async fn configure_agent(
        &self,
        id: AgentId,
        provider: &str,
        model: &str,
    ) -> Result<(), CommanderError> {
        let agent = self.get_agent(id)?;
        if agent.is_running() {
            return Err(AgentError::AlreadyRunning.into());
        }

        let resolved = self.registry.resolve(provider, model)?;
        agent.set_provider(&resolved.provider_name, &resolved.model, resolved.provider)?;
        self.repos
            .agents
            .update_config(id, &resolved.provider_name, &resolved.model)
            .await?;

        info!(
            agent_id = %id,
            provider = %resolved.provider_name,
            model = %resolved.model,
            "Agent reconfigured"
        );
        self.event_bus.publish(Event::config_changed(
            id,
            agent.name(),
            &resolved.provider_name,
            &resolved.model,
        ));
        Ok(())
    }

    /// Rebuild agents from the store. Returns how many were loaded.
    ///
    /// Records persisted as Running come back Idle. Records whose provider
    /// no longer resolves are skipped.
    pub async fn load_agents(&self) -> Result<usize, CommanderError> {
        let records = self.repos.agents.list_all().await?;
        let mut loaded = 0;

        for record in records {
            if self.agents.read().contains_key(&record.id) {
                continue;
            }
            if self.agent_count() >= self.max_agents {
                warn!(max_agents = self.max_agents, "Capacity reached, remaining stored agents not loaded");
                break;
            }

            let resolved = match self.registry.resolve(&record.provider, &record.model) {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(agent_id = %record.id, error = %e, "Skipping stored agent");
                    continue;
                }
            };

            if record.state == AgentState::Running {
                self.repos
                    .agents
                    .update_state(record.id, AgentState::Idle, record.last_error.clone())
                    .await?;
            }

            let agent = Arc::new(Agent::new(&record, resolved.provider, self.agent_deps()));
            self.agents.write().insert(record.id, agent);
            loaded += 1;
        }

        info!(loaded, "Loaded stored agents");
        Ok(loaded)
    }

    /// Highest world tick reported by any agent, 0 when none has one.
    pub fn aggregate_tick(&self) -> i64 {
        let agents = self.list_agents();
        aggregate_tick(agents.iter().map(|agent| agent.last_server_tick()))
    }

    pub fn get_agent(&self, id: AgentId) -> Result<Arc<Agent>, CommanderError> {
        self.agents
            .read()
            .get(&id)
            .cloned()
            .ok_or(CommanderError::AgentNotFound(id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents
            .read()
            .values()
            .find(|agent| agent.name() == name)
            .cloned()
    }

    /// All agents, oldest first.
    pub fn list_agents(&self) -> Vec<Arc<Agent>> {
        let mut agents: Vec<Arc<Agent>> = self.agents.read().values().cloned().collect();
        agents.sort_by_key(|agent| agent.created_at());
        agents
    }

    pub fn agent_count(&self) -> usize {
        self.agents.read().len()
    }

    pub fn running_count(&self) -> usize {
        self.running_agents().len()
    }

    pub fn max_agents(&self) -> usize {
        self.max_agents
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    pub fn subscribe_agent(&self, id: AgentId) -> AgentEventReceiver {
        self.event_bus.subscribe_agent(id)
    }

    /// Cancelled when the swarm shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Tracker owning every background turn of the swarm.
    pub fn task_tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    pub fn spawn_tracked<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Stop every Running agent, wait for background work, close the bus.
    pub async fn shutdown(&self, timeout: Duration) {
        let running = self.running_agents();
        info!(running = running.len(), "Shutting down swarm");

        let results = join_all(running.iter().map(|agent| agent.stop())).await;
        for (agent, result) in running.iter().zip(results) {
            match result {
                Ok(()) | Err(AgentError::NotRunning) => {}
                Err(e) => warn!(agent_id = %agent.id(), error = %e, "Stop during shutdown failed"),
            }
        }

        self.shutdown.cancel();
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(
                pending = self.tracker.len(),
                "Background tasks still running at shutdown timeout"
            );
        }

        self.event_bus.close();
        info!("Swarm shut down");
    }

    fn running_agents(&self) -> Vec<Arc<Agent>> {
        self.agents
            .read()
            .values()
            .filter(|agent| agent.is_running())
            .cloned()
            .collect()
    }

    async fn discard_stored(&self, id: AgentId) {
        if let Err(e) = self.repos.memories.delete_for_agent(id).await {
            warn!(agent_id = %id, error = %e, "Failed to discard memories of rejected agent");
        }
        if let Err(e) = self.repos.agents.delete(id).await {
            warn!(agent_id = %id, error = %e, "Failed to discard record of rejected agent");
        }
    }
}

/// Surface a background delivery failure on the bus.
///
/// Provider failures already produced an Error event from the agent, and
/// cancellations are the expected outcome of a stop.
fn report_delivery_failure(event_bus: &EventBus, agent: &Agent, error: AgentError) {
    match error {
        AgentError::Cancelled | AgentError::Provider(_) => {
            debug!(agent_id = %agent.id(), error = %error, "Background delivery ended");
        }
        other => {
            warn!(agent_id = %agent.id(), error = %other, "Background delivery failed");
            event_bus.publish(Event::error(
                agent.id(),
                agent.name(),
                format!("Message delivery failed: {}", other),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_fields_default_to_empty() {
        let request: CreateAgentRequest = serde_json::from_value(serde_json::json!({
            "name": "scout"
        }))
        .unwrap();

        assert_eq!(request.name, "scout");
        assert!(request.provider.is_empty());
        assert!(request.model.is_empty());
        assert!(request.system_prompt.is_empty());
    }
}
