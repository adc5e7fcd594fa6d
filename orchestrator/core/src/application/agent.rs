// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent engine
//!
//! State machine and turn engine for one Mysis.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Start/stop lifecycle, serialized turns, error reporting
//!
//! # Locking
//!
//! | Lock | Kind | Guards | Held across `.await` |
//! |------|------|--------|----------------------|
//! | `inner` | `parking_lot::RwLock` | state, run token, activity, counters | never |
//! | `turn_lock` | `tokio::sync::Mutex` | one provider exchange at a time | yes |
//! | `persist_lock` | `tokio::sync::Mutex` | ordering of state writes to the store | yes |
//!
//! Each transition into Running bumps a run epoch. Error reports carry the
//! epoch of the run that produced them and are discarded once that run is
//! over, so a stop always wins over a late provider failure.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::application::context::ContextAssembler;
use crate::domain::account::AccountLeaser;
use crate::domain::activity::{ActivityState, ActivityTracker};
use crate::domain::agent::{AgentError, AgentId, AgentRecord, AgentState};
use crate::domain::events::Event;
use crate::domain::llm::{ChatMessage, LLMError, LLMProvider};
use crate::domain::memory::{Memory, MemoryRole, MemorySource, ToolCall};
use crate::domain::nudge::{build_nudge, NUDGE_HISTORY_WINDOW};
use crate::domain::repository::{Repositories, RepositoryError};
use crate::domain::swarm_config::AgentRuntimeConfig;
use crate::domain::tick::{extract_tick, ToolResult};
use crate::infrastructure::event_bus::EventBus;

/// Prompt for the autonomous turn that follows every start.
pub const CONTINUE_PROMPT: &str =
    "You are now active. Review your situation and continue working toward your objective.";

/// Collaborators shared by every agent of a swarm.
#[derive(Clone)]
pub struct AgentDeps {
    pub repos: Repositories,
    pub event_bus: EventBus,
    pub settings: AgentRuntimeConfig,
    pub tracker: TaskTracker,
    /// Parent of every run token; cancelling it ends all runs.
    pub shutdown: CancellationToken,
    pub leaser: Option<Arc<dyn AccountLeaser>>,
}

#[derive(Clone)]
struct RunHandle {
    token: CancellationToken,
    epoch: u64,
}

struct AgentInner {
    state: AgentState,
    last_error: Option<String>,
    /// Present iff `state == Running`.
    run: Option<RunHandle>,
    epoch: u64,
    activity: ActivityTracker,
    last_server_tick: i64,
    nudge_attempts: u32,
    last_turn_at: Option<Instant>,
    idle_since: Option<Instant>,
    provider: Arc<dyn LLMProvider>,
    provider_name: String,
    model: String,
}

/// Consistent view of an agent taken under a single lock acquisition.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub name: String,
    pub state: AgentState,
    pub last_error: Option<String>,
    pub activity: ActivityState,
    pub activity_until: Option<DateTime<Utc>>,
    pub last_server_tick: i64,
    pub nudge_attempts: u32,
    pub provider: String,
    pub model: String,
    pub last_turn_at: Option<Instant>,
    /// Set when the nudge policy moved the agent to Idle.
    pub idle_since: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeOutcome {
    Sent { attempt: u32 },
    WentIdle,
    /// The agent was due to go Idle, but a turn that started after the
    /// decision either reset the attempt counter or was still running at
    /// the stop timeout. It stays Running.
    Skipped,
}

#[derive(Debug, Clone, Copy)]
enum TurnKind {
    Message(MemorySource),
    Nudge,
    Continue { epoch: u64 },
}

impl TurnKind {
    fn is_ephemeral(&self) -> bool {
        !matches!(self, TurnKind::Message(_))
    }
}

pub struct Agent {
    id: AgentId,
    name: String,
    system_prompt: String,
    created_at: DateTime<Utc>,
    inner: RwLock<AgentInner>,
    turn_lock: Mutex<()>,
    persist_lock: Mutex<()>,
    context: ContextAssembler,
    repos: Repositories,
    event_bus: EventBus,
    settings: AgentRuntimeConfig,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    leaser: Option<Arc<dyn AccountLeaser>>,
}

impl Agent {
    /// Build the runtime agent for a stored record.
    ///
    /// A record persisted as Running comes back Idle: its run did not
    /// survive the restart.
    pub fn new(record: &AgentRecord, provider: Arc<dyn LLMProvider>, deps: AgentDeps) -> Self {
        let state = match record.state {
            AgentState::Running => AgentState::Idle,
            other => other,
        };
        let context = ContextAssembler::new(
            Arc::clone(&deps.repos.memories),
            deps.settings.context_window,
            deps.settings.include_tool_history,
        );

        Self {
            id: record.id,
            name: record.name.clone(),
            system_prompt: record.system_prompt.clone(),
            created_at: record.created_at,
            inner: RwLock::new(AgentInner {
                state,
                last_error: record.last_error.clone(),
                run: None,
                epoch: 0,
                activity: ActivityTracker::new(),
                last_server_tick: 0,
                nudge_attempts: 0,
                last_turn_at: None,
                idle_since: None,
                provider,
                provider_name: record.provider.clone(),
                model: record.model.clone(),
            }),
            turn_lock: Mutex::new(()),
            persist_lock: Mutex::new(()),
            context,
            repos: deps.repos,
            event_bus: deps.event_bus,
            settings: deps.settings,
            tracker: deps.tracker,
            shutdown: deps.shutdown,
            leaser: deps.leaser,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> AgentState {
        self.inner.read().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state() == AgentState::Running
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        let inner = self.inner.read();
        AgentSnapshot {
            id: self.id,
            name: self.name.clone(),
            state: inner.state,
            last_error: inner.last_error.clone(),
            activity: inner.activity.state(),
            activity_until: inner.activity.until(),
            last_server_tick: inner.last_server_tick,
            nudge_attempts: inner.nudge_attempts,
            provider: inner.provider_name.clone(),
            model: inner.model.clone(),
            last_turn_at: inner.last_turn_at,
            idle_since: inner.idle_since,
        }
    }

    pub fn last_server_tick(&self) -> i64 {
        self.inner.read().last_server_tick
    }

    pub fn nudge_attempts(&self) -> u32 {
        self.inner.read().nudge_attempts
    }

    /// True while a turn holds the turn lock.
    pub fn turn_in_flight(&self) -> bool {
        self.turn_lock.try_lock().is_err()
    }

    pub fn set_activity(&self, state: ActivityState, until: Option<DateTime<Utc>>) {
        self.inner.write().activity.set_activity(state, until);
    }

    pub fn clear_activity_if(&self, expected: ActivityState) -> bool {
        self.inner.write().activity.clear_activity_if(expected)
    }

    pub fn should_nudge(&self, now: DateTime<Utc>) -> bool {
        self.inner.write().activity.should_nudge(now)
    }

    /// Idle/Stopped/Errored -> Running, then one autonomous turn in the
    /// background.
    pub async fn start(self: &Arc<Self>) -> Result<(), AgentError> {
        let epoch = match self.activate(false).await? {
            Some(epoch) => epoch,
            None => return Err(AgentError::AlreadyRunning),
        };

        let agent = Arc::clone(self);
        self.tracker.spawn(async move {
            match agent
                .run_turn(CONTINUE_PROMPT, TurnKind::Continue { epoch })
                .await
            {
                Ok(()) | Err(AgentError::NotRunning) | Err(AgentError::Cancelled) => {}
                Err(e) => {
                    debug!(agent_id = %agent.id, error = %e, "Autonomous turn failed");
                }
            }
        });

        Ok(())
    }

    /// Running -> Stopped.
    ///
    /// Cancels the run first, then waits (bounded) for the in-flight turn to
    /// let go of the turn lock before writing the new state.
    pub async fn stop(&self) -> Result<(), AgentError> {
        // Cancelled under the write lock: once Stop has seen Running, a late
        // provider failure can no longer move the run to Errored.
        let epoch = {
            let inner = self.inner.write();
            match (inner.state, &inner.run) {
                (AgentState::Running, Some(run)) => {
                    run.token.cancel();
                    run.epoch
                }
                _ => return Err(AgentError::NotRunning),
            }
        };

        let stop_timeout = self.settings.stop_timeout();
        let turn_guard = match tokio::time::timeout(stop_timeout, self.turn_lock.lock()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!(
                    agent_id = %self.id,
                    timeout_secs = stop_timeout.as_secs(),
                    "In-flight turn still running at stop timeout, stopping anyway"
                );
                None
            }
        };

        let stopped = {
            let mut inner = self.inner.write();
            if inner.state == AgentState::Running && inner.epoch == epoch {
                inner.state = AgentState::Stopped;
                inner.run = None;
                true
            } else {
                false
            }
        };
        drop(turn_guard);

        if !stopped {
            debug!(agent_id = %self.id, "Stop superseded by a concurrent transition");
            return Ok(());
        }

        let persisted = self.persist_state().await;
        info!(agent_id = %self.id, agent = %self.name, "Agent stopped");
        self.event_bus.publish(Event::state_changed(
            self.id,
            &self.name,
            AgentState::Running,
            AgentState::Stopped,
        ));
        self.release_lease().await;

        persisted.map_err(AgentError::from)
    }

    /// Run one persisted turn. Fails with `NotRunning` unless Running.
    pub async fn send_message(&self, content: &str, source: MemorySource) -> Result<(), AgentError> {
        self.run_turn(content, TurnKind::Message(source)).await
    }

    /// Run one turn whose prompt is not persisted. An Idle agent is
    /// reactivated first.
    pub async fn send_ephemeral_message(&self, content: &str) -> Result<(), AgentError> {
        self.run_turn(content, TurnKind::Nudge).await
    }

    /// Apply the nudge policy once.
    ///
    /// A Running agent that already received `max_attempts` unanswered
    /// nudges goes Idle instead of being nudged again.
    pub async fn nudge(&self, max_attempts: u32) -> Result<NudgeOutcome, AgentError> {
        let send = {
            let mut inner = self.inner.write();
            match inner.state {
                AgentState::Running if inner.nudge_attempts >= max_attempts => None,
                AgentState::Running | AgentState::Idle => {
                    // Busy agents get a status nudge too; this only expires
                    // finished travel and cooldown.
                    inner.activity.should_nudge(Utc::now());
                    let attempt = inner.nudge_attempts;
                    inner.nudge_attempts = attempt.saturating_add(1);
                    inner.last_turn_at = Some(Instant::now());
                    Some((attempt, inner.activity.state()))
                }
                AgentState::Stopped | AgentState::Errored => return Err(AgentError::NotRunning),
            }
        };

        let Some((attempt, activity)) = send else {
            return if self.go_idle(max_attempts).await? {
                Ok(NudgeOutcome::WentIdle)
            } else {
                Ok(NudgeOutcome::Skipped)
            };
        };

        let recent = self
            .repos
            .memories
            .list_recent(self.id, NUDGE_HISTORY_WINDOW)
            .await?;
        let text = build_nudge(attempt, activity, &recent);
        metrics::counter!("mysis_nudges_total").increment(1);
        debug!(agent_id = %self.id, attempt, "Sending nudge");
        self.send_ephemeral_message(&text).await?;
        Ok(NudgeOutcome::Sent { attempt })
    }

    /// Running -> Idle, ending the run without an error.
    ///
    /// Waits (bounded by the stop timeout) for the turn lock first, so a turn
    /// that slipped in after the nudge decision is not cancelled. Returns
    /// false, leaving the agent Running, when that turn is still going at the
    /// deadline or when it reset the attempt counter below `max_attempts`.
    async fn go_idle(&self, max_attempts: u32) -> Result<bool, AgentError> {
        let wait = self.settings.stop_timeout();
        let Ok(turn_guard) = tokio::time::timeout(wait, self.turn_lock.lock()).await else {
            debug!(agent_id = %self.id, "Turn still in flight, agent stays running");
            return Ok(false);
        };

        {
            let mut inner = self.inner.write();
            if inner.state != AgentState::Running {
                return Err(AgentError::NotRunning);
            }
            if inner.nudge_attempts < max_attempts {
                debug!(agent_id = %self.id, "Agent was addressed meanwhile, staying running");
                return Ok(false);
            }
            inner.state = AgentState::Idle;
            inner.last_error = None;
            if let Some(run) = inner.run.take() {
                run.token.cancel();
            }
            inner.idle_since = Some(Instant::now());
            inner.nudge_attempts = 0;
        }
        drop(turn_guard);

        info!(agent_id = %self.id, agent = %self.name, "Agent went idle after unanswered nudges");
        let persisted = self.persist_state().await;
        self.event_bus.publish(Event::state_changed(
            self.id,
            &self.name,
            AgentState::Running,
            AgentState::Idle,
        ));
        self.release_lease().await;

        persisted.map_err(AgentError::from)?;
        Ok(true)
    }

    /// Append a `[TOOL_CALLS]` record for calls the model requested.
    pub async fn record_tool_call(&self, calls: &[ToolCall]) -> Result<(), AgentError> {
        let memory = Memory::tool_calls(self.id, calls);
        self.repos.memories.append(&memory).await?;
        self.event_bus
            .publish(Event::tool_call(self.id, &self.name, &memory.content));
        Ok(())
    }

    /// Append a tool result and pick up the world tick it carries.
    pub async fn record_tool_result(
        &self,
        call_id: &str,
        result: &ToolResult,
    ) -> Result<Option<i64>, AgentError> {
        let content = result.joined_text();
        self.repos
            .memories
            .append(&Memory::tool_result(self.id, call_id, content.as_str()))
            .await?;

        let tick = extract_tick(result);
        if let Some(tick) = tick {
            self.inner.write().last_server_tick = tick;
        }

        self.event_bus
            .publish(Event::tool_result(self.id, &self.name, &content));
        Ok(tick)
    }

    /// Swap the provider. Refused while Running.
    pub fn set_provider(
        &self,
        provider_name: &str,
        model: &str,
        provider: Arc<dyn LLMProvider>,
    ) -> Result<(), AgentError> {
        let mut inner = self.inner.write();
        if inner.state == AgentState::Running {
            return Err(AgentError::AlreadyRunning);
        }
        inner.provider = provider;
        inner.provider_name = provider_name.to_string();
        inner.model = model.to_string();
        Ok(())
    }

    pub async fn close_provider(&self) {
        let provider = Arc::clone(&self.inner.read().provider);
        if let Err(e) = provider.close().await {
            warn!(agent_id = %self.id, error = %e, "Failed to close provider");
        }
    }

    /// Move into Running with a fresh run token.
    ///
    /// Returns `None` when `from_idle_only` is set and the agent is already
    /// Running. On a persistence failure the previous state is restored.
    async fn activate(&self, from_idle_only: bool) -> Result<Option<u64>, AgentError> {
        let (old_state, old_error, epoch) = {
            let mut inner = self.inner.write();
            match inner.state {
                AgentState::Running if from_idle_only => return Ok(None),
                AgentState::Running => return Err(AgentError::AlreadyRunning),
                AgentState::Idle => {}
                _ if from_idle_only => return Err(AgentError::NotRunning),
                _ => {}
            }

            let old_state = inner.state;
            let old_error = inner.last_error.take();
            inner.epoch += 1;
            inner.run = Some(RunHandle {
                token: self.shutdown.child_token(),
                epoch: inner.epoch,
            });
            inner.state = AgentState::Running;
            inner.idle_since = None;
            inner.last_turn_at = Some(Instant::now());
            if !from_idle_only {
                inner.nudge_attempts = 0;
            }
            (old_state, old_error, inner.epoch)
        };

        if let Err(e) = self.persist_state().await {
            let mut inner = self.inner.write();
            if inner.state == AgentState::Running && inner.epoch == epoch {
                if let Some(run) = inner.run.take() {
                    run.token.cancel();
                }
                inner.state = old_state;
                inner.last_error = old_error;
            }
            warn!(agent_id = %self.id, error = %e, "Failed to persist start, state restored");
            return Err(e.into());
        }

        info!(agent_id = %self.id, agent = %self.name, epoch, "Agent running");
        self.event_bus.publish(Event::state_changed(
            self.id,
            &self.name,
            old_state,
            AgentState::Running,
        ));
        self.acquire_lease().await;

        Ok(Some(epoch))
    }

    async fn run_turn(&self, content: &str, kind: TurnKind) -> Result<(), AgentError> {
        // Reject early instead of queueing on the turn lock
        {
            let inner = self.inner.read();
            let accepted = match kind {
                TurnKind::Nudge => matches!(inner.state, AgentState::Running | AgentState::Idle),
                _ => inner.state == AgentState::Running,
            };
            if !accepted {
                return Err(AgentError::NotRunning);
            }
        }

        let _turn = self.turn_lock.lock().await;

        if let TurnKind::Nudge = kind {
            self.activate(true).await?;
        }

        // A stop may have landed while we waited for the lock
        let (run, provider) = {
            let inner = self.inner.read();
            match &inner.run {
                Some(run) if inner.state == AgentState::Running && !run.token.is_cancelled() => {
                    (run.clone(), Arc::clone(&inner.provider))
                }
                _ => return Err(AgentError::NotRunning),
            }
        };
        if let TurnKind::Continue { epoch } = kind {
            if run.epoch != epoch {
                return Err(AgentError::NotRunning);
            }
        }

        if let TurnKind::Message(source) = kind {
            self.repos
                .memories
                .append(&Memory::new(self.id, MemoryRole::User, source, content))
                .await?;
            if source.is_user_input() {
                self.inner.write().nudge_attempts = 0;
            }
            self.event_bus
                .publish(Event::message(self.id, &self.name, content));
        }

        let mut messages = self.context.assemble(self.id).await?;
        if kind.is_ephemeral() {
            messages.push(ChatMessage::user(content));
        }

        let call_token = run.token.child_token();
        let turn_timeout = self.settings.turn_timeout();
        let started = Instant::now();
        let result = match tokio::time::timeout(turn_timeout, provider.chat(&call_token, &messages)).await {
            Ok(result) => result,
            Err(_) => Err(LLMError::Timeout(turn_timeout)),
        };
        call_token.cancel();
        metrics::histogram!("mysis_turn_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(text) => {
                self.repos
                    .memories
                    .append(&Memory::new(self.id, MemoryRole::Assistant, MemorySource::Llm, text.as_str()))
                    .await?;
                self.inner.write().last_turn_at = Some(Instant::now());
                metrics::counter!("mysis_turns_total", "outcome" => "ok").increment(1);
                debug!(agent_id = %self.id, chars = text.len(), "Turn completed");
                self.event_bus
                    .publish(Event::response(self.id, &self.name, &text));
                Ok(())
            }
            Err(e) if e.is_cancellation() || run.token.is_cancelled() => {
                metrics::counter!("mysis_turns_total", "outcome" => "cancelled").increment(1);
                debug!(agent_id = %self.id, "Turn cancelled");
                Err(AgentError::Cancelled)
            }
            Err(e) => {
                metrics::counter!("mysis_turns_total", "outcome" => "error").increment(1);
                self.set_error_state(run.epoch, &e).await;
                Err(AgentError::Provider(e))
            }
        }
    }

    /// Move the run identified by `epoch` to Errored.
    ///
    /// No-op once that run has ended or been cancelled.
    async fn set_error_state(&self, epoch: u64, error: &LLMError) {
        let message = error.to_string();
        let transitioned = {
            let mut inner = self.inner.write();
            let live = matches!(
                &inner.run,
                Some(run) if run.epoch == epoch && !run.token.is_cancelled()
            );
            if inner.state != AgentState::Running || inner.epoch != epoch || !live {
                false
            } else {
                inner.state = AgentState::Errored;
                inner.last_error = Some(message.clone());
                if let Some(run) = inner.run.take() {
                    run.token.cancel();
                }
                true
            }
        };

        if !transitioned {
            debug!(agent_id = %self.id, error = %message, "Suppressed error from a finished run");
            return;
        }

        warn!(agent_id = %self.id, agent = %self.name, error = %message, "Agent errored");
        if let Err(e) = self.persist_state().await {
            warn!(agent_id = %self.id, error = %e, "Failed to persist errored state");
        }
        self.event_bus.publish(Event::state_changed(
            self.id,
            &self.name,
            AgentState::Running,
            AgentState::Errored,
        ));
        self.event_bus
            .publish(Event::error(self.id, &self.name, message));
        self.release_lease().await;
    }

    /// Write the current state to the store.
    ///
    /// Serialized, and reads the state only once it holds the persist lock,
    /// so the last write always carries the latest state.
    async fn persist_state(&self) -> Result<(), RepositoryError> {
        let _serial = self.persist_lock.lock().await;
        let (state, last_error) = {
            let inner = self.inner.read();
            (inner.state, inner.last_error.clone())
        };
        self.repos
            .agents
            .update_state(self.id, state, last_error)
            .await
    }

    async fn acquire_lease(&self) {
        let Some(leaser) = &self.leaser else {
            return;
        };
        match leaser.acquire(self.id).await {
            Some(lease) => {
                info!(agent_id = %self.id, username = %lease.username, "Account leased for run")
            }
            None => warn!(agent_id = %self.id, "No game account available for run"),
        }
    }

    async fn release_lease(&self) {
        if let Some(leaser) = &self.leaser {
            leaser.release(self.id).await;
        }
    }
}
