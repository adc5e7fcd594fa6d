// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Nudge scheduler - background task that keeps quiet agents moving
//!
//! Every check interval the scheduler looks at each agent and nudges the ones
//! that have been silent for too long:
//!
//! | State | Nudged after | Effect |
//! |-------|--------------|--------|
//! | Running | `interval_seconds` since its last turn | escalating ephemeral prompt |
//! | Idle (retired by policy) | `idle_interval_seconds` since going idle | reactivation |
//! | anything else | never | |
//!
//! The escalation and the Running -> Idle decision belong to the agent; the
//! scheduler only decides when.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Periodic nudge dispatch with graceful shutdown

use std::sync::Arc;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use mysis_core::application::agent::NudgeOutcome;
use mysis_core::domain::agent::{AgentError, AgentState};
use mysis_core::domain::swarm_config::NudgeConfig;

use crate::application::commander::Commander;

pub struct NudgeScheduler {
    commander: Arc<Commander>,
    config: NudgeConfig,
    shutdown_token: CancellationToken,
}

impl NudgeScheduler {
    pub fn new(commander: Arc<Commander>, config: NudgeConfig) -> Self {
        // Child of the swarm token so a swarm shutdown also ends the loop
        let shutdown_token = commander.shutdown_token().child_token();
        Self {
            commander,
            config,
            shutdown_token,
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the scheduler background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Nudge scheduler is disabled");
            return;
        }

        info!(
            check_interval_seconds = self.config.check_interval_seconds,
            interval_seconds = self.config.interval_seconds,
            idle_interval_seconds = self.config.idle_interval_seconds,
            max_attempts = self.config.max_attempts,
            "Starting nudge scheduler"
        );

        let mut tick = interval(self.config.check_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let nudged = self.run_cycle(Instant::now());
                    if nudged > 0 {
                        debug!(nudged, "Nudge cycle dispatched");
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping nudge scheduler");
                    break;
                }
            }
        }

        info!("Nudge scheduler stopped");
    }

    /// Dispatch nudges that are due at `now`. Returns how many were sent off.
    pub fn run_cycle(&self, now: Instant) -> usize {
        let mut dispatched = 0;

        for agent in self.commander.list_agents() {
            let snapshot = agent.snapshot();
            let (quiet_since, threshold) = match (snapshot.state, snapshot.idle_since) {
                (AgentState::Running, _) => (snapshot.last_turn_at, self.config.interval()),
                (AgentState::Idle, Some(idle_since)) => (Some(idle_since), self.config.idle_interval()),
                _ => continue,
            };
            let Some(quiet_since) = quiet_since else {
                continue;
            };
            if agent.turn_in_flight() || now.saturating_duration_since(quiet_since) < threshold {
                continue;
            }

            let max_attempts = self.config.max_attempts;
            self.commander.spawn_tracked(async move {
                match agent.nudge(max_attempts).await {
                    Ok(NudgeOutcome::WentIdle) => {
                        info!(agent_id = %agent.id(), "Agent retired after unanswered nudges")
                    }
                    Ok(outcome) => debug!(agent_id = %agent.id(), ?outcome, "Nudge handled"),
                    Err(AgentError::NotRunning) | Err(AgentError::Cancelled) => {}
                    Err(e) => debug!(agent_id = %agent.id(), error = %e, "Nudge failed"),
                }
            });
            dispatched += 1;
        }

        if dispatched > 0 {
            metrics::counter!("mysis_nudge_dispatches_total").increment(dispatched as u64);
        }
        dispatched
    }
}
