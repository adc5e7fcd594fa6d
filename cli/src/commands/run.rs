// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Foreground swarm host
//!
//! Builds the swarm from configuration, starts the nudge scheduler and logs
//! every swarm event until Ctrl-C, then shuts down in order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{debug, info, warn};

use mysis_core::domain::events::{Event, EventData, EventType};
use mysis_core::domain::swarm_config::{SwarmConfigManifest, SwarmConfigSpec};
use mysis_core::infrastructure::llm::ProviderRegistry;
use mysis_core::infrastructure::{repositories, EventBus, InMemoryAccountPool};
use mysis_swarm::{Commander, CreateAgentRequest, NudgeScheduler};

/// Event content longer than this is shortened in the log.
const LOG_PREVIEW_CHARS: usize = 160;

#[derive(Args)]
pub struct RunArgs {
    /// Serve Prometheus metrics on this port
    #[arg(long, env = "MYSIS_METRICS_PORT")]
    metrics_port: Option<u16>,
}

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let manifest = SwarmConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    manifest
        .validate()
        .context("Configuration validation failed")?;

    if let Some(port) = args.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port, "Serving metrics");
    }

    let spec = manifest.spec;
    let commander = Arc::new(build_commander(&spec)?);

    let mut events = commander.subscribe();
    let event_logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log_event(&event);
        }
    });

    spawn_configured_agents(&commander, &spec).await;

    let scheduler = Arc::new(NudgeScheduler::new(Arc::clone(&commander), spec.nudge.clone()));
    let scheduler_handle = Arc::clone(&scheduler).start();

    println!(
        "{}",
        format!(
            "✓ Swarm '{}' running with {} agent(s). Press Ctrl-C to stop.",
            manifest.metadata.name,
            commander.agent_count()
        )
        .green()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Interrupt received, shutting down");

    scheduler.shutdown_token().cancel();
    let grace = spec.agent.stop_timeout() + Duration::from_secs(5);
    commander.shutdown(grace).await;

    if let Err(e) = scheduler_handle.await {
        warn!(error = %e, "Nudge scheduler task failed");
    }
    if let Err(e) = event_logger.await {
        warn!(error = %e, "Event logger task failed");
    }

    println!("{}", "✓ Swarm stopped".green());
    Ok(())
}

fn build_commander(spec: &SwarmConfigSpec) -> Result<Commander> {
    let registry = ProviderRegistry::from_config(spec).context("Failed to build provider registry")?;
    let commander = Commander::new(
        spec.max_agents,
        Arc::new(registry),
        repositories::in_memory(),
        EventBus::new(spec.event_bus.buffer_size),
        spec.agent.clone(),
    );

    if spec.accounts.is_empty() {
        return Ok(commander);
    }
    info!(accounts = spec.accounts.len(), "Account pool configured");
    let pool = InMemoryAccountPool::new(spec.accounts.iter().cloned());
    Ok(commander.with_account_leaser(Arc::new(pool)))
}

/// Create every configured agent not already present, starting the ones
/// marked autostart. Failures are logged and do not stop the others.
async fn spawn_configured_agents(commander: &Commander, spec: &SwarmConfigSpec) {
    for agent_spec in &spec.agents {
        if commander.find_by_name(&agent_spec.name).is_some() {
            debug!(agent = %agent_spec.name, "Agent already present");
            continue;
        }

        let request = CreateAgentRequest {
            name: agent_spec.name.clone(),
            provider: agent_spec.provider.clone().unwrap_or_default(),
            model: agent_spec.model.clone(),
            system_prompt: agent_spec.system_prompt.clone(),
        };
        let agent = match commander.create_agent(request).await {
            Ok(agent) => agent,
            Err(e) => {
                warn!(agent = %agent_spec.name, error = %e, "Failed to create configured agent");
                continue;
            }
        };

        if agent_spec.autostart {
            if let Err(e) = agent.start().await {
                warn!(agent = %agent_spec.name, error = %e, "Failed to start agent");
            }
        }
    }
}

fn log_event(event: &Event) {
    let agent = if event.agent_name.is_empty() { "swarm" } else { event.agent_name.as_str() };
    match (&event.event_type, &event.data) {
        (EventType::Error, _) => {
            warn!(agent, error = event.error.as_deref().unwrap_or("unknown"), "Agent error")
        }
        (EventType::StateChanged, EventData::StateChange(change)) => info!(
            agent,
            from = %change.old_state,
            to = %change.new_state,
            "State changed"
        ),
        (EventType::Message | EventType::Response | EventType::Broadcast, EventData::Message(message)) => {
            info!(agent, role = message.role.as_str(), "{}", preview(&message.content))
        }
        (event_type, _) => debug!(agent, ?event_type, "Swarm event"),
    }
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(LOG_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}
