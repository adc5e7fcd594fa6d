// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mysis_core::domain::agent::{AgentError, AgentId, AgentRecord, AgentState};
use mysis_core::domain::events::{Event, EventData, EventType};
use mysis_core::domain::llm::{ChatMessage, LLMError, LLMProvider};
use mysis_core::domain::memory::MemoryRole;
use mysis_core::domain::repository::Repositories;
use mysis_core::domain::swarm_config::{AgentRuntimeConfig, ModelConfig, NudgeConfig};
use mysis_core::domain::tick::ToolResult;
use mysis_core::infrastructure::event_bus::{EventBus, EventBusError, EventReceiver};
use mysis_core::infrastructure::llm::ProviderRegistry;
use mysis_core::infrastructure::repositories;
use mysis_swarm::{Commander, CommanderError, CreateAgentRequest, NudgeScheduler};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

enum Behavior {
    Reply,
    /// Replies, except to a prompt equal to the given text
    FailOn(&'static str),
    BlockUntilCancelled,
}

struct MockProvider {
    behavior: Behavior,
}

#[async_trait]
impl LLMProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(
        &self,
        cancel: &CancellationToken,
        messages: &[ChatMessage],
    ) -> Result<String, LLMError> {
        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        match self.behavior {
            Behavior::Reply => Ok(format!("ack: {}", prompt)),
            Behavior::FailOn(text) if prompt == text => {
                Err(LLMError::Provider("refused".to_string()))
            }
            Behavior::FailOn(_) => Ok("ok".to_string()),
            Behavior::BlockUntilCancelled => {
                cancel.cancelled().await;
                Err(LLMError::Cancelled)
            }
        }
    }
}

fn registry() -> Arc<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    registry.register(
        "good",
        Arc::new(MockProvider { behavior: Behavior::Reply }),
        vec![ModelConfig {
            alias: "default".to_string(),
            model: "mock-large".to_string(),
        }],
    );
    registry.register(
        "picky",
        Arc::new(MockProvider { behavior: Behavior::FailOn("all hands") }),
        Vec::new(),
    );
    registry.register(
        "slow",
        Arc::new(MockProvider { behavior: Behavior::BlockUntilCancelled }),
        Vec::new(),
    );
    registry.set_default_provider("good");
    Arc::new(registry)
}

fn commander_with(max_agents: usize, repos: Repositories) -> Commander {
    Commander::new(
        max_agents,
        registry(),
        repos,
        EventBus::new(256),
        AgentRuntimeConfig::default(),
    )
}

fn commander(max_agents: usize) -> Commander {
    commander_with(max_agents, repositories::in_memory())
}

fn request(name: &str, provider: &str) -> CreateAgentRequest {
    CreateAgentRequest {
        name: name.to_string(),
        provider: provider.to_string(),
        // Only "good" has a model catalogue to default from
        model: match provider {
            "picky" | "slow" | "nowhere" => "any".to_string(),
            _ => String::new(),
        },
        system_prompt: format!("You are {}.", name),
    }
}

async fn settle(commander: &Commander) {
    let tracker = commander.task_tracker();
    tracker.close();
    tokio::time::timeout(Duration::from_secs(5), tracker.wait())
        .await
        .expect("background tasks did not finish");
    tracker.reopen();
}

fn drain(events: &mut EventReceiver) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn count_of(events: &[Event], event_type: EventType) -> usize {
    events.iter().filter(|e| e.event_type == event_type).count()
}

#[tokio::test]
async fn test_create_agent_resolves_defaults_and_stores_prompt() {
    let repos = repositories::in_memory();
    let commander = commander_with(4, repos.clone());
    let mut events = commander.subscribe();

    let agent = commander.create_agent(request("scout", "")).await.unwrap();

    let snapshot = agent.snapshot();
    assert_eq!(snapshot.provider, "good");
    assert_eq!(snapshot.model, "mock-large");
    assert_eq!(snapshot.state, AgentState::Idle);

    let stored = repos.agents.find_by_id(agent.id()).await.unwrap().unwrap();
    assert_eq!(stored.model, "mock-large");
    let prompt = repos.memories.first_system(agent.id()).await.unwrap().unwrap();
    assert_eq!(prompt.content, "You are scout.");
    assert_eq!(prompt.role, MemoryRole::System);

    let events = drain(&mut events);
    assert_eq!(count_of(&events, EventType::Created), 1);
}

#[tokio::test]
async fn test_create_agent_rejects_bad_requests() {
    let repos = repositories::in_memory();
    let commander = commander_with(4, repos.clone());

    let unknown = commander.create_agent(request("ghost", "nowhere")).await;
    assert!(matches!(unknown, Err(CommanderError::Provider(_))));

    let bad_alias = CreateAgentRequest {
        model: "tiny".to_string(),
        ..request("ghost", "good")
    };
    assert!(matches!(
        commander.create_agent(bad_alias).await,
        Err(CommanderError::Provider(LLMError::ModelNotFound(_)))
    ));

    let unnamed = commander.create_agent(request("  ", "good")).await;
    assert!(matches!(unnamed, Err(CommanderError::Config(_))));

    assert_eq!(commander.agent_count(), 0);
    assert!(repos.agents.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_capacity_is_enforced() {
    let repos = repositories::in_memory();
    let commander = commander_with(2, repos.clone());

    commander.create_agent(request("a", "good")).await.unwrap();
    commander.create_agent(request("b", "good")).await.unwrap();
    let third = commander.create_agent(request("c", "good")).await;

    assert!(matches!(third, Err(CommanderError::CapacityExceeded { max: 2 })));
    assert_eq!(commander.agent_count(), 2);
    assert_eq!(repos.agents.list_all().await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_never_exceed_capacity() {
    let repos = repositories::in_memory();
    let commander = Arc::new(commander_with(3, repos.clone()));

    let mut handles = Vec::new();
    for n in 0..12 {
        let commander = Arc::clone(&commander);
        handles.push(tokio::spawn(async move {
            commander.create_agent(request(&format!("m{}", n), "good")).await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(CommanderError::CapacityExceeded { max }) => assert_eq!(max, 3),
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(created, 3);
    assert_eq!(commander.agent_count(), 3);
    // Rejected creations left nothing behind in the store
    assert_eq!(repos.agents.list_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_delete_running_agent_stops_and_purges() {
    let repos = repositories::in_memory();
    let commander = commander_with(4, repos.clone());
    let mut events = commander.subscribe();

    let agent = commander.create_agent(request("miner", "slow")).await.unwrap();
    let id = agent.id();
    commander.start_agent(id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    commander.delete_agent(id).await.unwrap();
    settle(&commander).await;

    assert_eq!(agent.state(), AgentState::Stopped);
    assert!(matches!(commander.get_agent(id), Err(CommanderError::AgentNotFound(_))));
    assert!(repos.agents.find_by_id(id).await.unwrap().is_none());
    assert_eq!(repos.memories.count(id).await.unwrap(), 0);
    assert!(matches!(
        commander.delete_agent(id).await,
        Err(CommanderError::AgentNotFound(_))
    ));

    let events = drain(&mut events);
    assert_eq!(count_of(&events, EventType::Deleted), 1);
    assert!(events.iter().any(|e| matches!(
        &e.data,
        EventData::StateChange(change)
            if change.old_state == AgentState::Running && change.new_state == AgentState::Stopped
    )));
}

#[tokio::test]
async fn test_broadcast_requires_running_agents() {
    let commander = commander(4);
    commander.create_agent(request("idle", "good")).await.unwrap();

    assert!(matches!(
        commander.broadcast("all hands").await,
        Err(CommanderError::NoRunningAgents)
    ));
    assert!(matches!(
        commander.broadcast_async("all hands"),
        Err(CommanderError::NoRunningAgents)
    ));
}

#[tokio::test]
async fn test_broadcast_reports_failed_recipients() {
    let repos = repositories::in_memory();
    let commander = commander_with(4, repos.clone());
    let good = commander.create_agent(request("good-one", "good")).await.unwrap();
    let picky = commander.create_agent(request("picky-one", "picky")).await.unwrap();
    commander.start_agent(good.id()).await.unwrap();
    commander.start_agent(picky.id()).await.unwrap();
    settle(&commander).await;
    let mut events = commander.subscribe();

    let err = commander.broadcast("all hands").await.unwrap_err();
    assert_eq!(err.failed_agents(), vec![picky.id()]);
    match err {
        CommanderError::Broadcast { failures } => {
            assert!(matches!(failures[0].1, AgentError::Provider(_)));
        }
        other => panic!("unexpected error: {}", other),
    }

    assert_eq!(good.state(), AgentState::Running);
    assert_eq!(picky.state(), AgentState::Errored);

    let events = drain(&mut events);
    let broadcasts: Vec<&Event> = events
        .iter()
        .filter(|e| e.event_type == EventType::Broadcast)
        .collect();
    assert_eq!(broadcasts.len(), 1);
    assert!(broadcasts[0].agent_id.is_none());
    assert_eq!(count_of(&events, EventType::Error), 1);

    // The healthy recipient stored the broadcast with its source
    let recent = repos.memories.list_recent(good.id(), 2).await.unwrap();
    assert_eq!(recent[0].content, "all hands");
    assert_eq!(recent[1].content, "ack: all hands");
}

#[tokio::test]
async fn test_send_message_async_validates_before_spawning() {
    let commander = commander(4);
    let agent = commander.create_agent(request("courier", "good")).await.unwrap();

    assert!(matches!(
        commander.send_message_async(AgentId::new(), "hi"),
        Err(CommanderError::AgentNotFound(_))
    ));
    assert!(matches!(
        commander.send_message_async(agent.id(), "hi"),
        Err(CommanderError::Agent(AgentError::NotRunning))
    ));

    commander.start_agent(agent.id()).await.unwrap();
    settle(&commander).await;
    let mut events = commander.subscribe_agent(agent.id());

    commander.send_message_async(agent.id(), "deliver cargo").unwrap();
    settle(&commander).await;

    let mut saw_response = false;
    while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(50), events.recv()).await {
        if event.event_type == EventType::Response {
            saw_response = true;
        }
    }
    assert!(saw_response);
}

#[tokio::test]
async fn test_configure_agent_only_when_not_running() {
    let repos = repositories::in_memory();
    let commander = commander_with(4, repos.clone());
    let agent = commander.create_agent(request("trader", "good")).await.unwrap();
    let id = agent.id();

    commander.start_agent(id).await.unwrap();
    assert!(matches!(
        commander.configure_agent(id, "picky", "any").await,
        Err(CommanderError::Agent(AgentError::AlreadyRunning))
    ));
    commander.stop_agent(id).await.unwrap();

    let mut events = commander.subscribe();
    commander.configure_agent(id, "picky", "other-model").await.unwrap();

    let snapshot = agent.snapshot();
    assert_eq!(snapshot.provider, "picky");
    assert_eq!(snapshot.model, "other-model");
    let stored = repos.agents.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.provider, "picky");
    assert_eq!(count_of(&drain(&mut events), EventType::ConfigChanged), 1);
}

#[tokio::test]
async fn test_aggregate_tick_is_swarm_maximum() {
    let commander = commander(4);
    assert_eq!(commander.aggregate_tick(), 0);

    let a = commander.create_agent(request("a", "good")).await.unwrap();
    let b = commander.create_agent(request("b", "good")).await.unwrap();
    commander.create_agent(request("c", "good")).await.unwrap();

    a.record_tool_result("t1", &ToolResult::text(r#"{"current_tick": 98}"#))
        .await
        .unwrap();
    b.record_tool_result("t2", &ToolResult::text(r#"{"tick": 120}"#))
        .await
        .unwrap();

    assert_eq!(commander.aggregate_tick(), 120);
}

#[tokio::test]
async fn test_load_agents_restores_running_as_idle() {
    let repos = repositories::in_memory();
    let mut running = AgentRecord::new("veteran", "good", "mock-large", "");
    running.state = AgentState::Running;
    let stopped = AgentRecord::new("retired", "good", "mock-large", "");
    let orphan = AgentRecord::new("orphan", "vanished", "x", "");
    for record in [&running, &stopped, &orphan] {
        repos.agents.save(record).await.unwrap();
    }

    let commander = commander_with(4, repos.clone());
    assert_eq!(commander.load_agents().await.unwrap(), 2);

    let veteran = commander.get_agent(running.id).unwrap();
    assert_eq!(veteran.state(), AgentState::Idle);
    let stored = repos.agents.find_by_id(running.id).await.unwrap().unwrap();
    assert_eq!(stored.state, AgentState::Idle);
    assert!(commander.find_by_name("orphan").is_none());

    // Loading again does not duplicate
    assert_eq!(commander.load_agents().await.unwrap(), 0);
    assert_eq!(commander.agent_count(), 2);
}

#[tokio::test]
async fn test_shutdown_stops_agents_and_closes_bus() {
    let commander = commander(4);
    let first = commander.create_agent(request("one", "slow")).await.unwrap();
    let second = commander.create_agent(request("two", "good")).await.unwrap();
    commander.start_agent(first.id()).await.unwrap();
    commander.start_agent(second.id()).await.unwrap();
    let mut events = commander.subscribe();

    commander.shutdown(Duration::from_secs(5)).await;

    assert_eq!(first.state(), AgentState::Stopped);
    assert_eq!(second.state(), AgentState::Stopped);
    assert_eq!(commander.running_count(), 0);
    assert!(commander.shutdown_token().is_cancelled());

    // Buffered events drain, then the closed bus reports it
    loop {
        match tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
            Ok(Ok(_)) => continue,
            Ok(Err(e)) => {
                assert!(matches!(e, EventBusError::Closed));
                break;
            }
            Err(_) => panic!("receiver did not observe bus closure"),
        }
    }
}

fn scheduler_config() -> NudgeConfig {
    NudgeConfig {
        enabled: true,
        check_interval_seconds: 1,
        interval_seconds: 30,
        idle_interval_seconds: 300,
        max_attempts: 2,
    }
}

#[tokio::test]
async fn test_scheduler_escalates_idles_and_revives() {
    let commander = Arc::new(commander(4));
    let scheduler = NudgeScheduler::new(Arc::clone(&commander), scheduler_config());
    let agent = commander.create_agent(request("drifter", "good")).await.unwrap();
    commander.start_agent(agent.id()).await.unwrap();
    settle(&commander).await;

    // Just took a turn
    assert_eq!(scheduler.run_cycle(Instant::now()), 0);

    let later = || Instant::now() + Duration::from_secs(31);
    assert_eq!(scheduler.run_cycle(later()), 1);
    settle(&commander).await;
    assert_eq!(agent.nudge_attempts(), 1);

    assert_eq!(scheduler.run_cycle(later()), 1);
    settle(&commander).await;
    assert_eq!(agent.nudge_attempts(), 2);

    // Attempts exhausted: the next nudge retires the agent
    assert_eq!(scheduler.run_cycle(later()), 1);
    settle(&commander).await;
    assert_eq!(agent.state(), AgentState::Idle);
    assert!(agent.last_error().is_none());

    // Idle agents wait for the longer interval
    assert_eq!(scheduler.run_cycle(later()), 0);
    assert_eq!(
        scheduler.run_cycle(Instant::now() + Duration::from_secs(301)),
        1
    );
    settle(&commander).await;
    assert_eq!(agent.state(), AgentState::Running);
}

#[tokio::test]
async fn test_scheduler_ignores_agents_never_started_or_stopped() {
    let commander = Arc::new(commander(4));
    let scheduler = NudgeScheduler::new(Arc::clone(&commander), scheduler_config());
    let fresh = commander.create_agent(request("fresh", "good")).await.unwrap();
    let parked = commander.create_agent(request("parked", "good")).await.unwrap();
    commander.start_agent(parked.id()).await.unwrap();
    commander.stop_agent(parked.id()).await.unwrap();
    settle(&commander).await;

    let far_future = Instant::now() + Duration::from_secs(3600);
    assert_eq!(scheduler.run_cycle(far_future), 0);
    assert_eq!(fresh.state(), AgentState::Idle);
    assert_eq!(parked.state(), AgentState::Stopped);
}

#[tokio::test]
async fn test_scheduler_loop_ends_on_swarm_shutdown() {
    let commander = Arc::new(commander(4));
    let scheduler = Arc::new(NudgeScheduler::new(Arc::clone(&commander), scheduler_config()));
    let handle = Arc::clone(&scheduler).start();

    commander.shutdown(Duration::from_secs(1)).await;

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
    assert!(scheduler.shutdown_token().is_cancelled());
}
