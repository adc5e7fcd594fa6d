// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod account_pool;
pub mod event_bus;
pub mod llm;
pub mod repositories;

pub use account_pool::InMemoryAccountPool;
pub use event_bus::{AgentEventReceiver, EventBus, EventBusError, EventReceiver};
