// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent;
pub mod context;

pub use agent::{Agent, AgentDeps, AgentSnapshot, NudgeOutcome, CONTINUE_PROMPT};
pub use context::ContextAssembler;
