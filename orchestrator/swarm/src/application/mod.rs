// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod commander;
pub mod nudge_scheduler;

pub use commander::{Commander, CreateAgentRequest};
pub use nudge_scheduler::NudgeScheduler;
