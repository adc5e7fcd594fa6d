// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `mysis-swarm`: Swarm Coordination Crate
//!
//! Owns the set of live Mysis agents and drives the operations that span
//! more than one of them.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `CommanderError` |
//! | [`application`] | Application | `Commander`, `NudgeScheduler` |
//!
//! ## Key Concepts
//!
//! - **Commander**: registry of agents with a hard capacity, plus create,
//!   delete, broadcast and shutdown.
//! - **Nudge scheduler**: background task that prompts quiet agents and
//!   lets the agent engine retire the ones that never answer.
//! - **Aggregate tick**: the highest world tick any agent has observed.

pub mod application;
pub mod domain;

pub use application::*;
pub use domain::*;
