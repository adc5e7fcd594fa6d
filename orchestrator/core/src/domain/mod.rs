// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Records, contracts and pure policy for the swarm.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Everything the engine needs that does no I/O of its own

pub mod account;
pub mod activity;
pub mod agent;
pub mod events;
pub mod llm;
pub mod memory;
pub mod nudge;
pub mod repository;
pub mod swarm_config;
pub mod tick;
