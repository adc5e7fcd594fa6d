// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mysis core
//!
//! Agent engine, domain model and adapters for a swarm of LLM-driven game
//! agents.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Everything below the swarm coordinator: lifecycle, turns,
//!   history, providers and the event bus

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
