// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Error vocabulary of the swarm coordinator. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`error`] | `CommanderError` |

pub mod error;

pub use error::*;
