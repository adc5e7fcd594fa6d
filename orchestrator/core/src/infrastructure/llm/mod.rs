// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each provider adapter translates between the domain chat contract and an
// external HTTP API.

pub mod ollama;
pub mod openai;
pub mod registry;

pub use registry::{ProviderRegistry, ResolvedProvider};
