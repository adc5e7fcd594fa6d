// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;

use crate::domain::agent::AgentId;

/// Game account lent to an agent for the duration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLease {
    pub agent_id: AgentId,
    pub username: String,
}

/// Hands out game accounts to running agents.
///
/// A run acquires at most one lease when it starts and releases it when it
/// ends, whichever way it ends (stop, error or idle).
#[async_trait]
pub trait AccountLeaser: Send + Sync {
    /// Lease a free account to `agent_id`. Returns the existing lease if the
    /// agent already holds one, `None` when the pool is exhausted.
    async fn acquire(&self, agent_id: AgentId) -> Option<AccountLease>;

    /// Return the agent's account to the pool. Releasing without a lease is
    /// a no-op.
    async fn release(&self, agent_id: AgentId);
}
