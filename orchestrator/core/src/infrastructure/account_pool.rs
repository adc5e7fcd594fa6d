// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-memory game account pool
//
// Accounts are handed out first come, first served and returned when the
// holding agent's run ends.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::account::{AccountLease, AccountLeaser};
use crate::domain::agent::AgentId;

#[derive(Default)]
struct PoolState {
    free: Vec<String>,
    leased: HashMap<AgentId, String>,
}

#[derive(Default)]
pub struct InMemoryAccountPool {
    state: Mutex<PoolState>,
}

impl InMemoryAccountPool {
    pub fn new<I, S>(usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // Reversed so pop() hands accounts out in the given order.
        let mut free: Vec<String> = usernames.into_iter().map(Into::into).collect();
        free.reverse();
        Self {
            state: Mutex::new(PoolState {
                free,
                leased: HashMap::new(),
            }),
        }
    }

    pub fn available(&self) -> usize {
        self.state.lock().free.len()
    }

    pub fn lease_of(&self, agent_id: AgentId) -> Option<String> {
        self.state.lock().leased.get(&agent_id).cloned()
    }
}

#[async_trait]
impl AccountLeaser for InMemoryAccountPool {
    async fn acquire(&self, agent_id: AgentId) -> Option<AccountLease> {
        let mut state = self.state.lock();
        if let Some(username) = state.leased.get(&agent_id) {
            return Some(AccountLease {
                agent_id,
                username: username.clone(),
            });
        }

        let Some(username) = state.free.pop() else {
            warn!(agent_id = %agent_id, "Account pool exhausted");
            return None;
        };
        debug!(agent_id = %agent_id, username = %username, "Account leased");
        state.leased.insert(agent_id, username.clone());
        Some(AccountLease { agent_id, username })
    }

    async fn release(&self, agent_id: AgentId) {
        let mut state = self.state.lock();
        if let Some(username) = state.leased.remove(&agent_id) {
            debug!(agent_id = %agent_id, username = %username, "Account released");
            state.free.push(username);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let pool = InMemoryAccountPool::new(["pilot-a", "pilot-b"]);
        let first = AgentId::new();
        let second = AgentId::new();
        let third = AgentId::new();

        assert_eq!(pool.acquire(first).await.unwrap().username, "pilot-a");
        // Re-acquiring returns the existing lease
        assert_eq!(pool.acquire(first).await.unwrap().username, "pilot-a");
        assert_eq!(pool.acquire(second).await.unwrap().username, "pilot-b");
        assert!(pool.acquire(third).await.is_none());

        pool.release(first).await;
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.acquire(third).await.unwrap().username, "pilot-a");
        assert!(pool.lease_of(first).is_none());
    }

    #[tokio::test]
    async fn test_release_without_lease_is_noop() {
        let pool = InMemoryAccountPool::new(["pilot-a"]);
        pool.release(AgentId::new()).await;
        assert_eq!(pool.available(), 1);
    }
}
