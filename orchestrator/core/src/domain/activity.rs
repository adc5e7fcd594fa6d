// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Activity
//!
//! What an agent is doing in the game world between turns, and whether it is
//! due a nudge.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure nudge-eligibility logic, no I/O

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    #[default]
    Idle,
    Traveling,
    Mining,
    InCombat,
    Cooldown,
}

impl ActivityState {
    /// Activities that end on their own once the deadline passes.
    pub fn is_timed(&self) -> bool {
        matches!(self, ActivityState::Traveling | ActivityState::Cooldown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::Idle => "idle",
            ActivityState::Traveling => "traveling",
            ActivityState::Mining => "mining",
            ActivityState::InCombat => "in combat",
            ActivityState::Cooldown => "cooldown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityTracker {
    state: ActivityState,
    until: Option<DateTime<Utc>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    pub fn until(&self) -> Option<DateTime<Utc>> {
        self.until
    }

    pub fn set_activity(&mut self, state: ActivityState, until: Option<DateTime<Utc>>) {
        self.state = state;
        self.until = until;
    }

    /// Clear back to Idle only if the current activity is `expected`.
    pub fn clear_activity_if(&mut self, expected: ActivityState) -> bool {
        if self.state != expected {
            return false;
        }
        self.state = ActivityState::Idle;
        self.until = None;
        true
    }

    /// Whether a nudge should be sent at `now`.
    ///
    /// Busy agents still receive status nudges, so every current activity
    /// answers true. An expired timed activity is reset to Idle as a side
    /// effect.
    pub fn should_nudge(&mut self, now: DateTime<Utc>) -> bool {
        let Some(until) = self.until else {
            return true;
        };

        match self.state {
            ActivityState::Idle => true,
            ActivityState::Traveling | ActivityState::Cooldown => {
                if now >= until {
                    self.state = ActivityState::Idle;
                    self.until = None;
                }
                true
            }
            ActivityState::Mining | ActivityState::InCombat => true,
        }
    }
}
