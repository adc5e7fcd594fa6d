// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Nudge
//!
//! Prompt text used to re-engage an agent that has gone quiet.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Escalating nudge wording, time-drift detection

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::activity::ActivityState;
use crate::domain::memory::Memory;

pub const GENTLE_NUDGE: &str = "Continue with your current objective.";
pub const FIRM_NUDGE: &str =
    "You have not taken an action recently. Choose your next step and carry it out now.";
pub const URGENT_NUDGE: &str =
    "URGENT: several reminders have gone unanswered. Act immediately with a tool call.";

/// Appended at every escalation level.
pub const NUDGE_REMINDER: &str =
    "Act through your tools and keep any reply short.";

pub const TIME_DRIFT_NOTICE: &str = "Note: the game world advances in ticks. \
     Wall-clock times and calendar dates have no meaning there, so plan in ticks only.";

/// Number of recent records scanned for real-world time references.
pub const NUDGE_HISTORY_WINDOW: usize = 10;

static REAL_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d{1,2}:\d{2}(?::\d{2})?\s*(?:am|pm)?\b|\b\d{4}-\d{2}-\d{2}\b|\bUTC\b|\breal[- ]?time\b|\b(?:january|february|march|april|june|july|august|september|october|november|december)\s+\d{1,2}\b",
    )
    .expect("real time regex should compile")
});

pub fn escalation_phrase(attempt: u32) -> &'static str {
    match attempt {
        0 => GENTLE_NUDGE,
        1 => FIRM_NUDGE,
        _ => URGENT_NUDGE,
    }
}

/// True when `text` mentions a clock time, a calendar date, "UTC" or
/// "real time".
pub fn mentions_real_time(text: &str) -> bool {
    REAL_TIME_RE.is_match(text)
}

/// Build the nudge for the given attempt.
///
/// `recent` is the tail of the agent's history; if any of it refers to real
/// time a drift notice is added.
pub fn build_nudge(attempt: u32, activity: ActivityState, recent: &[Memory]) -> String {
    let mut parts = vec![escalation_phrase(attempt).to_string()];

    if activity != ActivityState::Idle {
        parts.push(format!(
            "Your last known activity is {}. Check on its progress first.",
            activity.as_str()
        ));
    }

    if recent.iter().any(|m| mentions_real_time(&m.content)) {
        parts.push(TIME_DRIFT_NOTICE.to_string());
    }

    parts.push(NUDGE_REMINDER.to_string());
    parts.join(" ")
}
