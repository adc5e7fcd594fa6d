// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tick
//!
//! Tool-result payloads and the world tick carried inside them.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Tick extraction per agent and aggregation across the swarm

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One content block of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Structured value delivered by the tool proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", alias = "is_error", default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: true,
        }
    }

    /// Text blocks joined with newlines, used as the stored tool record.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

const TICK_PATHS: [&[&str]; 4] = [
    &["current_tick"],
    &["data", "current_tick"],
    &["tick"],
    &["data", "tick"],
];

/// Find the world tick in a tool result.
///
/// Each block is parsed as JSON and probed in priority order. Error results,
/// unparseable blocks and non-integer values yield nothing.
pub fn extract_tick(result: &ToolResult) -> Option<i64> {
    if result.is_error {
        return None;
    }

    result.content.iter().find_map(|block| {
        let value: Value = serde_json::from_str(&block.text).ok()?;
        TICK_PATHS.iter().find_map(|path| lookup(&value, path))
    })
}

fn lookup(value: &Value, path: &[&str]) -> Option<i64> {
    path.iter()
        .try_fold(value, |current, key| current.get(key))
        .and_then(Value::as_i64)
}

/// Swarm tick: maximum over agents, 0 when there are none.
pub fn aggregate_tick<I>(ticks: I) -> i64
where
    I: IntoIterator<Item = i64>,
{
    ticks.into_iter().max().unwrap_or(0).max(0)
}
