// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Memory
//!
//! Conversation records owned by the store. The core only ever appends them.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Message/memory records and the tool-call encoding

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::AgentId;

/// Reserved prefix marking an assistant record that only carries tool-call
/// requests. The remainder of the content is a JSON array of [`ToolCall`].
pub const TOOL_CALL_PREFIX: &str = "[TOOL_CALLS]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MemoryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryRole::System => "system",
            MemoryRole::User => "user",
            MemoryRole::Assistant => "assistant",
            MemoryRole::Tool => "tool",
        }
    }
}

/// Where a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    System,
    Direct,
    Broadcast,
    Llm,
    Tool,
}

impl MemorySource {
    /// Direct and broadcast messages are the only human-originated input.
    pub fn is_user_input(&self) -> bool {
        matches!(self, MemorySource::Direct | MemorySource::Broadcast)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    pub id: Uuid,
    pub agent_id: AgentId,
    pub role: MemoryRole,
    pub source: MemorySource,
    pub content: String,
    /// Pairs a tool result with the call that produced it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Memory {
    pub fn new(
        agent_id: AgentId,
        role: MemoryRole,
        source: MemorySource,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            role,
            source,
            content: content.into(),
            call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn system(agent_id: AgentId, content: impl Into<String>) -> Self {
        Self::new(agent_id, MemoryRole::System, MemorySource::System, content)
    }

    pub fn tool_calls(agent_id: AgentId, calls: &[ToolCall]) -> Self {
        Self::new(
            agent_id,
            MemoryRole::Assistant,
            MemorySource::Llm,
            encode_tool_calls(calls),
        )
    }

    pub fn tool_result(
        agent_id: AgentId,
        call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut memory = Self::new(agent_id, MemoryRole::Tool, MemorySource::Tool, content);
        memory.call_id = Some(call_id.into());
        memory
    }

    /// True for assistant records that solely carry tool-call requests.
    pub fn is_tool_call(&self) -> bool {
        self.role == MemoryRole::Assistant && self.content.starts_with(TOOL_CALL_PREFIX)
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == MemoryRole::Tool
    }

    /// Call ids requested by a tool-call record. Empty for anything else,
    /// including a tool-call record whose payload does not parse.
    pub fn tool_call_ids(&self) -> Vec<String> {
        if !self.is_tool_call() {
            return Vec::new();
        }
        decode_tool_calls(&self.content)
            .map(|calls| calls.into_iter().map(|c| c.id).collect())
            .unwrap_or_default()
    }
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

pub fn encode_tool_calls(calls: &[ToolCall]) -> String {
    // Serializing plain structs into a Vec cannot fail.
    let payload = serde_json::to_string(calls).unwrap_or_else(|_| "[]".to_string());
    format!("{}{}", TOOL_CALL_PREFIX, payload)
}

pub fn decode_tool_calls(content: &str) -> Option<Vec<ToolCall>> {
    let payload = content.strip_prefix(TOOL_CALL_PREFIX)?;
    serde_json::from_str(payload.trim()).ok()
}
