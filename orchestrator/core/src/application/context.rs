// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Context assembly
//!
//! Turns persisted history into the message window sent with each turn.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Window selection, orphaned tool message filtering and
//!   conversion to provider messages
//!
//! The passes are kept separate so each can be tested on its own:
//!
//! 1. [`select_window`] puts the original system prompt in front of the
//!    recent records.
//! 2. [`filter_orphaned_tool_messages`] drops tool calls and results whose
//!    partner is outside the window.
//! 3. [`exclude_tool_bookkeeping`] removes the remaining tool traffic unless
//!    tool history was requested.
//! 4. [`to_chat_messages`] converts without filtering anything.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::agent::AgentId;
use crate::domain::llm::{ChatMessage, ChatRole};
use crate::domain::memory::{Memory, MemoryRole};
use crate::domain::repository::{MemoryRepository, RepositoryError};

pub struct ContextAssembler {
    memories: Arc<dyn MemoryRepository>,
    window: usize,
    include_tool_history: bool,
}

impl ContextAssembler {
    pub fn new(memories: Arc<dyn MemoryRepository>, window: usize, include_tool_history: bool) -> Self {
        Self {
            memories,
            window,
            include_tool_history,
        }
    }

    /// Provider-ready messages for the agent's next turn.
    pub async fn assemble(&self, agent_id: AgentId) -> Result<Vec<ChatMessage>, RepositoryError> {
        let recent = self.memories.list_recent(agent_id, self.window).await?;
        let system = self.memories.first_system(agent_id).await?;

        let window = select_window(system, recent);
        let window = prepare_window(window, self.include_tool_history);
        Ok(to_chat_messages(&window))
    }
}

/// Recent records with the original system prompt first, never duplicated.
pub fn select_window(system: Option<Memory>, recent: Vec<Memory>) -> Vec<Memory> {
    let Some(system) = system else {
        return recent;
    };

    let mut window = Vec::with_capacity(recent.len() + 1);
    window.push(system);
    let system_id = window[0].id;
    window.extend(recent.into_iter().filter(|m| m.id != system_id));
    window
}

/// Drop tool calls and tool results that lost their partner.
///
/// A tool-call record survives only if every id it requests has a result in
/// the window. A result survives only if its call record survives. Applying
/// the filter twice gives the same output as applying it once.
pub fn filter_orphaned_tool_messages(messages: Vec<Memory>) -> Vec<Memory> {
    let answered: HashSet<&str> = messages
        .iter()
        .filter(|m| m.is_tool_result())
        .filter_map(|m| m.call_id.as_deref())
        .collect();

    let mut complete_calls: HashSet<String> = HashSet::new();
    let mut complete_records: HashSet<uuid::Uuid> = HashSet::new();
    for message in messages.iter().filter(|m| m.is_tool_call()) {
        let ids = message.tool_call_ids();
        if !ids.is_empty() && ids.iter().all(|id| answered.contains(id.as_str())) {
            complete_records.insert(message.id);
            complete_calls.extend(ids);
        }
    }

    messages
        .into_iter()
        .filter(|m| {
            if m.is_tool_call() {
                complete_records.contains(&m.id)
            } else if m.is_tool_result() {
                m.call_id
                    .as_ref()
                    .is_some_and(|id| complete_calls.contains(id))
            } else {
                true
            }
        })
        .collect()
}

/// Remove tool-role records and `[TOOL_CALLS]` assistant records.
pub fn exclude_tool_bookkeeping(messages: Vec<Memory>) -> Vec<Memory> {
    messages
        .into_iter()
        .filter(|m| !m.is_tool_call() && !m.is_tool_result())
        .collect()
}

pub fn prepare_window(window: Vec<Memory>, include_tool_history: bool) -> Vec<Memory> {
    let paired = filter_orphaned_tool_messages(window);
    if include_tool_history {
        paired
    } else {
        exclude_tool_bookkeeping(paired)
    }
}

pub fn to_chat_messages(memories: &[Memory]) -> Vec<ChatMessage> {
    memories
        .iter()
        .map(|m| {
            let role = match m.role {
                MemoryRole::System => ChatRole::System,
                MemoryRole::User => ChatRole::User,
                MemoryRole::Assistant => ChatRole::Assistant,
                MemoryRole::Tool => ChatRole::Tool,
            };
            ChatMessage {
                role,
                content: m.content.clone(),
                tool_call_id: m.call_id.clone(),
            }
        })
        .collect()
}
