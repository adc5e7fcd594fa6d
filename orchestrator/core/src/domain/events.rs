// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentId, AgentState};
use crate::domain::memory::MemoryRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Deleted,
    StateChanged,
    Message,
    Response,
    Error,
    ConfigChanged,
    Broadcast,
    ToolCall,
    ToolResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    pub role: MemoryRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeData {
    pub old_state: AgentState,
    pub new_state: AgentState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChangeData {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventData {
    None,
    Message(MessageData),
    StateChange(StateChangeData),
    ConfigChange(ConfigChangeData),
    Error(ErrorData),
}

/// Swarm event delivered through the EventBus.
///
/// Broadcast events have no `agent_id`; every other kind names the agent it
/// concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub agent_name: String,
    pub data: EventData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    fn for_agent(event_type: EventType, agent_id: AgentId, agent_name: &str, data: EventData) -> Self {
        Self {
            event_type,
            agent_id: Some(agent_id),
            agent_name: agent_name.to_string(),
            data,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn created(agent_id: AgentId, agent_name: &str, provider: &str, model: &str) -> Self {
        Self::for_agent(
            EventType::Created,
            agent_id,
            agent_name,
            EventData::ConfigChange(ConfigChangeData {
                provider: provider.to_string(),
                model: model.to_string(),
            }),
        )
    }

    pub fn deleted(agent_id: AgentId, agent_name: &str) -> Self {
        Self::for_agent(EventType::Deleted, agent_id, agent_name, EventData::None)
    }

    pub fn state_changed(
        agent_id: AgentId,
        agent_name: &str,
        old_state: AgentState,
        new_state: AgentState,
    ) -> Self {
        Self::for_agent(
            EventType::StateChanged,
            agent_id,
            agent_name,
            EventData::StateChange(StateChangeData { old_state, new_state }),
        )
    }

    pub fn message(agent_id: AgentId, agent_name: &str, content: &str) -> Self {
        Self::for_agent(
            EventType::Message,
            agent_id,
            agent_name,
            EventData::Message(MessageData {
                role: MemoryRole::User,
                content: content.to_string(),
            }),
        )
    }

    pub fn response(agent_id: AgentId, agent_name: &str, content: &str) -> Self {
        Self::for_agent(
            EventType::Response,
            agent_id,
            agent_name,
            EventData::Message(MessageData {
                role: MemoryRole::Assistant,
                content: content.to_string(),
            }),
        )
    }

    pub fn error(agent_id: AgentId, agent_name: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut event = Self::for_agent(
            EventType::Error,
            agent_id,
            agent_name,
            EventData::Error(ErrorData {
                message: message.clone(),
            }),
        );
        event.error = Some(message);
        event
    }

    pub fn config_changed(agent_id: AgentId, agent_name: &str, provider: &str, model: &str) -> Self {
        Self::for_agent(
            EventType::ConfigChanged,
            agent_id,
            agent_name,
            EventData::ConfigChange(ConfigChangeData {
                provider: provider.to_string(),
                model: model.to_string(),
            }),
        )
    }

    pub fn broadcast(content: &str) -> Self {
        Self {
            event_type: EventType::Broadcast,
            agent_id: None,
            agent_name: String::new(),
            data: EventData::Message(MessageData {
                role: MemoryRole::User,
                content: content.to_string(),
            }),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_call(agent_id: AgentId, agent_name: &str, content: &str) -> Self {
        Self::for_agent(
            EventType::ToolCall,
            agent_id,
            agent_name,
            EventData::Message(MessageData {
                role: MemoryRole::Assistant,
                content: content.to_string(),
            }),
        )
    }

    pub fn tool_result(agent_id: AgentId, agent_name: &str, content: &str) -> Self {
        Self::for_agent(
            EventType::ToolResult,
            agent_id,
            agent_name,
            EventData::Message(MessageData {
                role: MemoryRole::Tool,
                content: content.to_string(),
            }),
        )
    }

    pub fn is_for(&self, agent_id: AgentId) -> bool {
        self.agent_id == Some(agent_id)
    }
}
