// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Llm
//!
//! Provider contract used by every agent turn.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Anti-corruption layer between the turn engine and vendor APIs

// Implementations live in infrastructure/llm/. A provider must observe the
// cancellation token it is handed and return `LLMError::Cancelled` promptly
// once it fires.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Provider identifier as configured (e.g. "ollama", "openai")
    fn name(&self) -> &str;

    /// Run one chat exchange and return the assistant text.
    async fn chat(
        &self,
        cancel: &CancellationToken,
        messages: &[ChatMessage],
    ) -> Result<String, LLMError>;

    /// Release provider resources. Called when the owning agent is deleted.
    async fn close(&self) -> Result<(), LLMError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl LLMError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, LLMError::Cancelled)
    }
}

/// Race a provider request against its cancellation token.
///
/// The request future is dropped as soon as the token fires, which aborts the
/// underlying HTTP exchange.
pub async fn with_cancellation<T, F>(cancel: &CancellationToken, request: F) -> Result<T, LLMError>
where
    F: Future<Output = Result<T, LLMError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LLMError::Cancelled),
        result = request => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_cancellation_returns_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<(), LLMError> = with_cancellation(&token, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(LLMError::Cancelled)));
    }

    #[tokio::test]
    async fn test_with_cancellation_passes_result_through() {
        let token = CancellationToken::new();
        let result = with_cancellation(&token, async { Ok::<_, LLMError>("hello".to_string()) }).await;
        assert_eq!(result.unwrap(), "hello");
    }

    #[test]
    fn test_chat_message_serializes_role_lowercase() {
        let json = serde_json::to_value(ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("tool_call_id").is_none());
    }
}
