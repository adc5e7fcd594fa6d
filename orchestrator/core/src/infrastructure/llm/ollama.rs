// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Ollama LLM Provider Adapter
//
// Anti-Corruption Layer for Ollama local models (/api/chat)

use crate::domain::llm::{with_cancellation, ChatMessage, ChatRole, LLMError, LLMProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct OllamaAdapter {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

impl OllamaAdapter {
    pub fn new(
        client: reqwest::Client,
        name: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String, LLMError> {
        let request = OllamaRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| OllamaMessage {
                    role: role_name(m.role),
                    content: &m.content,
                })
                .collect(),
            stream: false,
        };

        let url = format!("{}/api/chat", self.endpoint.trim_end_matches('/'));
        debug!(provider = %self.name, model = %self.model, messages = messages.len(), "Sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return Err(if status == 404 {
                LLMError::ModelNotFound(self.model.clone())
            } else {
                LLMError::Provider(format!("HTTP {}: {}", status, error_text))
            });
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LLMError::Provider(format!("Failed to parse response: {}", e)))?;

        Ok(ollama_response.message.content)
    }
}

#[async_trait]
impl LLMProvider for OllamaAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        cancel: &CancellationToken,
        messages: &[ChatMessage],
    ) -> Result<String, LLMError> {
        with_cancellation(cancel, self.send(messages)).await
    }
}
