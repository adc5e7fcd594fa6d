// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// OpenAI LLM Provider Adapter
//
// Anti-Corruption Layer for the OpenAI chat completions API.
// Also works with OpenAI-compatible APIs (LM Studio, vLLM, etc.)

use crate::domain::llm::{with_cancellation, ChatMessage, ChatRole, LLMError, LLMProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct OpenAIAdapter {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage>,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

impl From<&ChatMessage> for OpenAIMessage {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        };
        Self {
            role: role.to_string(),
            content: Some(message.content.clone()),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

impl OpenAIAdapter {
    pub fn new(
        client: reqwest::Client,
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String, LLMError> {
        let request = OpenAIRequest {
            model: &self.model,
            messages: messages.iter().map(OpenAIMessage::from).collect(),
        };

        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        debug!(provider = %self.name, model = %self.model, messages = messages.len(), "Sending chat request");

        let mut builder = self.client.post(&url).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return Err(if status == 401 || status == 403 {
                LLMError::Authentication(error_text)
            } else if status == 429 {
                LLMError::RateLimit
            } else if status == 404 {
                LLMError::ModelNotFound(self.model.clone())
            } else {
                LLMError::Provider(format!("HTTP {}: {}", status, error_text))
            });
        }

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| LLMError::Provider(format!("Failed to parse response: {}", e)))?;

        openai_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| LLMError::Provider("No response from model".into()))
    }
}

#[async_trait]
impl LLMProvider for OpenAIAdapter {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chat_sends_bearer_and_reads_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices": [{"message": {"role": "assistant", "content": "Undocking now."}, "finish_reason": "stop"}]}"#,
            )
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new(
            reqwest::Client::new(),
            "openai",
            format!("{}/v1", server.url()),
            "sk-test",
            "gpt-4o-mini",
        );
        let text = adapter
            .chat(&CancellationToken::new(), &[ChatMessage::user("go")])
            .await
            .unwrap();

        assert_eq!(text, "Undocking now.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let mut server = mockito::Server::new_async().await;
        let _auth = server
            .mock("POST", "/auth/chat/completions")
            .with_status(401)
            .with_body("bad key")
            .create_async()
            .await;
        let _limited = server
            .mock("POST", "/limited/chat/completions")
            .with_status(429)
            .create_async()
            .await;

        let auth = OpenAIAdapter::new(
            reqwest::Client::new(),
            "openai",
            format!("{}/auth", server.url()),
            "bad",
            "m",
        );
        let err = auth
            .chat(&CancellationToken::new(), &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::Authentication(_)));

        let limited = OpenAIAdapter::new(
            reqwest::Client::new(),
            "openai",
            format!("{}/limited", server.url()),
            "k",
            "m",
        );
        let err = limited
            .chat(&CancellationToken::new(), &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::RateLimit));
    }

    #[tokio::test]
    async fn test_empty_choices_is_provider_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new(reqwest::Client::new(), "openai", server.url(), "", "m");
        let err = adapter
            .chat(&CancellationToken::new(), &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::Provider(_)));
    }
}
