//! OpenAI-compatible chat-completions client for the judge.
//!
//! Makes direct HTTP calls to a chat-completions endpoint. When the
//! primary model rejects a prompt with a content-moderation signal, the
//! request is retried once against the configured fallback model before
//! the error propagates.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::config::ModelConfig;
use crate::domain::ports::{ChatModel, ChatRequest};

/// One configured chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatEndpoint {
    pub api_key: String,
    /// Base URL including the version segment, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
}

impl ChatEndpoint {
    pub fn from_config(config: &ModelConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        Some(Self {
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: config.model.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Recognize a policy/inappropriate-content rejection in an error body.
fn is_moderation_rejection(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("inappropriate content") || lower.contains("content policy")
}

/// Chat model backed by an OpenAI-compatible endpoint, with an optional
/// moderation-fallback endpoint.
pub struct OpenAiChatModel {
    client: Client,
    primary: ChatEndpoint,
    fallback: Option<ChatEndpoint>,
}

impl OpenAiChatModel {
    pub fn new(
        primary: ChatEndpoint,
        fallback: Option<ChatEndpoint>,
        timeout_secs: u64,
    ) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                CoreError::TransientBackend(format!("failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client, primary, fallback })
    }

    async fn call_endpoint(
        &self,
        endpoint: &ChatEndpoint,
        request: &ChatRequest,
    ) -> CoreResult<String> {
        let body = ChatCompletionRequest {
            model: &endpoint.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.user },
            ],
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", endpoint.base_url))
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(&endpoint.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::TransientBackend(format!("chat request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::TransientBackend(format!(
                "chat API error {status}: {body}"
            )));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CoreError::TransientBackend(format!("bad chat response: {e}")))?;

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, request: &ChatRequest) -> CoreResult<String> {
        match self.call_endpoint(&self.primary, request).await {
            Ok(text) => Ok(text),
            Err(err) => {
                let moderated = matches!(
                    &err,
                    CoreError::TransientBackend(msg) if is_moderation_rejection(msg)
                );
                if !moderated {
                    return Err(err);
                }
                let Some(fallback) = &self.fallback else {
                    tracing::warn!("moderation rejection and no fallback model configured");
                    return Err(err);
                };
                tracing::warn!(
                    model = %fallback.model,
                    "primary model rejected the prompt, retrying on the fallback model"
                );
                self.call_endpoint(fallback, request).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(server: &mockito::ServerGuard, model: &str) -> ChatEndpoint {
        ChatEndpoint {
            api_key: "test-key".to_string(),
            base_url: server.url(),
            model: model.to_string(),
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::new("you are a reviewer", "DECISION please", 256)
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"  DECISION: APPROVE  "}}]}"#)
            .create_async()
            .await;

        let model = OpenAiChatModel::new(endpoint(&server, "m1"), None, 5).unwrap();
        let reply = model.complete(&request()).await.unwrap();
        assert_eq!(reply, "DECISION: APPROVE");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_choices_yield_empty_reply() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let model = OpenAiChatModel::new(endpoint(&server, "m1"), None, 5).unwrap();
        assert_eq!(model.complete(&request()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_http_error_propagates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let model = OpenAiChatModel::new(endpoint(&server, "m1"), None, 5).unwrap();
        let err = model.complete(&request()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_moderation_rejection_falls_back_once() {
        let mut primary = mockito::Server::new_async().await;
        let mut fallback = mockito::Server::new_async().await;

        primary
            .mock("POST", "/chat/completions")
            .with_status(400)
            .with_body(r#"{"error":"request blocked by content policy"}"#)
            .create_async()
            .await;
        let fallback_mock = fallback
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"DECISION: APPROVE"}}]}"#)
            .create_async()
            .await;

        let model = OpenAiChatModel::new(
            endpoint(&primary, "m1"),
            Some(endpoint(&fallback, "m2")),
            5,
        )
        .unwrap();

        let reply = model.complete(&request()).await.unwrap();
        assert_eq!(reply, "DECISION: APPROVE");
        fallback_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_moderation_rejection_without_fallback_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(400)
            .with_body("inappropriate content detected")
            .create_async()
            .await;

        let model = OpenAiChatModel::new(endpoint(&server, "m1"), None, 5).unwrap();
        assert!(model.complete(&request()).await.is_err());
    }

    #[test]
    fn test_endpoint_from_config() {
        let config = ModelConfig {
            api_key: "k".to_string(),
            base_url: None,
            model: "m".to_string(),
        };
        let endpoint = ChatEndpoint::from_config(&config).unwrap();
        assert_eq!(endpoint.base_url, "https://api.openai.com/v1");

        assert!(ChatEndpoint::from_config(&ModelConfig::default()).is_none());
    }

    #[test]
    fn test_moderation_signal_detection() {
        assert!(is_moderation_rejection("Request violates Content Policy"));
        assert!(is_moderation_rejection("inappropriate content"));
        assert!(!is_moderation_rejection("rate limit exceeded"));
    }
}
