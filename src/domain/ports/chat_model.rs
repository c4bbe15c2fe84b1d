//! Chat model port for the orchestrator judge.

use async_trait::async_trait;

use crate::domain::errors::CoreResult;

/// A single chat completion request with bounded output.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens,
        }
    }
}

/// LLM capability used by the judge.
///
/// Implementations own transport-level concerns (request timeout,
/// moderation fallback); the caller additionally wraps every invocation
/// in its own hard deadline.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion and return the reply text, trimmed.
    async fn complete(&self, request: &ChatRequest) -> CoreResult<String>;
}
