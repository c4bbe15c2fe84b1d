//! Domain errors for the Triumvir orchestration core.

use thiserror::Error;

use crate::domain::models::agent::{AgentKind, AgentPhase};

/// Domain-level errors that can occur in the orchestration core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage or LLM I/O failure. Retried by the owning work item.
    #[error("Transient backend error: {0}")]
    TransientBackend(String),

    /// One agent's phase did not produce a payload after retries.
    #[error("Agent {agent} failed phase {phase}: {message}")]
    AgentPhaseFailed {
        agent: AgentKind,
        phase: AgentPhase,
        message: String,
    },

    /// A downstream phase found no resume token from its predecessor.
    #[error("Agent {agent} has no state_dict from phase {phase}")]
    MissingPrerequisite { agent: AgentKind, phase: AgentPhase },

    /// Judge LLM error, timeout, parse error, or empty reply.
    /// Always coerced to an approve decision by the caller.
    #[error("Judge failed: {0}")]
    JudgeFailed(String),

    /// Final-report rendering failed. Terminal for the task.
    #[error("Render failed: {0}")]
    RenderFailed(String),

    /// Rejected at the API boundary.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Whether the owning work item should retry after this error.
    ///
    /// Only backend I/O failures are retryable; everything else is either
    /// terminal for the step or handled by a fallback path.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientBackend(_) | Self::Database(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
