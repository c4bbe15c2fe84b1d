//! Research agent identity and phase markers.
//!
//! Three independent research agents work through three phases each.
//! The core routes their payloads without interpreting them.

use serde::{Deserialize, Serialize};

/// The three research agents driven by the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Web-search researcher.
    Query,
    /// Media researcher.
    Media,
    /// Insight/analyst researcher.
    Insight,
}

impl AgentKind {
    /// All agents, in fan-out order.
    pub const ALL: [AgentKind; 3] = [Self::Query, Self::Media, Self::Insight];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Media => "media",
            Self::Insight => "insight",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "query" => Some(Self::Query),
            "media" => Some(Self::Media),
            "insight" => Some(Self::Insight),
            _ => None,
        }
    }

    /// Display name of the underlying engine, used in rendered sources.
    pub fn engine_name(&self) -> &'static str {
        match self {
            Self::Query => "QueryEngine",
            Self::Media => "MediaEngine",
            Self::Insight => "InsightEngine",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The phase an agent is working through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Plan,
    Research,
    Report,
}

impl AgentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Research => "research",
            Self::Report => "report",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "plan" => Some(Self::Plan),
            "research" => Some(Self::Research),
            "report" => Some(Self::Report),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check whether a phase payload carries the agent's resume token.
///
/// The core never parses `state_dict`, it only verifies presence: a
/// missing or null token is a hard error for the consuming phase.
pub fn has_state_dict(payload: &serde_json::Value) -> bool {
    payload
        .get("state_dict")
        .is_some_and(|v| !v.is_null())
}

/// Per-agent execution status exposed by the progress endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AgentRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Progress record for one agent within a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProgress {
    pub status: AgentRunStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for AgentProgress {
    fn default() -> Self {
        Self {
            status: AgentRunStatus::Pending,
            progress: 0,
            error: None,
        }
    }
}
