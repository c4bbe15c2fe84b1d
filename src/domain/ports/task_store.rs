//! Task status store port.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::errors::CoreResult;
use crate::domain::models::agent::{AgentKind, AgentProgress};
use crate::domain::models::document::ReportDocument;
use crate::domain::models::task::{AnalysisTask, TaskStatus};

/// Per-status task counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStats {
    pub counts: BTreeMap<String, u64>,
    pub total: u64,
}

/// Status and result store consumed by the query API.
///
/// The submission record is immutable; status updates are compose-merged
/// into a separate mutable record, and `get` returns the merged view.
/// Illegal status transitions are rejected here, at the store boundary.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new submission and add it to the time-ordered index.
    async fn create(&self, task: &AnalysisTask) -> CoreResult<()>;

    /// Compose-merge a status update. Rejects transitions the status
    /// state machine does not allow; repeating a terminal status is an
    /// accepted no-op.
    async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        progress: u8,
        error: Option<&str>,
    ) -> CoreResult<()>;

    /// Store the rendered result document (24-hour TTL).
    async fn put_result(&self, task_id: &str, document: &ReportDocument) -> CoreResult<()>;

    /// Merged view: submission defaults overlaid with the latest status.
    async fn get(&self, task_id: &str) -> CoreResult<Option<AnalysisTask>>;

    /// The stored result document, if present and unexpired.
    async fn result(&self, task_id: &str) -> CoreResult<Option<ReportDocument>>;

    /// Most-recent-first listing.
    async fn list(&self, limit: u32, offset: u32) -> CoreResult<Vec<AnalysisTask>>;

    /// Task counts per status.
    async fn stats(&self) -> CoreResult<TaskStats>;

    /// Record one agent's progress within a task.
    async fn set_agent_progress(
        &self,
        task_id: &str,
        agent: AgentKind,
        progress: &AgentProgress,
    ) -> CoreResult<()>;

    /// Progress for all agents; missing agents get the pending default.
    async fn agent_progress(&self, task_id: &str)
        -> CoreResult<BTreeMap<AgentKind, AgentProgress>>;

    /// Physically delete expired rows. Returns the number removed.
    async fn sweep_expired(&self) -> CoreResult<u64>;
}
