//! Submission service: validates queries and enqueues workflow entry.

use std::sync::Arc;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::config::RetryConfig;
use crate::domain::models::task::{AnalysisMode, AnalysisTask, MAX_QUERY_CHARS};
use crate::domain::models::work::{WorkItem, WorkKind};
use crate::domain::ports::{TaskStore, WorkQueue};

/// Accepts a query, allocates a task, seeds the store, and enqueues the
/// workflow entry step.
pub struct SubmissionService {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn WorkQueue>,
    retry: RetryConfig,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn TaskStore>, queue: Arc<dyn WorkQueue>, retry: RetryConfig) -> Self {
        Self { store, queue, retry }
    }

    /// Validate and submit a query. Returns the pending task.
    pub async fn submit(&self, query: &str, mode: AnalysisMode) -> CoreResult<AnalysisTask> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CoreError::Validation("query must not be empty".to_string()));
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(CoreError::Validation(format!(
                "query must not exceed {MAX_QUERY_CHARS} characters"
            )));
        }

        let task = AnalysisTask::new(query, mode);
        self.store.create(&task).await?;

        let entry = WorkItem::new(task.task_id.clone(), WorkKind::Begin)
            .with_max_attempts(self.retry.max_attempts)
            .with_idempotency_key(format!("begin:{}", task.task_id));
        self.queue.enqueue(&entry).await?;

        tracing::info!(task_id = %task.task_id, mode = %mode.as_str(), "task submitted");
        Ok(task)
    }
}
