//! Durable work queue port with fan-out barrier groups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::work::{QueueName, WorkGroup, WorkItem};

/// Durable queue the worker pools claim from.
///
/// Barrier semantics: every member of a group reports completion exactly
/// once (success or final failure); when the last member reports, the
/// group's callback item is enqueued exactly once, guarded by the
/// group's fired flag and the callback idempotency key.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a single item. Returns false when an item with the same
    /// idempotency key already exists (the enqueue is ignored).
    async fn enqueue(&self, item: &WorkItem) -> CoreResult<bool>;

    /// Create a barrier group and enqueue its member items.
    async fn enqueue_group(&self, group: &WorkGroup, items: &[WorkItem]) -> CoreResult<()>;

    /// Claim the oldest runnable item on a queue, marking it running and
    /// incrementing its attempt counter. Returns `None` when the queue is
    /// empty.
    async fn claim(&self, queue: QueueName) -> CoreResult<Option<WorkItem>>;

    /// Mark a claimed item done.
    async fn complete(&self, item_id: Uuid) -> CoreResult<()>;

    /// Mark a claimed item failed for good.
    async fn fail(&self, item_id: Uuid) -> CoreResult<()>;

    /// Return a claimed item to the queue, claimable at `run_at`.
    async fn retry_later(&self, item_id: Uuid, run_at: DateTime<Utc>) -> CoreResult<()>;

    /// Report that one group member reached a terminal state. When this
    /// completes the barrier, the callback item is enqueued and returned;
    /// otherwise (or when the barrier already fired) returns `None`.
    async fn report_group_member_done(&self, group_id: Uuid) -> CoreResult<Option<WorkItem>>;

    /// Look up a barrier group.
    async fn group(&self, group_id: Uuid) -> CoreResult<Option<WorkGroup>>;

    /// Look up a barrier group by its `(task_id, phase)` identity.
    async fn find_group(&self, task_id: &str, phase: &str) -> CoreResult<Option<WorkGroup>>;

    /// Number of queued or running items, across all queues.
    async fn active_count(&self) -> CoreResult<u64>;

    /// Delete terminal items older than the retention window.
    async fn sweep_expired(&self) -> CoreResult<u64>;
}
