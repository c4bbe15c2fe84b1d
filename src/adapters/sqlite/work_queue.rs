//! SQLite implementation of the durable work queue.
//!
//! Claims are single-statement compare-and-set updates, so any number of
//! workers can poll the same queue safely. Barrier bookkeeping uses the
//! same trick: the member counter is an atomic increment, and the fired
//! flag is flipped by a guarded update so the callback enqueue happens
//! exactly once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::util::{fmt_ts, now_ts, parse_ts};
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::work::{QueueName, WorkGroup, WorkItem, WorkKind, WorkStatus};
use crate::domain::ports::WorkQueue;

/// Terminal items older than this are swept.
const DONE_RETENTION_SECS: i64 = 7 * 86_400;

#[derive(Debug, sqlx::FromRow)]
struct WorkItemRow {
    id: String,
    queue: String,
    task_id: String,
    kind: String,
    group_id: Option<String>,
    status: String,
    attempt: i64,
    max_attempts: i64,
    run_at: String,
    idempotency_key: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<WorkItemRow> for WorkItem {
    type Error = CoreError;

    fn try_from(row: WorkItemRow) -> Result<Self, Self::Error> {
        let parse_uuid = |s: &str| {
            Uuid::parse_str(s)
                .map_err(|e| CoreError::Serialization(format!("bad uuid {s:?}: {e}")))
        };
        Ok(WorkItem {
            id: parse_uuid(&row.id)?,
            queue: QueueName::from_str(&row.queue)
                .ok_or_else(|| CoreError::Serialization(format!("unknown queue {:?}", row.queue)))?,
            task_id: row.task_id,
            kind: serde_json::from_str(&row.kind)?,
            group_id: row.group_id.as_deref().map(parse_uuid).transpose()?,
            status: WorkStatus::from_str(&row.status)
                .ok_or_else(|| CoreError::Serialization(format!("unknown status {:?}", row.status)))?,
            attempt: u32::try_from(row.attempt).unwrap_or(0),
            max_attempts: u32::try_from(row.max_attempts).unwrap_or(1),
            run_at: parse_ts(&row.run_at)?,
            idempotency_key: row.idempotency_key,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WorkGroupRow {
    id: String,
    task_id: String,
    phase: String,
    total: i64,
    completed: i64,
    callback: String,
    fired: i64,
    created_at: String,
}

impl TryFrom<WorkGroupRow> for WorkGroup {
    type Error = CoreError;

    fn try_from(row: WorkGroupRow) -> Result<Self, Self::Error> {
        Ok(WorkGroup {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| CoreError::Serialization(format!("bad uuid {:?}: {e}", row.id)))?,
            task_id: row.task_id,
            phase: row.phase,
            total: u32::try_from(row.total).unwrap_or(0),
            completed: u32::try_from(row.completed).unwrap_or(0),
            callback: serde_json::from_str(&row.callback)?,
            fired: row.fired != 0,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[derive(Clone)]
pub struct SqliteWorkQueue {
    pool: SqlitePool,
}

impl SqliteWorkQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_item<'e, E>(executor: E, item: &WorkItem) -> CoreResult<bool>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO work_items
                (id, queue, task_id, kind, group_id, status, attempt, max_attempts,
                 run_at, idempotency_key, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id.to_string())
        .bind(item.queue.as_str())
        .bind(&item.task_id)
        .bind(serde_json::to_string(&item.kind)?)
        .bind(item.group_id.map(|id| id.to_string()))
        .bind(item.status.as_str())
        .bind(i64::from(item.attempt))
        .bind(i64::from(item.max_attempts))
        .bind(fmt_ts(item.run_at))
        .bind(&item.idempotency_key)
        .bind(fmt_ts(item.created_at))
        .bind(fmt_ts(item.updated_at))
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_status(&self, item_id: Uuid, status: WorkStatus) -> CoreResult<()> {
        sqlx::query("UPDATE work_items SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now_ts())
            .bind(item_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for SqliteWorkQueue {
    async fn enqueue(&self, item: &WorkItem) -> CoreResult<bool> {
        Self::insert_item(&self.pool, item).await
    }

    async fn enqueue_group(&self, group: &WorkGroup, items: &[WorkItem]) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO work_groups
                (id, task_id, phase, total, completed, callback, fired, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(group.id.to_string())
        .bind(&group.task_id)
        .bind(&group.phase)
        .bind(i64::from(group.total))
        .bind(i64::from(group.completed))
        .bind(serde_json::to_string(&group.callback)?)
        .bind(i64::from(group.fired))
        .bind(fmt_ts(group.created_at))
        .execute(&mut *tx)
        .await?;

        for item in items {
            Self::insert_item(&mut *tx, item).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn claim(&self, queue: QueueName) -> CoreResult<Option<WorkItem>> {
        let now = now_ts();
        let row: Option<WorkItemRow> = sqlx::query_as(
            "UPDATE work_items
             SET status = 'running', attempt = attempt + 1, updated_at = ?2
             WHERE id = (
                 SELECT id FROM work_items
                 WHERE queue = ?1 AND status = 'queued' AND run_at <= ?2
                 ORDER BY created_at, id
                 LIMIT 1
             )
             RETURNING id, queue, task_id, kind, group_id, status, attempt, max_attempts,
                       run_at, idempotency_key, created_at, updated_at",
        )
        .bind(queue.as_str())
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkItem::try_from).transpose()
    }

    async fn complete(&self, item_id: Uuid) -> CoreResult<()> {
        self.set_status(item_id, WorkStatus::Done).await
    }

    async fn fail(&self, item_id: Uuid) -> CoreResult<()> {
        self.set_status(item_id, WorkStatus::Failed).await
    }

    async fn retry_later(&self, item_id: Uuid, run_at: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query(
            "UPDATE work_items SET status = 'queued', run_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(fmt_ts(run_at))
        .bind(now_ts())
        .bind(item_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn report_group_member_done(&self, group_id: Uuid) -> CoreResult<Option<WorkItem>> {
        let row: Option<WorkGroupRow> = sqlx::query_as(
            "UPDATE work_groups SET completed = completed + 1 WHERE id = ?
             RETURNING id, task_id, phase, total, completed, callback, fired, created_at",
        )
        .bind(group_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(CoreError::Database(format!("unknown work group {group_id}")));
        };
        let group = WorkGroup::try_from(row)?;

        if group.completed < group.total || group.fired {
            return Ok(None);
        }

        // Guarded flip: only one reporter gets to enqueue the callback.
        let flipped = sqlx::query("UPDATE work_groups SET fired = 1 WHERE id = ? AND fired = 0")
            .bind(group_id.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if flipped == 0 {
            return Ok(None);
        }

        let callback = WorkItem::new(group.task_id.clone(), group.callback.clone())
            .with_idempotency_key(group.callback_key());
        if self.enqueue(&callback).await? {
            tracing::debug!(
                task_id = %group.task_id,
                phase = %group.phase,
                callback = %callback.kind.label(),
                "barrier fired"
            );
            Ok(Some(callback))
        } else {
            Ok(None)
        }
    }

    async fn group(&self, group_id: Uuid) -> CoreResult<Option<WorkGroup>> {
        let row: Option<WorkGroupRow> = sqlx::query_as(
            "SELECT id, task_id, phase, total, completed, callback, fired, created_at
             FROM work_groups WHERE id = ?",
        )
        .bind(group_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(WorkGroup::try_from).transpose()
    }

    async fn find_group(&self, task_id: &str, phase: &str) -> CoreResult<Option<WorkGroup>> {
        let row: Option<WorkGroupRow> = sqlx::query_as(
            "SELECT id, task_id, phase, total, completed, callback, fired, created_at
             FROM work_groups WHERE task_id = ? AND phase = ?",
        )
        .bind(task_id)
        .bind(phase)
        .fetch_optional(&self.pool)
        .await?;
        row.map(WorkGroup::try_from).transpose()
    }

    async fn active_count(&self) -> CoreResult<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM work_items WHERE status IN ('queued', 'running')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(row.0).unwrap_or(0))
    }

    async fn sweep_expired(&self) -> CoreResult<u64> {
        let cutoff = fmt_ts(Utc::now() - chrono::Duration::seconds(DONE_RETENTION_SECS));
        let items = sqlx::query(
            "DELETE FROM work_items WHERE status IN ('done', 'failed') AND updated_at <= ?",
        )
        .bind(&cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();
        let groups = sqlx::query("DELETE FROM work_groups WHERE fired = 1 AND created_at <= ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(items + groups)
    }
}
