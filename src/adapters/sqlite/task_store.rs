//! SQLite implementation of the task status store.
//!
//! The submission snapshot lives in `tasks` (7-day TTL) and doubles as
//! the time-ordered task index. Mutable status lives in `task_status`
//! (24-hour lease) and is compose-merged on read. Results are stored
//! separately because they can be large.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::adapters::sqlite::util::{expires_ts, fmt_ts, now_ts, parse_ts};
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::agent::{AgentKind, AgentProgress, AgentRunStatus};
use crate::domain::models::document::ReportDocument;
use crate::domain::models::task::{AnalysisMode, AnalysisTask, TaskStatus};
use crate::domain::ports::{TaskStats, TaskStore};

/// Submission snapshot TTL.
const META_TTL_SECS: i64 = 7 * 86_400;
/// Mutable status lease, bounding staleness of the merged view.
const STATUS_TTL_SECS: i64 = 86_400;
/// Rendered result TTL.
const RESULT_TTL_SECS: i64 = 86_400;

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    task_id: String,
    query: String,
    mode: String,
    status: String,
    progress: i64,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct StatusRow {
    status: String,
    progress: i64,
    error: Option<String>,
    updated_at: String,
}

#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn status_row(&self, task_id: &str) -> CoreResult<Option<StatusRow>> {
        let row: Option<StatusRow> = sqlx::query_as(
            "SELECT status, progress, error, updated_at FROM task_status
             WHERE task_id = ? AND expires_at > ?",
        )
        .bind(task_id)
        .bind(now_ts())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    fn merge(meta: TaskRow, status: Option<StatusRow>) -> CoreResult<AnalysisTask> {
        let base_status = TaskStatus::from_str(&meta.status).ok_or_else(|| {
            CoreError::Serialization(format!("unknown stored status {:?}", meta.status))
        })?;
        let mode = AnalysisMode::from_str(&meta.mode).unwrap_or_default();

        let mut task = AnalysisTask {
            task_id: meta.task_id,
            query: meta.query,
            mode,
            status: base_status,
            progress: u8::try_from(meta.progress).unwrap_or(0),
            created_at: parse_ts(&meta.created_at)?,
            updated_at: parse_ts(&meta.updated_at)?,
            completed_at: None,
            error_message: None,
        };

        if let Some(row) = status {
            let status = TaskStatus::from_str(&row.status).ok_or_else(|| {
                CoreError::Serialization(format!("unknown stored status {:?}", row.status))
            })?;
            let updated_at = parse_ts(&row.updated_at)?;
            task.status = status;
            task.progress = u8::try_from(row.progress).unwrap_or(0);
            task.updated_at = updated_at;
            task.error_message = row.error;
            if status == TaskStatus::Completed {
                task.completed_at = Some(updated_at);
            }
        }

        Ok(task)
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create(&self, task: &AnalysisTask) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO tasks (task_id, query, mode, status, progress, created_at, updated_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.task_id)
        .bind(&task.query)
        .bind(task.mode.as_str())
        .bind(task.status.as_str())
        .bind(i64::from(task.progress))
        .bind(fmt_ts(task.created_at))
        .bind(fmt_ts(task.updated_at))
        .bind(expires_ts(META_TTL_SECS))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        progress: u8,
        error: Option<&str>,
    ) -> CoreResult<()> {
        let current = self
            .get(task_id)
            .await?
            .ok_or_else(|| CoreError::TaskNotFound(task_id.to_string()))?;

        let same_state = current.status == status;
        if same_state && current.status.is_terminal() {
            // Terminal idempotence: repeating the state is a no-op.
            return Ok(());
        }
        // Re-writing the current state refreshes progress and the lease;
        // the externally observed status sequence never goes backwards.
        if !same_state && !current.status.can_transition_to(status) {
            return Err(CoreError::InvalidTransition {
                from: current.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        // Compose-merge: keep the last recorded error unless this update
        // carries its own.
        let error = error
            .map(String::from)
            .or(if status == TaskStatus::Failed { current.error_message } else { None });

        sqlx::query(
            "INSERT INTO task_status (task_id, status, progress, error, updated_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(task_id) DO UPDATE SET
                status = excluded.status,
                progress = excluded.progress,
                error = excluded.error,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at",
        )
        .bind(task_id)
        .bind(status.as_str())
        .bind(i64::from(progress))
        .bind(error)
        .bind(now_ts())
        .bind(expires_ts(STATUS_TTL_SECS))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_result(&self, task_id: &str, document: &ReportDocument) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO task_results (task_id, document, created_at, expires_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(task_id) DO UPDATE SET
                document = excluded.document,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
        )
        .bind(task_id)
        .bind(serde_json::to_string(document)?)
        .bind(now_ts())
        .bind(expires_ts(RESULT_TTL_SECS))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, task_id: &str) -> CoreResult<Option<AnalysisTask>> {
        let meta: Option<TaskRow> = sqlx::query_as(
            "SELECT task_id, query, mode, status, progress, created_at, updated_at
             FROM tasks WHERE task_id = ? AND expires_at > ?",
        )
        .bind(task_id)
        .bind(now_ts())
        .fetch_optional(&self.pool)
        .await?;

        match meta {
            Some(meta) => {
                let status = self.status_row(task_id).await?;
                Ok(Some(Self::merge(meta, status)?))
            }
            None => Ok(None),
        }
    }

    async fn result(&self, task_id: &str) -> CoreResult<Option<ReportDocument>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT document FROM task_results WHERE task_id = ? AND expires_at > ?",
        )
        .bind(task_id)
        .bind(now_ts())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((raw,)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, limit: u32, offset: u32) -> CoreResult<Vec<AnalysisTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT task_id, query, mode, status, progress, created_at, updated_at
             FROM tasks WHERE expires_at > ?
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(now_ts())
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let status = self.status_row(&row.task_id).await?;
            tasks.push(Self::merge(row, status)?);
        }
        Ok(tasks)
    }

    async fn stats(&self) -> CoreResult<TaskStats> {
        let now = now_ts();
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT COALESCE(s.status, t.status) AS effective, COUNT(*)
             FROM tasks t
             LEFT JOIN task_status s ON s.task_id = t.task_id AND s.expires_at > ?
             WHERE t.expires_at > ?
             GROUP BY effective",
        )
        .bind(&now)
        .bind(&now)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = TaskStats::default();
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            stats.total += count;
            *stats.counts.entry(status).or_insert(0) += count;
        }
        Ok(stats)
    }

    async fn set_agent_progress(
        &self,
        task_id: &str,
        agent: AgentKind,
        progress: &AgentProgress,
    ) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO agent_progress (task_id, agent, status, progress, error, updated_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(task_id, agent) DO UPDATE SET
                status = excluded.status,
                progress = excluded.progress,
                error = excluded.error,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at",
        )
        .bind(task_id)
        .bind(agent.as_str())
        .bind(progress.status.as_str())
        .bind(i64::from(progress.progress))
        .bind(&progress.error)
        .bind(now_ts())
        .bind(expires_ts(STATUS_TTL_SECS))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn agent_progress(
        &self,
        task_id: &str,
    ) -> CoreResult<BTreeMap<AgentKind, AgentProgress>> {
        let rows: Vec<(String, String, i64, Option<String>)> = sqlx::query_as(
            "SELECT agent, status, progress, error FROM agent_progress
             WHERE task_id = ? AND expires_at > ?",
        )
        .bind(task_id)
        .bind(now_ts())
        .fetch_all(&self.pool)
        .await?;

        let mut result: BTreeMap<AgentKind, AgentProgress> = AgentKind::ALL
            .into_iter()
            .map(|agent| (agent, AgentProgress::default()))
            .collect();

        for (agent, status, progress, error) in rows {
            let Some(agent) = AgentKind::from_str(&agent) else { continue };
            let status = AgentRunStatus::from_str(&status).unwrap_or(AgentRunStatus::Pending);
            result.insert(
                agent,
                AgentProgress {
                    status,
                    progress: u8::try_from(progress).unwrap_or(0),
                    error,
                },
            );
        }
        Ok(result)
    }

    async fn sweep_expired(&self) -> CoreResult<u64> {
        let now = now_ts();
        let mut removed = 0;
        for table in ["tasks", "task_status", "task_results", "agent_progress"] {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE expires_at <= ?"))
                .bind(&now)
                .execute(&self.pool)
                .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }
}
