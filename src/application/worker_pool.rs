//! Worker pools draining the durable queues.
//!
//! Each queue gets its own set of workers so slow agent work cannot
//! starve orchestration steps. A worker claims an item, runs it under
//! the soft/hard deadline pair for its kind, and then settles it:
//! complete, schedule a retry, or fail into the fallback path. Barrier
//! bookkeeping happens on every terminal settlement.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::workflow::WorkflowEngine;
use crate::domain::errors::CoreError;
use crate::domain::models::config::{TimeoutsConfig, WorkersConfig};
use crate::domain::models::work::{QueueName, WorkItem};
use crate::domain::ports::WorkQueue;

/// Pool of claim-execute-settle workers over the durable queues.
pub struct WorkerPool {
    queue: Arc<dyn WorkQueue>,
    engine: Arc<WorkflowEngine>,
    workers: WorkersConfig,
    timeouts: TimeoutsConfig,
    backoff: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        engine: Arc<WorkflowEngine>,
        workers: WorkersConfig,
        timeouts: TimeoutsConfig,
        backoff_secs: u64,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queue,
            engine,
            workers,
            timeouts,
            backoff: Duration::from_secs(backoff_secs),
            shutdown_tx,
        }
    }

    /// Spawn all workers. Returns their join handles.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for queue in QueueName::ALL {
            let count = match queue {
                QueueName::Agents => self.workers.agents,
                QueueName::Orchestrator => self.workers.orchestrator,
                QueueName::Report => self.workers.report,
            };
            for index in 0..count {
                let pool = Arc::clone(&self);
                handles.push(tokio::spawn(async move {
                    pool.worker_loop(queue, index).await;
                }));
            }
        }
        tracing::info!(total = handles.len(), "worker pool started");
        handles
    }

    /// Signal all workers to stop after their current item.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn worker_loop(&self, queue: QueueName, index: usize) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let poll = Duration::from_millis(self.workers.poll_interval_ms);
        tracing::debug!(queue = %queue, index, "worker started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            match self.queue.claim(queue).await {
                Ok(Some(item)) => self.run_item(item).await,
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(poll) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
                Err(err) => {
                    tracing::warn!(queue = %queue, error = %err, "claim failed");
                    tokio::time::sleep(poll).await;
                }
            }
        }
        tracing::debug!(queue = %queue, index, "worker stopped");
    }

    /// Execute one claimed item under its deadline pair and settle it.
    async fn run_item(&self, item: WorkItem) {
        let step = self.timeouts.for_kind(&item.kind);
        let soft = Duration::from_secs(step.soft_secs);
        let hard = Duration::from_secs(step.hard_secs);

        let engine = &self.engine;
        let work = async {
            let fut = engine.execute(&item);
            tokio::pin!(fut);
            tokio::select! {
                result = &mut fut => result,
                () = tokio::time::sleep(soft) => {
                    // Soft deadline: signal and keep waiting until the
                    // hard deadline terminates the step.
                    tracing::warn!(
                        task_id = %item.task_id,
                        step = %item.kind.label(),
                        soft_secs = step.soft_secs,
                        "step exceeded its soft timeout"
                    );
                    fut.await
                }
            }
        };

        let result = match tokio::time::timeout(hard, work).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::TransientBackend(format!(
                "step timed out after {}s",
                step.hard_secs
            ))),
        };

        match result {
            Ok(()) => {
                if let Err(err) = self.queue.complete(item.id).await {
                    tracing::error!(item = %item.id, error = %err, "failed to mark item done");
                }
                self.settle_barrier(&item).await;
            }
            Err(err) if err.is_transient() && item.can_retry() => {
                let run_at = Utc::now()
                    + chrono::Duration::from_std(self.backoff).unwrap_or_default();
                tracing::warn!(
                    task_id = %item.task_id,
                    step = %item.kind.label(),
                    attempt = item.attempt,
                    error = %err,
                    "step failed, scheduling retry"
                );
                if let Err(err) = self.queue.retry_later(item.id, run_at).await {
                    tracing::error!(item = %item.id, error = %err, "failed to schedule retry");
                }
            }
            Err(err) => {
                if let Err(mark_err) = self.queue.fail(item.id).await {
                    tracing::error!(item = %item.id, error = %mark_err, "failed to mark item failed");
                }
                self.engine.handle_step_failure(&item, &err).await;
                self.settle_barrier(&item).await;
            }
        }
    }

    /// Report barrier completion for a terminally settled item.
    async fn settle_barrier(&self, item: &WorkItem) {
        let Some(group_id) = item.group_id else { return };
        match self.queue.report_group_member_done(group_id).await {
            Ok(Some(callback)) => {
                tracing::debug!(
                    task_id = %item.task_id,
                    callback = %callback.kind.label(),
                    "barrier complete, callback enqueued"
                );
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(
                    task_id = %item.task_id,
                    group = %group_id,
                    error = %err,
                    "failed to report barrier completion"
                );
            }
        }
    }
}
