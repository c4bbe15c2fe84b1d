//! Periodic deletion of expired rows.
//!
//! TTLs are enforced at read time; this background task reclaims the
//! storage afterwards.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::domain::ports::{Blackboard, QueryCache, TaskStore, WorkQueue};

/// Spawn the sweep loop. Runs until the handle is aborted.
pub fn spawn_sweeper(
    store: Arc<dyn TaskStore>,
    blackboard: Arc<dyn Blackboard>,
    cache: Arc<dyn QueryCache>,
    queue: Arc<dyn WorkQueue>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let mut removed: u64 = 0;
            for (name, result) in [
                ("task_store", store.sweep_expired().await),
                ("blackboard", blackboard.sweep_expired().await),
                ("query_cache", cache.sweep_expired().await),
                ("work_queue", queue.sweep_expired().await),
            ] {
                match result {
                    Ok(count) => removed += count,
                    Err(err) => tracing::warn!(component = name, error = %err, "sweep failed"),
                }
            }
            if removed > 0 {
                tracing::info!(removed, "swept expired rows");
            }
        }
    })
}
