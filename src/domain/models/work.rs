//! Durable work items, queues, and fan-out barrier groups.
//!
//! Every pipeline step is a unit of work claimed from a named queue by a
//! worker. Fan-out/fan-in is a group of items plus a barrier callback:
//! when the last member completes (success or failure), the callback item
//! is enqueued exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::agent::AgentKind;
use crate::domain::models::decision::ReviewPhase;

/// Work queues, partitioned by kind so slow report work does not starve
/// orchestration steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Per-agent phase executions
    Agents,
    /// Workflow entry, judge reviews, phase advancement
    Orchestrator,
    /// Final document rendering
    Report,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [Self::Agents, Self::Orchestrator, Self::Report];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agents => "agents",
            Self::Orchestrator => "orchestrator",
            Self::Report => "report",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "agents" => Some(Self::Agents),
            "orchestrator" => Some(Self::Orchestrator),
            "report" => Some(Self::Report),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The phase a fanned-out agent item executes.
///
/// Distinct from the stored phase marker: supplement refines the research
/// record in place rather than introducing a fourth stored phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkPhase {
    Plan,
    Research,
    Supplement,
    Report,
}

impl WorkPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Research => "research",
            Self::Supplement => "supplement",
            Self::Report => "report",
        }
    }
}

impl std::fmt::Display for WorkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a work item does when executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkKind {
    /// Workflow entry: cache short-circuit, then plan fan-out.
    Begin,
    /// One agent executing one phase.
    AgentPhase { agent: AgentKind, phase: WorkPhase },
    /// Judge review after a phase barrier.
    Judge { phase: ReviewPhase },
    /// Report fan-out (used as the supplement barrier callback).
    BeginReport,
    /// Collect reports, render, store, cache.
    Finalize,
}

impl WorkKind {
    /// The queue this kind of work runs on.
    pub fn queue(&self) -> QueueName {
        match self {
            Self::AgentPhase { .. } => QueueName::Agents,
            Self::Begin | Self::Judge { .. } | Self::BeginReport => QueueName::Orchestrator,
            Self::Finalize => QueueName::Report,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            Self::Begin => "begin".to_string(),
            Self::AgentPhase { agent, phase } => format!("{agent}:{phase}"),
            Self::Judge { phase } => format!("judge:{phase}"),
            Self::BeginReport => "begin_report".to_string(),
            Self::Finalize => "finalize".to_string(),
        }
    }
}

/// Execution status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A claimable unit of work in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub queue: QueueName,
    pub task_id: String,
    pub kind: WorkKind,
    /// Barrier group this item reports to, if any
    pub group_id: Option<Uuid>,
    pub status: WorkStatus,
    /// Number of executions started so far
    pub attempt: u32,
    /// Total attempts allowed (first run included)
    pub max_attempts: u32,
    /// Earliest time the item may be claimed
    pub run_at: DateTime<Utc>,
    /// Deduplication key; a second enqueue with the same key is ignored
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a queued item, routed to the queue its kind belongs on.
    pub fn new(task_id: impl Into<String>, kind: WorkKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            queue: kind.queue(),
            task_id: task_id.into(),
            kind,
            group_id: None,
            status: WorkStatus::Queued,
            attempt: 0,
            max_attempts: 1,
            run_at: now,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the item to a barrier group.
    pub fn with_group(mut self, group_id: Uuid) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Allow retries up to `max_attempts` total executions.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set a deduplication key.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Whether another attempt is allowed after a transient failure.
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

/// A fan-out barrier: fires its callback exactly once, after every member
/// has completed or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkGroup {
    pub id: Uuid,
    pub task_id: String,
    /// Barrier identity within the task (one barrier per phase)
    pub phase: String,
    pub total: u32,
    pub completed: u32,
    pub callback: WorkKind,
    pub fired: bool,
    pub created_at: DateTime<Utc>,
}

impl WorkGroup {
    pub fn new(
        task_id: impl Into<String>,
        phase: impl Into<String>,
        total: u32,
        callback: WorkKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.into(),
            phase: phase.into(),
            total,
            completed: 0,
            callback,
            fired: false,
            created_at: Utc::now(),
        }
    }

    /// Idempotency key for the barrier callback item.
    pub fn callback_key(&self) -> String {
        format!("barrier:{}:{}", self.task_id, self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_queue_routing() {
        assert_eq!(WorkKind::Begin.queue(), QueueName::Orchestrator);
        assert_eq!(
            WorkKind::Judge { phase: ReviewPhase::Plan }.queue(),
            QueueName::Orchestrator
        );
        assert_eq!(
            WorkKind::AgentPhase { agent: AgentKind::Query, phase: WorkPhase::Research }.queue(),
            QueueName::Agents
        );
        assert_eq!(WorkKind::Finalize.queue(), QueueName::Report);
    }

    #[test]
    fn test_kind_serde_round_trip() {
        let kinds = vec![
            WorkKind::Begin,
            WorkKind::AgentPhase { agent: AgentKind::Media, phase: WorkPhase::Supplement },
            WorkKind::Judge { phase: ReviewPhase::Research },
            WorkKind::BeginReport,
            WorkKind::Finalize,
        ];
        for kind in kinds {
            let json = serde_json::to_string(&kind).unwrap();
            let back: WorkKind = serde_json::from_str(&json).unwrap();
            assert_eq!(kind, back);
        }
    }

    #[test]
    fn test_item_retry_budget() {
        let mut item = WorkItem::new("task_1", WorkKind::Begin).with_max_attempts(2);
        assert!(item.can_retry());
        item.attempt = 1;
        assert!(item.can_retry());
        item.attempt = 2;
        assert!(!item.can_retry());
    }

    #[test]
    fn test_max_attempts_floor() {
        let item = WorkItem::new("task_1", WorkKind::Begin).with_max_attempts(0);
        assert_eq!(item.max_attempts, 1);
    }

    #[test]
    fn test_group_callback_key_is_stable() {
        let g1 = WorkGroup::new("task_1", "plan", 3, WorkKind::Judge { phase: ReviewPhase::Plan });
        let g2 = WorkGroup::new("task_1", "plan", 3, WorkKind::Judge { phase: ReviewPhase::Plan });
        assert_eq!(g1.callback_key(), g2.callback_key());
        assert_ne!(g1.id, g2.id);
    }
}
