//! Analysis task domain model.
//!
//! One task is a single user query run through the phased pipeline.
//! Status transitions follow an explicit table; illegal transitions are
//! rejected at the status-store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an analysis task in the phased pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, not yet picked up by the workflow
    Pending,
    /// Workflow entry: cache check in progress
    Running,
    /// Plan fan-out in flight
    Phase1Plan,
    /// Judge reviewing plans
    OrchestratingPlan,
    /// Research fan-out in flight
    Phase2Research,
    /// Supplemental research fan-out in flight
    Phase2Supplement,
    /// Judge reviewing research
    OrchestratingResearch,
    /// Report fan-out in flight
    Phase3Report,
    /// Final document being rendered
    GeneratingFinalReport,
    /// Terminal: renderable document stored
    Completed,
    /// Terminal: error message recorded
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Phase1Plan => "phase1_plan",
            Self::OrchestratingPlan => "orchestrating_plan",
            Self::Phase2Research => "phase2_research",
            Self::Phase2Supplement => "phase2_supplement",
            Self::OrchestratingResearch => "orchestrating_research",
            Self::Phase3Report => "phase3_report",
            Self::GeneratingFinalReport => "generating_final_report",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "phase1_plan" => Some(Self::Phase1Plan),
            "orchestrating_plan" => Some(Self::OrchestratingPlan),
            "phase2_research" => Some(Self::Phase2Research),
            "phase2_supplement" => Some(Self::Phase2Supplement),
            "orchestrating_research" => Some(Self::OrchestratingResearch),
            "phase3_report" => Some(Self::Phase3Report),
            "generating_final_report" => Some(Self::GeneratingFinalReport),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this status.
    ///
    /// Every non-terminal state may fail; the cache short-circuit completes
    /// a task straight from the workflow entry.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Running, Self::Failed],
            Self::Running => &[Self::Phase1Plan, Self::Completed, Self::Failed],
            Self::Phase1Plan => &[Self::OrchestratingPlan, Self::Phase2Research, Self::Failed],
            Self::OrchestratingPlan => &[Self::Phase2Research, Self::Failed],
            Self::Phase2Research => &[
                Self::OrchestratingResearch,
                Self::Phase3Report,
                Self::Failed,
            ],
            Self::OrchestratingResearch => {
                &[Self::Phase2Supplement, Self::Phase3Report, Self::Failed]
            }
            Self::Phase2Supplement => &[Self::Phase3Report, Self::Failed],
            Self::Phase3Report => &[Self::GeneratingFinalReport, Self::Failed],
            Self::GeneratingFinalReport => &[Self::Completed, Self::Failed],
            Self::Completed => &[],
            Self::Failed => &[],
        }
    }

    /// Check if a transition to `new_status` is legal.
    ///
    /// Repeating a terminal state is treated as an idempotent no-op and
    /// allowed, so late writers cannot flip a finished task.
    pub fn can_transition_to(&self, new_status: Self) -> bool {
        if self.is_terminal() {
            return *self == new_status;
        }
        self.valid_transitions().contains(&new_status)
    }

    /// Progress hint written at the phase boundary that enters this state.
    pub fn progress_hint(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 5,
            Self::Phase1Plan => 20,
            Self::OrchestratingPlan => 35,
            Self::Phase2Research => 40,
            Self::OrchestratingResearch => 65,
            Self::Phase2Supplement => 70,
            Self::Phase3Report => 75,
            Self::GeneratingFinalReport => 85,
            Self::Completed => 100,
            Self::Failed => 0,
        }
    }

    /// Human-readable status line for the task view.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Pending => "Task submitted, waiting for execution",
            Self::Running => "Checking cache and preparing agents",
            Self::Phase1Plan => "Agents are drafting research plans",
            Self::OrchestratingPlan => "Orchestrator is reviewing plans",
            Self::Phase2Research => "Agents are executing research",
            Self::Phase2Supplement => "Agents are running supplemental research",
            Self::OrchestratingResearch => "Orchestrator is reviewing research",
            Self::Phase3Report => "Agents are writing reports",
            Self::GeneratingFinalReport => "Generating the final report",
            Self::Completed => "Analysis complete",
            Self::Failed => "Task failed",
        }
    }
}

/// How a task is executed.
///
/// Phased mode runs judge reviews between phases and permits one
/// supplemental research round. Standard mode chains the three phases
/// directly with no reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Phased,
    Standard,
}

impl Default for AnalysisMode {
    fn default() -> Self {
        Self::Phased
    }
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phased => "phased",
            Self::Standard => "standard",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "phased" => Some(Self::Phased),
            "standard" => Some(Self::Standard),
            _ => None,
        }
    }

    /// Whether judge reviews run between phases.
    pub fn has_reviews(&self) -> bool {
        matches!(self, Self::Phased)
    }
}

/// Maximum accepted query length, in characters.
pub const MAX_QUERY_CHARS: usize = 500;

/// One user submission run through the pipeline.
///
/// The submission snapshot (id, query, created_at, mode) is immutable;
/// status, progress and timestamps are overlaid from the mutable status
/// record when reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTask {
    /// Unique, time-ordered identifier
    pub task_id: String,
    /// User query text
    pub query: String,
    /// Execution mode
    #[serde(default)]
    pub mode: AnalysisMode,
    /// Current status
    pub status: TaskStatus,
    /// Progress percentage, 0 to 100
    pub progress: u8,
    /// When submitted
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
    /// When the task reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error detail, present only on failed tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AnalysisTask {
    /// Create a new pending task for a query.
    pub fn new(query: impl Into<String>, mode: AnalysisMode) -> Self {
        let now = Utc::now();
        Self {
            task_id: generate_task_id(now),
            query: query.into(),
            mode,
            status: TaskStatus::Pending,
            progress: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
        }
    }

    /// Check if the task is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Generate a unique, time-ordered task id.
///
/// The millisecond prefix keeps lexicographic order aligned with
/// submission order; the random suffix disambiguates same-millisecond
/// submissions.
fn generate_task_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("task_{}_{}", now.timestamp_millis(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_a_valid_transition_chain() {
        let path = [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Phase1Plan,
            TaskStatus::OrchestratingPlan,
            TaskStatus::Phase2Research,
            TaskStatus::OrchestratingResearch,
            TaskStatus::Phase3Report,
            TaskStatus::GeneratingFinalReport,
            TaskStatus::Completed,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0].as_str(),
                pair[1].as_str()
            );
        }
    }

    #[test]
    fn test_supplement_path() {
        assert!(TaskStatus::OrchestratingResearch.can_transition_to(TaskStatus::Phase2Supplement));
        assert!(TaskStatus::Phase2Supplement.can_transition_to(TaskStatus::Phase3Report));
        // The judge is not re-invoked after supplement.
        assert!(!TaskStatus::Phase2Supplement.can_transition_to(TaskStatus::OrchestratingResearch));
    }

    #[test]
    fn test_cache_short_circuit() {
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_every_active_state_can_fail() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Phase1Plan,
            TaskStatus::OrchestratingPlan,
            TaskStatus::Phase2Research,
            TaskStatus::Phase2Supplement,
            TaskStatus::OrchestratingResearch,
            TaskStatus::Phase3Report,
            TaskStatus::GeneratingFinalReport,
        ] {
            assert!(status.can_transition_to(TaskStatus::Failed));
        }
    }

    #[test]
    fn test_terminal_states_are_idempotent_only() {
        assert!(TaskStatus::Completed.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Failed.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Running));
    }

    #[test]
    fn test_progress_hints_monotonic_on_approve_path() {
        let path = [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Phase1Plan,
            TaskStatus::OrchestratingPlan,
            TaskStatus::Phase2Research,
            TaskStatus::OrchestratingResearch,
            TaskStatus::Phase3Report,
            TaskStatus::GeneratingFinalReport,
            TaskStatus::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].progress_hint() <= pair[1].progress_hint());
        }
    }

    #[test]
    fn test_progress_hints_monotonic_on_supplement_path() {
        let path = [
            TaskStatus::OrchestratingResearch,
            TaskStatus::Phase2Supplement,
            TaskStatus::Phase3Report,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].progress_hint() <= pair[1].progress_hint());
        }
    }

    #[test]
    fn test_task_id_is_time_ordered() {
        let earlier = generate_task_id(Utc::now() - chrono::Duration::seconds(10));
        let later = generate_task_id(Utc::now());
        assert!(earlier < later);
        assert!(earlier.starts_with("task_"));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Phase1Plan,
            TaskStatus::OrchestratingPlan,
            TaskStatus::Phase2Research,
            TaskStatus::Phase2Supplement,
            TaskStatus::OrchestratingResearch,
            TaskStatus::Phase3Report,
            TaskStatus::GeneratingFinalReport,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_mode_default_and_reviews() {
        assert_eq!(AnalysisMode::default(), AnalysisMode::Phased);
        assert!(AnalysisMode::Phased.has_reviews());
        assert!(!AnalysisMode::Standard.has_reviews());
    }
}
