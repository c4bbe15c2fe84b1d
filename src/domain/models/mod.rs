//! Domain models.

pub mod agent;
pub mod config;
pub mod decision;
pub mod document;
pub mod forum;
pub mod task;
pub mod work;

pub use agent::{has_state_dict, AgentKind, AgentPhase, AgentProgress, AgentRunStatus};
pub use config::{
    CacheConfig, CleanupConfig, Config, DatabaseConfig, LlmConfig, LoggingConfig, ModelConfig,
    RetryConfig, ServerConfig, StepTimeout, TimeoutsConfig, WorkersConfig,
};
pub use decision::{parse_judge_reply, JudgeDecision, JudgeOutcome, ReviewPhase};
pub use document::{
    DocumentMetadata, DocumentSection, DocumentSummary, ReportDocument, SourceRef,
};
pub use forum::{
    summarize_forum_log, ForumEntry, FORUM_SUMMARY_MAX_CHARS, ORCHESTRATOR_SPEAKER,
    TRUNCATION_SENTINEL,
};
pub use task::{AnalysisMode, AnalysisTask, TaskStatus, MAX_QUERY_CHARS};
pub use work::{QueueName, WorkGroup, WorkItem, WorkKind, WorkPhase, WorkStatus};
