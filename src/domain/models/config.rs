//! Configuration model.
//!
//! Loaded by the infrastructure config loader from defaults, yaml files,
//! and TRIUMVIR_-prefixed environment variables.

use serde::{Deserialize, Serialize};

use crate::domain::models::work::{WorkKind, WorkPhase};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub workers: WorkersConfig,
    pub timeouts: TimeoutsConfig,
    pub retry: RetryConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub cleanup: CleanupConfig,
    pub logging: LoggingConfig,
}

/// HTTP server binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8400,
            enable_cors: true,
        }
    }
}

/// SQLite backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".triumvir/triumvir.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Worker counts per queue and the claim poll interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub agents: usize,
    pub orchestrator: usize,
    pub report: usize,
    pub poll_interval_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            agents: 6,
            orchestrator: 2,
            report: 2,
            poll_interval_ms: 250,
        }
    }
}

/// A soft/hard wall-clock timeout pair, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTimeout {
    pub soft_secs: u64,
    pub hard_secs: u64,
}

impl StepTimeout {
    pub const fn new(soft_secs: u64, hard_secs: u64) -> Self {
        Self { soft_secs, hard_secs }
    }
}

/// Per-step timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub plan: StepTimeout,
    pub research: StepTimeout,
    pub supplement: StepTimeout,
    pub report: StepTimeout,
    pub orchestrate: StepTimeout,
    /// Hard ceiling on a single judge LLM request, in seconds
    pub judge_request_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            plan: StepTimeout::new(600, 660),
            research: StepTimeout::new(1800, 1860),
            supplement: StepTimeout::new(1200, 1260),
            report: StepTimeout::new(600, 660),
            orchestrate: StepTimeout::new(300, 360),
            judge_request_secs: 30,
        }
    }
}

impl TimeoutsConfig {
    /// Timeout pair for a work kind.
    pub fn for_kind(&self, kind: &WorkKind) -> StepTimeout {
        match kind {
            WorkKind::AgentPhase { phase, .. } => match phase {
                WorkPhase::Plan => self.plan,
                WorkPhase::Research => self.research,
                WorkPhase::Supplement => self.supplement,
                WorkPhase::Report => self.report,
            },
            WorkKind::Begin | WorkKind::Judge { .. } | WorkKind::BeginReport => self.orchestrate,
            WorkKind::Finalize => self.report,
        }
    }
}

/// Retry policy for agent phase items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per item, first run included
    pub max_attempts: u32,
    /// Delay before a retry becomes claimable, in seconds
    pub backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_secs: 60,
        }
    }
}

/// Credentials and model selection for one chat endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
}

impl ModelConfig {
    /// Whether this endpoint is usable.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.model.is_empty()
    }
}

/// Judge LLM endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub primary: ModelConfig,
    /// Fallback model for content-moderation rejections
    pub fallback: ModelConfig,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary: ModelConfig::default(),
            fallback: ModelConfig::default(),
            max_tokens: 1024,
        }
    }
}

/// Query result cache tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Jaccard similarity threshold for a neighbor hit
    pub similarity_threshold: f64,
    /// Maximum cache-meta entries examined per lookup
    pub max_scan: u32,
    /// Result and cache TTL, in seconds
    pub result_ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.80,
            max_scan: 100,
            result_ttl_secs: 86_400,
        }
    }
}

/// Expired-row sweeper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self { interval_secs: 3600 }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    /// Optional directory for rotated file logs
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
        }
    }
}
