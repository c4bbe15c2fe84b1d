//! Blackboard port: durable shared state between pipeline stages.
//!
//! The blackboard is the sole inter-stage memory. Reads never fabricate
//! defaults: absence is reported as `None` (or omission from batch reads)
//! and the caller decides whether to fall back.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::errors::CoreResult;
use crate::domain::models::agent::{AgentKind, AgentPhase};
use crate::domain::models::decision::ReviewPhase;
use crate::domain::models::forum::ForumEntry;

/// Complete blackboard view of one task, served by the diagnostics
/// endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BlackboardSummary {
    pub phases: BTreeMap<AgentKind, AgentPhase>,
    pub plans: BTreeMap<AgentKind, serde_json::Value>,
    pub research: BTreeMap<AgentKind, serde_json::Value>,
    pub reports: BTreeMap<AgentKind, String>,
    pub supplement_round: u32,
    pub guidance_plan: Option<String>,
    pub guidance_research: Option<String>,
    pub forum_log: Vec<ForumEntry>,
}

/// Durable keyed store for phase results, guidance, the supplement round
/// counter, and the forum log.
///
/// The forum append and the round increment are atomic against concurrent
/// writers; all other keys have a single writer at any moment by
/// construction of the workflow.
#[async_trait]
pub trait Blackboard: Send + Sync {
    /// Record the phase an agent most recently completed.
    async fn set_agent_phase(
        &self,
        task_id: &str,
        agent: AgentKind,
        phase: AgentPhase,
    ) -> CoreResult<()>;

    /// Read an agent's current phase marker.
    async fn agent_phase(&self, task_id: &str, agent: AgentKind)
        -> CoreResult<Option<AgentPhase>>;

    /// Phase markers for all agents; agents without a marker are omitted.
    async fn all_agent_phases(&self, task_id: &str)
        -> CoreResult<BTreeMap<AgentKind, AgentPhase>>;

    /// Store a phase payload. Overwrites any prior payload for the same
    /// `(agent, phase)` key.
    async fn save_phase_result(
        &self,
        task_id: &str,
        agent: AgentKind,
        phase: AgentPhase,
        payload: &serde_json::Value,
    ) -> CoreResult<()>;

    /// Read a phase payload.
    async fn phase_result(
        &self,
        task_id: &str,
        agent: AgentKind,
        phase: AgentPhase,
    ) -> CoreResult<Option<serde_json::Value>>;

    /// Payloads of one phase for all agents; missing agents are omitted.
    async fn all_phase_results(
        &self,
        task_id: &str,
        phase: AgentPhase,
    ) -> CoreResult<BTreeMap<AgentKind, serde_json::Value>>;

    /// Persist judge guidance for a review phase.
    async fn save_guidance(
        &self,
        task_id: &str,
        phase: ReviewPhase,
        guidance: &str,
    ) -> CoreResult<()>;

    /// Read judge guidance for a review phase.
    async fn guidance(&self, task_id: &str, phase: ReviewPhase) -> CoreResult<Option<String>>;

    /// Atomically increment the supplement round counter and return the
    /// new value (first increment returns 1).
    async fn increment_supplement_round(&self, task_id: &str) -> CoreResult<u32>;

    /// Current supplement round (0 when no supplement has run).
    async fn supplement_round(&self, task_id: &str) -> CoreResult<u32>;

    /// Append a forum entry, preserving order across concurrent writers.
    async fn append_forum(&self, task_id: &str, entry: &ForumEntry) -> CoreResult<()>;

    /// Full forum log in append order.
    async fn forum_log(&self, task_id: &str) -> CoreResult<Vec<ForumEntry>>;

    /// Complete blackboard snapshot of a task.
    async fn task_summary(&self, task_id: &str) -> CoreResult<BlackboardSummary>;

    /// Physically delete expired rows. Returns the number removed.
    async fn sweep_expired(&self) -> CoreResult<u64>;
}
