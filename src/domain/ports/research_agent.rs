//! Research agent capability port.
//!
//! The core treats each agent as an opaque capability with four methods,
//! one per pipeline step. Payloads flow through the blackboard unparsed;
//! the only structural requirement is the agent's own `state_dict` resume
//! token inside plan and research payloads.

use async_trait::async_trait;

use crate::domain::errors::CoreResult;
use crate::domain::models::agent::AgentKind;

/// One research engine.
///
/// Each method is idempotent with respect to the blackboard: it is safe
/// to re-run after a transient failure (the core retries up to the
/// configured attempt budget with backoff).
#[async_trait]
pub trait ResearchAgent: Send + Sync + std::fmt::Debug {
    /// Which agent this capability implements.
    fn kind(&self) -> AgentKind;

    /// Produce a research plan for the query. The payload must carry the
    /// agent's `state_dict`.
    async fn plan(
        &self,
        query: &str,
        guidance: Option<&str>,
    ) -> CoreResult<serde_json::Value>;

    /// Execute research against a plan payload. The result must carry a
    /// `state_dict` for the report phase.
    async fn research(
        &self,
        plan: &serde_json::Value,
        guidance: Option<&str>,
    ) -> CoreResult<serde_json::Value>;

    /// Refine an existing research payload under judge guidance.
    /// Replaces the research record in place.
    async fn supplement(
        &self,
        research: &serde_json::Value,
        guidance: &str,
    ) -> CoreResult<serde_json::Value>;

    /// Write the agent's report from its research payload.
    async fn report(&self, research: &serde_json::Value) -> CoreResult<String>;
}
