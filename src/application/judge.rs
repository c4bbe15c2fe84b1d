//! Orchestrator judge: reviews plans and research, decides how the
//! pipeline advances.
//!
//! Flow control must always make progress: every failure in here, from a
//! missing model configuration to a garbled reply, is coerced to an
//! approve decision with empty guidance and a forum note.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::agent::AgentPhase;
use crate::domain::models::decision::{
    parse_judge_reply, JudgeDecision, JudgeOutcome, ReviewPhase,
};
use crate::domain::models::forum::ForumEntry;
use crate::domain::ports::{Blackboard, ChatModel, ChatRequest};

/// Longest a payload excerpt may grow inside the review prompt.
const PAYLOAD_EXCERPT_CHARS: usize = 1500;

const SYSTEM_PROMPT: &str = "You are the orchestrator of a three-agent research team \
(a web-search researcher, a media researcher, and an insight analyst). You review \
their intermediate work and decide how the pipeline proceeds. Reply using exactly \
this format:\n\nDECISION: <decision>\nGUIDANCE: <one or two sentences, optional>";

/// Reviews phase results and returns decisions, defaulting to approve on
/// any failure.
pub struct OrchestratorJudge {
    blackboard: Arc<dyn Blackboard>,
    chat: Option<Arc<dyn ChatModel>>,
    max_tokens: u32,
    request_timeout: Duration,
}

impl OrchestratorJudge {
    pub fn new(
        blackboard: Arc<dyn Blackboard>,
        chat: Option<Arc<dyn ChatModel>>,
        max_tokens: u32,
        request_timeout: Duration,
    ) -> Self {
        Self { blackboard, chat, max_tokens, request_timeout }
    }

    /// Review the plan phase. Valid decisions: approve, revise.
    pub async fn judge_plan(&self, task_id: &str, query: &str) -> JudgeOutcome {
        self.judge(task_id, query, ReviewPhase::Plan).await
    }

    /// Review the research phase. Valid decisions: approve, supplement.
    /// A supplement verdict past the round cap is silently promoted to
    /// approve.
    pub async fn judge_research(&self, task_id: &str, query: &str) -> JudgeOutcome {
        self.judge(task_id, query, ReviewPhase::Research).await
    }

    async fn judge(&self, task_id: &str, query: &str, phase: ReviewPhase) -> JudgeOutcome {
        let outcome = match self.review(task_id, query, phase).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(task_id, phase = %phase, error = %err, "judge failed, approving");
                let note = format!(
                    "{phase} review failed ({err}); defaulting to approve with no guidance"
                );
                self.forum(task_id, &note).await;
                return JudgeOutcome::approve();
            }
        };

        let outcome = self.enforce_round_cap(task_id, phase, outcome).await;

        let mut note = format!("{phase} review decision: {}", outcome.decision);
        if let Some(guidance) = &outcome.guidance {
            note.push_str(&format!("; guidance: {guidance}"));
        }
        self.forum(task_id, &note).await;
        outcome
    }

    /// Gather inputs, call the model, and parse the reply.
    async fn review(
        &self,
        task_id: &str,
        query: &str,
        phase: ReviewPhase,
    ) -> CoreResult<JudgeOutcome> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| CoreError::JudgeFailed("no judge model configured".to_string()))?;

        let agent_phase = match phase {
            ReviewPhase::Plan => AgentPhase::Plan,
            ReviewPhase::Research => AgentPhase::Research,
        };
        let inputs = self.blackboard.all_phase_results(task_id, agent_phase).await?;

        let mut user = format!("Research query: {query}\n\nReviewing the {phase} phase.\n");
        if inputs.is_empty() {
            user.push_str("\nNo agent produced a result for this phase.\n");
        }
        for (agent, payload) in &inputs {
            user.push_str(&format!(
                "\n--- {} {phase} ---\n{}\n",
                agent.engine_name(),
                excerpt(payload)
            ));
        }
        user.push_str(&format!(
            "\nValid decisions for this phase: {}.",
            phase
                .valid_decisions()
                .iter()
                .map(|d| d.as_str().to_uppercase())
                .collect::<Vec<_>>()
                .join(", ")
        ));

        let request = ChatRequest::new(SYSTEM_PROMPT, user, self.max_tokens);
        let reply = tokio::time::timeout(self.request_timeout, chat.complete(&request))
            .await
            .map_err(|_| CoreError::JudgeFailed("review request timed out".to_string()))??;

        if reply.trim().is_empty() {
            return Err(CoreError::JudgeFailed("empty reply".to_string()));
        }

        parse_judge_reply(phase, &reply)
    }

    /// At most one supplemental round per task.
    async fn enforce_round_cap(
        &self,
        task_id: &str,
        phase: ReviewPhase,
        outcome: JudgeOutcome,
    ) -> JudgeOutcome {
        if phase != ReviewPhase::Research || outcome.decision != JudgeDecision::Supplement {
            return outcome;
        }
        match self.blackboard.supplement_round(task_id).await {
            Ok(round) if round < 1 => outcome,
            Ok(round) => {
                tracing::debug!(task_id, round, "supplement past round cap, promoting to approve");
                JudgeOutcome::approve()
            }
            Err(err) => {
                tracing::warn!(task_id, error = %err, "round check failed, promoting to approve");
                JudgeOutcome::approve()
            }
        }
    }

    async fn forum(&self, task_id: &str, content: &str) {
        if let Err(err) = self
            .blackboard
            .append_forum(task_id, &ForumEntry::orchestrator(content))
            .await
        {
            tracing::warn!(task_id, error = %err, "failed to append forum entry");
        }
    }
}

/// Bounded, log-safe payload excerpt for the review prompt.
fn excerpt(payload: &serde_json::Value) -> String {
    let raw = payload.to_string();
    if raw.chars().count() <= PAYLOAD_EXCERPT_CHARS {
        return raw;
    }
    let mut cut: String = raw.chars().take(PAYLOAD_EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}
