//! Workflow engine: the deterministic phase machine behind every task.
//!
//! Each work item is one step. Fan-outs create a barrier group whose
//! callback advances the pipeline; failures inject fallback payloads so
//! a single slow or broken agent never wedges the run.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adapters::agents::AgentRegistry;
use crate::application::judge::OrchestratorJudge;
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::agent::{
    has_state_dict, AgentKind, AgentPhase, AgentProgress, AgentRunStatus,
};
use crate::domain::models::config::RetryConfig;
use crate::domain::models::decision::{JudgeDecision, ReviewPhase};
use crate::domain::models::forum::{summarize_forum_log, ForumEntry, FORUM_SUMMARY_MAX_CHARS};
use crate::domain::models::task::{AnalysisTask, TaskStatus};
use crate::domain::models::work::{WorkGroup, WorkItem, WorkKind, WorkPhase};
use crate::domain::ports::{
    Blackboard, QueryCache, ReportRenderer, TaskStore, WorkQueue,
};

/// Executes work items and advances tasks through the phase machine.
pub struct WorkflowEngine {
    store: Arc<dyn TaskStore>,
    blackboard: Arc<dyn Blackboard>,
    cache: Arc<dyn QueryCache>,
    queue: Arc<dyn WorkQueue>,
    agents: AgentRegistry,
    judge: Arc<OrchestratorJudge>,
    renderer: Arc<dyn ReportRenderer>,
    retry: RetryConfig,
}

impl WorkflowEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TaskStore>,
        blackboard: Arc<dyn Blackboard>,
        cache: Arc<dyn QueryCache>,
        queue: Arc<dyn WorkQueue>,
        agents: AgentRegistry,
        judge: Arc<OrchestratorJudge>,
        renderer: Arc<dyn ReportRenderer>,
        retry: RetryConfig,
    ) -> Self {
        Self { store, blackboard, cache, queue, agents, judge, renderer, retry }
    }

    /// Execute one claimed work item.
    ///
    /// Transient errors bubble to the worker for retry; everything else
    /// is either handled in place or reported through
    /// [`Self::handle_step_failure`] once the retry budget is spent.
    pub async fn execute(&self, item: &WorkItem) -> CoreResult<()> {
        let Some(task) = self.store.get(&item.task_id).await? else {
            return Err(CoreError::TaskNotFound(item.task_id.clone()));
        };

        // Results of steps that outlive a terminal task are ignored.
        if task.is_terminal() && !matches!(item.kind, WorkKind::Begin) {
            tracing::debug!(
                task_id = %item.task_id,
                step = %item.kind.label(),
                "task already terminal, skipping step"
            );
            return Ok(());
        }

        match &item.kind {
            WorkKind::Begin => self.handle_begin(&task).await,
            WorkKind::AgentPhase { agent, phase } => {
                self.handle_agent_phase(&task, *agent, *phase).await
            }
            WorkKind::Judge { phase } => self.handle_judge(&task, *phase).await,
            WorkKind::BeginReport => self.start_report_phase(&task).await,
            WorkKind::Finalize => self.handle_finalize(&task).await,
        }
    }

    /// React to a step whose retry budget is exhausted.
    ///
    /// Agent phases degrade to fallback payloads so the pipeline keeps
    /// moving; orchestration and finalization steps fail the task.
    pub async fn handle_step_failure(&self, item: &WorkItem, error: &CoreError) {
        match &item.kind {
            WorkKind::AgentPhase { agent, phase } => {
                if let Err(err) = self
                    .record_phase_fallback(&item.task_id, *agent, *phase, error)
                    .await
                {
                    tracing::error!(
                        task_id = %item.task_id,
                        agent = %agent,
                        error = %err,
                        "failed to record fallback payload"
                    );
                }
            }
            WorkKind::Begin | WorkKind::Judge { .. } | WorkKind::BeginReport
            | WorkKind::Finalize => {
                tracing::error!(
                    task_id = %item.task_id,
                    step = %item.kind.label(),
                    error = %error,
                    "pipeline step failed, marking task failed"
                );
                if let Err(err) = self
                    .store
                    .update_status(&item.task_id, TaskStatus::Failed, 0, Some(&error.to_string()))
                    .await
                {
                    tracing::error!(task_id = %item.task_id, error = %err, "failed to mark task failed");
                }
            }
        }
    }

    /// Maximum attempts for fanned-out items, from the retry policy.
    fn max_attempts(&self) -> u32 {
        self.retry.max_attempts
    }

    // ------------------------------------------------------------------
    // Step handlers
    // ------------------------------------------------------------------

    /// Workflow entry: cache short-circuit, then the plan fan-out.
    async fn handle_begin(&self, task: &AnalysisTask) -> CoreResult<()> {
        if task.is_terminal() {
            return Ok(());
        }
        let task_id = &task.task_id;
        self.advance_status(task_id, TaskStatus::Running).await?;

        match self.cache.lookup(&task.query).await {
            Ok(Some(hit)) => {
                tracing::info!(task_id = %task_id, "cache hit, short-circuiting the pipeline");
                self.forum(task_id, "analysis served from the query cache").await;
                self.store.put_result(task_id, &hit.document).await?;
                self.advance_status(task_id, TaskStatus::Completed).await?;
                return Ok(());
            }
            Ok(None) => {}
            Err(err) => {
                // A broken cache never blocks a fresh run.
                tracing::warn!(task_id = %task_id, error = %err, "cache lookup failed, running the pipeline");
            }
        }

        self.forum(task_id, "plan phase started").await;
        self.advance_status(task_id, TaskStatus::Phase1Plan).await?;
        self.fan_out(task, WorkPhase::Plan, WorkKind::Judge { phase: ReviewPhase::Plan })
            .await
    }

    /// One agent executing one phase.
    async fn handle_agent_phase(
        &self,
        task: &AnalysisTask,
        agent: AgentKind,
        phase: WorkPhase,
    ) -> CoreResult<()> {
        let task_id = &task.task_id;
        let capability = self.agents.get(agent)?;
        self.set_progress(task_id, agent, AgentRunStatus::Running, running_progress(phase), None)
            .await;

        match phase {
            WorkPhase::Plan => {
                let guidance = self.blackboard.guidance(task_id, ReviewPhase::Plan).await?;
                let payload = capability.plan(&task.query, guidance.as_deref()).await?;
                self.blackboard
                    .save_phase_result(task_id, agent, AgentPhase::Plan, &payload)
                    .await?;
                self.blackboard
                    .set_agent_phase(task_id, agent, AgentPhase::Plan)
                    .await?;
                self.set_progress(task_id, agent, AgentRunStatus::Running, 30, None).await;
            }
            WorkPhase::Research => {
                let plan = self
                    .require_state_dict(task_id, agent, AgentPhase::Plan)
                    .await?;
                let guidance = self
                    .blackboard
                    .guidance(task_id, ReviewPhase::Research)
                    .await?;
                let payload = capability.research(&plan, guidance.as_deref()).await?;
                self.blackboard
                    .save_phase_result(task_id, agent, AgentPhase::Research, &payload)
                    .await?;
                self.blackboard
                    .set_agent_phase(task_id, agent, AgentPhase::Research)
                    .await?;
                self.set_progress(task_id, agent, AgentRunStatus::Running, 70, None).await;
            }
            WorkPhase::Supplement => {
                let research = self
                    .require_state_dict(task_id, agent, AgentPhase::Research)
                    .await?;
                let guidance = self
                    .blackboard
                    .guidance(task_id, ReviewPhase::Research)
                    .await?
                    .unwrap_or_default();
                let payload = capability.supplement(&research, &guidance).await?;
                // Refines the research record in place.
                self.blackboard
                    .save_phase_result(task_id, agent, AgentPhase::Research, &payload)
                    .await?;
                self.set_progress(task_id, agent, AgentRunStatus::Running, 80, None).await;
            }
            WorkPhase::Report => {
                let research = self
                    .require_state_dict(task_id, agent, AgentPhase::Research)
                    .await?;
                let report = capability.report(&research).await?;
                self.blackboard
                    .save_phase_result(
                        task_id,
                        agent,
                        AgentPhase::Report,
                        &serde_json::Value::String(report),
                    )
                    .await?;
                self.blackboard
                    .set_agent_phase(task_id, agent, AgentPhase::Report)
                    .await?;
                self.set_progress(task_id, agent, AgentRunStatus::Completed, 100, None).await;
            }
        }
        Ok(())
    }

    /// Review checkpoint after a phase barrier.
    ///
    /// In standard mode the checkpoint passes through without invoking
    /// the judge.
    async fn handle_judge(&self, task: &AnalysisTask, phase: ReviewPhase) -> CoreResult<()> {
        let task_id = &task.task_id;
        match phase {
            ReviewPhase::Plan => {
                if task.mode.has_reviews() {
                    self.advance_status(task_id, TaskStatus::OrchestratingPlan).await?;
                    let outcome = self.judge.judge_plan(task_id, &task.query).await;
                    if let Some(guidance) = &outcome.guidance {
                        self.blackboard
                            .save_guidance(task_id, ReviewPhase::Plan, guidance)
                            .await?;
                    }
                    // Plan rework is not implemented: a revise verdict is
                    // recorded and the pipeline advances regardless.
                }
                self.forum(task_id, "research phase started").await;
                self.advance_status(task_id, TaskStatus::Phase2Research).await?;
                self.fan_out(
                    task,
                    WorkPhase::Research,
                    WorkKind::Judge { phase: ReviewPhase::Research },
                )
                .await
            }
            ReviewPhase::Research => {
                if !task.mode.has_reviews() {
                    return self.start_report_phase(task).await;
                }
                self.advance_status(task_id, TaskStatus::OrchestratingResearch).await?;
                let outcome = self.judge.judge_research(task_id, &task.query).await;
                if outcome.decision == JudgeDecision::Supplement {
                    // Order matters for the fan-out: guidance first, then
                    // the round counter, then the items.
                    let guidance = outcome.guidance.unwrap_or_default();
                    self.blackboard
                        .save_guidance(task_id, ReviewPhase::Research, &guidance)
                        .await?;
                    let round = self.blackboard.increment_supplement_round(task_id).await?;
                    tracing::info!(task_id = %task_id, round, "starting supplemental research round");
                    self.advance_status(task_id, TaskStatus::Phase2Supplement).await?;
                    self.forum(task_id, "supplement round started under judge guidance")
                        .await;
                    self.fan_out(task, WorkPhase::Supplement, WorkKind::BeginReport).await
                } else {
                    self.start_report_phase(task).await
                }
            }
        }
    }

    /// Fan out the report phase; the barrier chains to finalization.
    async fn start_report_phase(&self, task: &AnalysisTask) -> CoreResult<()> {
        self.advance_status(&task.task_id, TaskStatus::Phase3Report).await?;
        self.forum(&task.task_id, "report phase started").await;
        self.fan_out(task, WorkPhase::Report, WorkKind::Finalize).await
    }

    /// Collect reports, render the final document, store and cache it.
    async fn handle_finalize(&self, task: &AnalysisTask) -> CoreResult<()> {
        let task_id = &task.task_id;
        self.advance_status(task_id, TaskStatus::GeneratingFinalReport).await?;

        let reports: BTreeMap<AgentKind, String> = self
            .blackboard
            .all_phase_results(task_id, AgentPhase::Report)
            .await?
            .into_iter()
            .map(|(agent, payload)| {
                let text = payload.as_str().map_or_else(|| payload.to_string(), String::from);
                (agent, text)
            })
            .collect();

        if reports.is_empty() {
            return Err(CoreError::RenderFailed("no agent reports available".to_string()));
        }

        let forum_entries = self.blackboard.forum_log(task_id).await?;
        let forum_summary = summarize_forum_log(&forum_entries, FORUM_SUMMARY_MAX_CHARS);

        let document = self
            .renderer
            .render(&task.query, &reports, &forum_summary, task.mode.has_reviews())
            .await?;

        self.store.put_result(task_id, &document).await?;
        self.advance_status(task_id, TaskStatus::Completed).await?;

        // Cache population is best-effort; the task result is already
        // durable.
        if let Err(err) = self.cache.store(&task.query, &document).await {
            tracing::warn!(task_id = %task_id, error = %err, "failed to populate the query cache");
        }

        tracing::info!(task_id = %task_id, "analysis completed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Fan out one phase to all agents behind a fresh barrier.
    ///
    /// Idempotent per `(task, phase)`: a re-executed advancement step
    /// reuses the existing barrier and its member items.
    async fn fan_out(
        &self,
        task: &AnalysisTask,
        phase: WorkPhase,
        callback: WorkKind,
    ) -> CoreResult<()> {
        let task_id = &task.task_id;
        if let Some(existing) = self.queue.find_group(task_id, phase.as_str()).await? {
            tracing::debug!(task_id = %task_id, phase = %phase, group = %existing.id, "fan-out already exists");
            return Ok(());
        }

        let group = WorkGroup::new(task_id.clone(), phase.as_str(), 3, callback);
        let items: Vec<WorkItem> = AgentKind::ALL
            .into_iter()
            .map(|agent| {
                WorkItem::new(task_id.clone(), WorkKind::AgentPhase { agent, phase })
                    .with_group(group.id)
                    .with_max_attempts(self.max_attempts())
                    .with_idempotency_key(format!("{task_id}:{phase}:{agent}"))
            })
            .collect();

        self.queue.enqueue_group(&group, &items).await?;
        Ok(())
    }

    /// Read a prerequisite payload and require its `state_dict`.
    async fn require_state_dict(
        &self,
        task_id: &str,
        agent: AgentKind,
        phase: AgentPhase,
    ) -> CoreResult<serde_json::Value> {
        let payload = self
            .blackboard
            .phase_result(task_id, agent, phase)
            .await?
            .ok_or(CoreError::MissingPrerequisite { agent, phase })?;
        if !has_state_dict(&payload) {
            return Err(CoreError::MissingPrerequisite { agent, phase });
        }
        Ok(payload)
    }

    /// Write a synthesized fallback payload for a failed agent phase.
    async fn record_phase_fallback(
        &self,
        task_id: &str,
        agent: AgentKind,
        phase: WorkPhase,
        error: &CoreError,
    ) -> CoreResult<()> {
        let message = error.to_string();
        tracing::warn!(task_id = %task_id, agent = %agent, phase = %phase, error = %message,
            "agent phase failed, recording fallback payload");

        match phase {
            WorkPhase::Plan => {
                // No fabricated state_dict: downstream phases will treat
                // the missing resume token as this agent's failure too.
                let payload = json!({ "fallback": true, "error": message });
                self.blackboard
                    .save_phase_result(task_id, agent, AgentPhase::Plan, &payload)
                    .await?;
                self.blackboard
                    .set_agent_phase(task_id, agent, AgentPhase::Plan)
                    .await?;
            }
            WorkPhase::Research => {
                let payload = json!({
                    "fallback": true,
                    "note": format!("research unavailable: {message}"),
                });
                self.blackboard
                    .save_phase_result(task_id, agent, AgentPhase::Research, &payload)
                    .await?;
                self.blackboard
                    .set_agent_phase(task_id, agent, AgentPhase::Research)
                    .await?;
            }
            WorkPhase::Supplement => {
                // The pre-supplement research record is still valid;
                // keep it rather than clobbering it with a stub.
                if self
                    .blackboard
                    .phase_result(task_id, agent, AgentPhase::Research)
                    .await?
                    .is_none()
                {
                    let payload = json!({
                        "fallback": true,
                        "note": format!("research unavailable: {message}"),
                    });
                    self.blackboard
                        .save_phase_result(task_id, agent, AgentPhase::Research, &payload)
                        .await?;
                }
            }
            WorkPhase::Report => {
                let text = format!("{} report unavailable: {message}", agent.engine_name());
                self.blackboard
                    .save_phase_result(
                        task_id,
                        agent,
                        AgentPhase::Report,
                        &serde_json::Value::String(text),
                    )
                    .await?;
                self.blackboard
                    .set_agent_phase(task_id, agent, AgentPhase::Report)
                    .await?;
            }
        }

        self.blackboard
            .append_forum(
                task_id,
                &ForumEntry::new(
                    agent.as_str(),
                    format!("{phase} failed after retries: {message}; continuing with a fallback"),
                ),
            )
            .await?;
        self.set_progress(task_id, agent, AgentRunStatus::Failed, 0, Some(&message))
            .await;
        Ok(())
    }

    async fn set_progress(
        &self,
        task_id: &str,
        agent: AgentKind,
        status: AgentRunStatus,
        percent: u8,
        error: Option<&str>,
    ) {
        let record = AgentProgress {
            status,
            progress: percent,
            error: error.map(String::from),
        };
        if let Err(err) = self.store.set_agent_progress(task_id, agent, &record).await {
            tracing::warn!(task_id = %task_id, agent = %agent, error = %err, "failed to record agent progress");
        }
    }


    /// Monotonic status update: a stale transition (the task already
    /// moved past `status`) is ignored rather than treated as a failure,
    /// so re-executed steps stay idempotent.
    async fn advance_status(&self, task_id: &str, status: TaskStatus) -> CoreResult<()> {
        match self
            .store
            .update_status(task_id, status, status.progress_hint(), None)
            .await
        {
            Err(CoreError::InvalidTransition { from, to }) => {
                tracing::debug!(task_id = %task_id, from = %from, to = %to, "ignoring stale status transition");
                Ok(())
            }
            other => other,
        }
    }

    async fn forum(&self, task_id: &str, content: &str) {
        if let Err(err) = self
            .blackboard
            .append_forum(task_id, &ForumEntry::orchestrator(content))
            .await
        {
            tracing::warn!(task_id = %task_id, error = %err, "failed to append forum entry");
        }
    }
}


/// Initial per-agent progress marker when a phase execution starts.
fn running_progress(phase: WorkPhase) -> u8 {
    match phase {
        WorkPhase::Plan => 10,
        WorkPhase::Research => 40,
        WorkPhase::Supplement => 70,
        WorkPhase::Report => 85,
    }
}
