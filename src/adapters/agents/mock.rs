//! Deterministic mock research agent.
//!
//! Stands in for the real research engines when none are wired up, and
//! gives tests a controllable capability: per-phase failure injection
//! with call counting.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::agent::AgentKind;
use crate::domain::models::work::WorkPhase;
use crate::domain::ports::ResearchAgent;

/// Scripted behavior for one phase of the mock agent.
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Fail this many calls before succeeding.
    pub fail_first: u32,
    /// Fail every call.
    pub always_fail: bool,
    /// Error text used for injected failures.
    pub error_message: Option<String>,
    /// Omit `state_dict` from the produced payload.
    pub omit_state_dict: bool,
}

impl MockBehavior {
    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            always_fail: true,
            error_message: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn flaky(fail_first: u32, error: impl Into<String>) -> Self {
        Self {
            fail_first,
            error_message: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Mock research agent producing canned payloads with `state_dict`
/// resume tokens.
#[derive(Debug)]
pub struct MockResearchAgent {
    kind: AgentKind,
    behaviors: Arc<Mutex<HashMap<WorkPhase, MockBehavior>>>,
    calls: Arc<Mutex<HashMap<WorkPhase, u32>>>,
}

impl MockResearchAgent {
    pub fn new(kind: AgentKind) -> Self {
        Self {
            kind,
            behaviors: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Script a phase's behavior.
    pub async fn set_behavior(&self, phase: WorkPhase, behavior: MockBehavior) {
        self.behaviors.lock().await.insert(phase, behavior);
    }

    /// How many times a phase was invoked.
    pub async fn calls(&self, phase: WorkPhase) -> u32 {
        self.calls.lock().await.get(&phase).copied().unwrap_or(0)
    }

    /// Record the call and fail if the script says so. Returns whether
    /// the payload should omit its state dict.
    async fn gate(&self, phase: WorkPhase) -> CoreResult<bool> {
        let count = {
            let mut calls = self.calls.lock().await;
            let entry = calls.entry(phase).or_insert(0);
            *entry += 1;
            *entry
        };

        let behaviors = self.behaviors.lock().await;
        let Some(behavior) = behaviors.get(&phase) else {
            return Ok(false);
        };
        if behavior.always_fail || count <= behavior.fail_first {
            let message = behavior
                .error_message
                .clone()
                .unwrap_or_else(|| format!("injected {phase} failure"));
            return Err(CoreError::TransientBackend(message));
        }
        Ok(behavior.omit_state_dict)
    }

    fn state_dict(&self, stage: &str) -> serde_json::Value {
        json!({
            "engine": self.kind.engine_name(),
            "stage": stage,
        })
    }
}

#[async_trait]
impl ResearchAgent for MockResearchAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    async fn plan(
        &self,
        query: &str,
        guidance: Option<&str>,
    ) -> CoreResult<serde_json::Value> {
        let omit = self.gate(WorkPhase::Plan).await?;
        let mut payload = json!({
            "paragraph_count": 4,
            "keywords": [query, self.kind.as_str()],
            "guidance_applied": guidance,
        });
        if !omit {
            payload["state_dict"] = self.state_dict("plan");
        }
        Ok(payload)
    }

    async fn research(
        &self,
        plan: &serde_json::Value,
        guidance: Option<&str>,
    ) -> CoreResult<serde_json::Value> {
        let omit = self.gate(WorkPhase::Research).await?;
        let mut payload = json!({
            "findings": format!(
                "{} findings for {}",
                self.kind.engine_name(),
                plan["keywords"][0].as_str().unwrap_or("the query")
            ),
            "guidance_applied": guidance,
        });
        if !omit {
            payload["state_dict"] = self.state_dict("research");
        }
        Ok(payload)
    }

    async fn supplement(
        &self,
        research: &serde_json::Value,
        guidance: &str,
    ) -> CoreResult<serde_json::Value> {
        let omit = self.gate(WorkPhase::Supplement).await?;
        let mut payload = research.clone();
        payload["supplement"] = json!({ "guidance": guidance });
        if omit {
            if let Some(map) = payload.as_object_mut() {
                map.remove("state_dict");
            }
        } else {
            payload["state_dict"] = self.state_dict("supplement");
        }
        Ok(payload)
    }

    async fn report(&self, research: &serde_json::Value) -> CoreResult<String> {
        self.gate(WorkPhase::Report).await?;
        let findings = research["findings"].as_str().unwrap_or("no findings");
        Ok(format!("{} report: {findings}", self.kind.engine_name()))
    }
}
