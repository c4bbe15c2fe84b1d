//! Registry mapping agent kinds to their capabilities.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::agent::{AgentKind, AgentPhase};
use crate::domain::ports::ResearchAgent;

use super::mock::MockResearchAgent;

/// Holds one [`ResearchAgent`] per agent kind.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentKind, Arc<dyn ResearchAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry backed entirely by deterministic mock agents.
    pub fn with_mocks() -> Self {
        let mut registry = Self::new();
        for kind in AgentKind::ALL {
            registry.register(Arc::new(MockResearchAgent::new(kind)));
        }
        registry
    }

    /// Register (or replace) an agent capability.
    pub fn register(&mut self, agent: Arc<dyn ResearchAgent>) {
        self.agents.insert(agent.kind(), agent);
    }

    /// Resolve the capability for an agent kind.
    ///
    /// A missing registration surfaces as that agent's phase failure so
    /// the rest of the pipeline can proceed on fallbacks.
    pub fn get(&self, kind: AgentKind) -> CoreResult<Arc<dyn ResearchAgent>> {
        self.agents.get(&kind).cloned().ok_or_else(|| CoreError::AgentPhaseFailed {
            agent: kind,
            phase: AgentPhase::Plan,
            message: format!("no capability registered for agent {kind}"),
        })
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_mocks_registers_all_agents() {
        let registry = AgentRegistry::with_mocks();
        assert_eq!(registry.len(), 3);
        for kind in AgentKind::ALL {
            assert!(registry.get(kind).is_ok());
        }
    }

    #[test]
    fn test_missing_agent_is_a_phase_failure() {
        let registry = AgentRegistry::new();
        let err = registry.get(AgentKind::Media).unwrap_err();
        assert!(matches!(err, CoreError::AgentPhaseFailed { .. }));
    }
}
