//! Default final-report renderer.
//!
//! Assembles the IR document from the per-agent reports and the forum
//! summary. Deterministic: no model calls, so finalization cannot hang
//! on an external dependency unless a richer renderer is wired in.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::agent::AgentKind;
use crate::domain::models::document::{
    DocumentMetadata, DocumentSection, DocumentSummary, ReportDocument, SourceRef,
};
use crate::domain::ports::ReportRenderer;

/// Renderer that consolidates agent reports into the IR document.
#[derive(Debug, Clone, Default)]
pub struct DocumentAssembler;

impl DocumentAssembler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReportRenderer for DocumentAssembler {
    async fn render(
        &self,
        query: &str,
        reports: &BTreeMap<AgentKind, String>,
        forum_summary: &str,
        phased: bool,
    ) -> CoreResult<ReportDocument> {
        if reports.is_empty() {
            return Err(CoreError::RenderFailed(
                "no agent reports available".to_string(),
            ));
        }

        let sections: Vec<DocumentSection> = reports
            .iter()
            .map(|(agent, report)| DocumentSection {
                title: format!("{} findings", agent.engine_name()),
                content: report.clone(),
            })
            .collect();

        let sources: Vec<SourceRef> = AgentKind::ALL
            .into_iter()
            .map(|agent| SourceRef {
                engine: agent.engine_name().to_string(),
                count: u32::from(reports.contains_key(&agent)),
            })
            .collect();

        let has_forum_log = !forum_summary.is_empty();

        Ok(ReportDocument {
            metadata: DocumentMetadata {
                query: query.to_string(),
                title: format!("{query} Analysis Report"),
                generated_at: Utc::now(),
                phased,
                has_forum_log,
            },
            summary: DocumentSummary {
                highlights: vec![format!(
                    "Synthesized from {} research engine reports",
                    reports.len()
                )],
            },
            sections,
            forum_log: has_forum_log.then(|| forum_summary.to_string()),
            sources,
        })
    }
}
