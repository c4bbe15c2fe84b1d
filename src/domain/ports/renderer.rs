//! Final report renderer port.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::domain::errors::CoreResult;
use crate::domain::models::agent::AgentKind;
use crate::domain::models::document::ReportDocument;

/// External capability that consolidates per-agent reports and the forum
/// summary into the final IR document.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(
        &self,
        query: &str,
        reports: &BTreeMap<AgentKind, String>,
        forum_summary: &str,
        phased: bool,
    ) -> CoreResult<ReportDocument>;
}
