//! The rendered analysis document (IR) and its output projections.
//!
//! The finalizer stores one IR document per completed task. The result
//! endpoint serves it as JSON, or projects it to HTML or Markdown with
//! simple deterministic templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document metadata block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub query: String,
    pub title: String,
    pub generated_at: DateTime<Utc>,
    /// Whether the task ran the phased pipeline
    pub phased: bool,
    pub has_forum_log: bool,
}

/// Summary block: headline findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub highlights: Vec<String>,
}

/// One content section, typically one research engine's report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub title: String,
    pub content: String,
}

/// Attribution entry for a contributing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub engine: String,
    pub count: u32,
}

/// The complete rendered analysis document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub metadata: DocumentMetadata,
    pub summary: DocumentSummary,
    pub sections: Vec<DocumentSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forum_log: Option<String>,
    pub sources: Vec<SourceRef>,
}

impl ReportDocument {
    /// Project the document to a standalone HTML page.
    pub fn to_html(&self) -> String {
        let title = escape_html(&self.metadata.title);
        let mut html = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
             <style>\nbody {{ font-family: sans-serif; max-width: 900px; margin: 0 auto; \
             padding: 20px; line-height: 1.6; }}\nh1 {{ border-bottom: 2px solid #e0e0e0; \
             padding-bottom: 10px; }}\n.highlight {{ background: #fff3cd; padding: 10px; \
             margin: 10px 0; border-left: 4px solid #ffc107; }}\n.section {{ margin: 20px 0; \
             padding: 15px; border: 1px solid #e0e0e0; border-radius: 8px; }}\n</style>\n\
             </head>\n<body>\n<h1>{title}</h1>\n"
        );

        if !self.summary.highlights.is_empty() {
            html.push_str("<div class=\"summary\"><h2>Summary</h2>\n");
            for highlight in &self.summary.highlights {
                html.push_str(&format!(
                    "<div class=\"highlight\">{}</div>\n",
                    escape_html(highlight)
                ));
            }
            html.push_str("</div>\n");
        }

        for section in &self.sections {
            html.push_str(&format!(
                "<div class=\"section\"><h2>{}</h2>\n<p>{}</p>\n</div>\n",
                escape_html(&section.title),
                escape_html(&section.content)
            ));
        }

        html.push_str("</body></html>");
        html
    }

    /// Project the document to Markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = format!("# {}\n\n", self.metadata.title);

        if !self.summary.highlights.is_empty() {
            md.push_str("## Summary\n\n");
            for highlight in &self.summary.highlights {
                md.push_str(&format!("- {highlight}\n"));
            }
            md.push('\n');
        }

        for section in &self.sections {
            md.push_str(&format!("## {}\n\n{}\n\n", section.title, section.content));
        }

        md
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
