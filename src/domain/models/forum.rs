//! Forum log entries and the renderer-facing summary.
//!
//! The workflow engine and the judge append to a per-task forum log at
//! every meaningful step. The finalizer condenses it into a bounded
//! summary for the final renderer: decision-bearing entries first,
//! routine chatter only if it fits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker name used by the orchestrator for its own entries.
pub const ORCHESTRATOR_SPEAKER: &str = "orchestrator";

/// Character budget for the rendered forum summary.
pub const FORUM_SUMMARY_MAX_CHARS: usize = 2000;

/// Sentinel appended when entries had to be dropped or cut to fit.
pub const TRUNCATION_SENTINEL: &str = "...(forum log truncated)";

/// Vocabulary that marks an entry as decision-bearing.
const IMPORTANT_VOCABULARY: [&str; 7] = [
    "review",
    "decision",
    "guidance",
    "supplement",
    "approve",
    "revise",
    "adjust",
];

/// Vocabulary of routine status chatter, skipped unless the orchestrator
/// is speaking.
const ROUTINE_VOCABULARY: [&str; 3] = ["phase started", "starting phase", "initializing"];

/// One entry in a task's forum log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumEntry {
    pub speaker: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ForumEntry {
    pub fn new(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Entry spoken by the orchestrator.
    pub fn orchestrator(content: impl Into<String>) -> Self {
        Self::new(ORCHESTRATOR_SPEAKER, content)
    }

    fn is_orchestrator(&self) -> bool {
        self.speaker == ORCHESTRATOR_SPEAKER
    }

    fn is_important(&self) -> bool {
        if self.is_orchestrator() {
            return true;
        }
        let lower = self.content.to_lowercase();
        IMPORTANT_VOCABULARY.iter().any(|kw| lower.contains(kw))
    }

    fn is_routine(&self) -> bool {
        let lower = self.content.to_lowercase();
        ROUTINE_VOCABULARY.iter().any(|kw| lower.contains(kw))
    }

    fn summary_line(&self) -> String {
        format!("[{}] {}", self.speaker, self.content)
    }
}

/// Condense the forum log into a summary bounded by `max_chars`.
///
/// Decision-bearing entries are kept first (in log order), then remaining
/// entries fill the budget in order. Routine non-orchestrator chatter is
/// filtered out entirely. Whenever budget pressure drops or cuts a line,
/// the summary ends with [`TRUNCATION_SENTINEL`].
pub fn summarize_forum_log(entries: &[ForumEntry], max_chars: usize) -> String {
    let mut important_lines: Vec<String> = Vec::new();
    let mut other_lines: Vec<String> = Vec::new();

    for entry in entries {
        if entry.is_routine() && !entry.is_orchestrator() {
            continue;
        }
        let line = entry.summary_line();
        if entry.is_important() {
            important_lines.push(line);
        } else {
            other_lines.push(line);
        }
    }

    let mut selected = important_lines;
    let mut current: usize = selected.iter().map(|l| l.chars().count()).sum::<usize>()
        + selected.len().saturating_sub(1);
    let mut dropped = false;

    for line in other_lines {
        let added = line.chars().count() + 1;
        if current + added > max_chars {
            dropped = true;
            break;
        }
        current += added;
        selected.push(line);
    }

    let result = selected.join("\n");
    let total = result.chars().count();
    let sentinel_len = TRUNCATION_SENTINEL.chars().count() + 1;

    if total > max_chars {
        // The decision-bearing entries alone overflow the budget.
        let keep = max_chars.saturating_sub(sentinel_len);
        let mut cut: String = result.chars().take(keep).collect();
        cut.push('\n');
        cut.push_str(TRUNCATION_SENTINEL);
        return cut;
    }

    if dropped {
        if total + sentinel_len <= max_chars {
            let mut out = result;
            out.push('\n');
            out.push_str(TRUNCATION_SENTINEL);
            return out;
        }
        let keep = max_chars.saturating_sub(sentinel_len);
        let mut cut: String = result.chars().take(keep).collect();
        cut.push('\n');
        cut.push_str(TRUNCATION_SENTINEL);
        return cut;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(speaker: &str, content: &str) -> ForumEntry {
        ForumEntry::new(speaker, content)
    }

    #[test]
    fn test_summary_keeps_everything_under_budget() {
        let entries = vec![
            entry("orchestrator", "plan review decision: approve"),
            entry("query", "collected 12 sources"),
        ];
        let summary = summarize_forum_log(&entries, FORUM_SUMMARY_MAX_CHARS);
        assert!(summary.contains("[orchestrator] plan review decision: approve"));
        assert!(summary.contains("[query] collected 12 sources"));
        assert!(!summary.contains(TRUNCATION_SENTINEL));
    }

    #[test]
    fn test_important_entries_come_first() {
        let entries = vec![
            entry("media", "downloaded transcripts"),
            entry("insight", "guidance applied to the analysis"),
        ];
        let summary = summarize_forum_log(&entries, FORUM_SUMMARY_MAX_CHARS);
        let important_pos = summary.find("[insight]").unwrap();
        let other_pos = summary.find("[media]").unwrap();
        assert!(important_pos < other_pos);
    }

    #[test]
    fn test_routine_non_orchestrator_entries_skipped() {
        let entries = vec![
            entry("query", "plan phase started"),
            entry("orchestrator", "plan phase started"),
        ];
        let summary = summarize_forum_log(&entries, FORUM_SUMMARY_MAX_CHARS);
        assert!(!summary.contains("[query]"));
        assert!(summary.contains("[orchestrator]"));
    }

    #[test]
    fn test_budget_enforced_with_sentinel() {
        let mut entries = Vec::new();
        for i in 0..200 {
            entries.push(entry("query", &format!("routine progress note number {i}")));
        }
        let summary = summarize_forum_log(&entries, FORUM_SUMMARY_MAX_CHARS);
        assert!(summary.chars().count() <= FORUM_SUMMARY_MAX_CHARS);
        assert!(summary.ends_with(TRUNCATION_SENTINEL));
    }

    #[test]
    fn test_important_overflow_is_cut_with_sentinel() {
        let mut entries = Vec::new();
        for i in 0..200 {
            entries.push(entry(
                "orchestrator",
                &format!("decision round {i}: approve with detailed reasoning attached"),
            ));
        }
        let summary = summarize_forum_log(&entries, FORUM_SUMMARY_MAX_CHARS);
        assert!(summary.chars().count() <= FORUM_SUMMARY_MAX_CHARS);
        assert!(summary.ends_with(TRUNCATION_SENTINEL));
    }

    #[test]
    fn test_no_sentinel_when_raw_fits() {
        let entries = vec![entry("orchestrator", "decision: approve")];
        let summary = summarize_forum_log(&entries, FORUM_SUMMARY_MAX_CHARS);
        assert!(!summary.contains(TRUNCATION_SENTINEL));
    }

    #[test]
    fn test_empty_log_summary_is_empty() {
        assert_eq!(summarize_forum_log(&[], FORUM_SUMMARY_MAX_CHARS), "");
    }
}
