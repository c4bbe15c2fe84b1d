//! Judge decisions and the review reply grammar.
//!
//! The orchestrator's LLM replies in a line-oriented format:
//!
//! ```text
//! DECISION: <APPROVE|REVISE|SUPPLEMENT>
//! GUIDANCE: <free text, optional>
//! ```
//!
//! Keys are case-insensitive. Anything else is a parse error; callers
//! coerce every failure to an approve decision.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{CoreError, CoreResult};

/// The two phases the judge reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPhase {
    Plan,
    Research,
}

impl ReviewPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Research => "research",
        }
    }

    /// Decisions the grammar admits for this phase.
    pub fn valid_decisions(&self) -> &'static [JudgeDecision] {
        match self {
            Self::Plan => &[JudgeDecision::Approve, JudgeDecision::Revise],
            Self::Research => &[JudgeDecision::Approve, JudgeDecision::Supplement],
        }
    }
}

impl std::fmt::Display for ReviewPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decision returned by the judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeDecision {
    Approve,
    Revise,
    Supplement,
}

impl JudgeDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Revise => "revise",
            Self::Supplement => "supplement",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "revise" => Some(Self::Revise),
            "supplement" => Some(Self::Supplement),
            _ => None,
        }
    }
}

impl std::fmt::Display for JudgeDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed judge reply: a decision plus optional guidance text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeOutcome {
    pub decision: JudgeDecision,
    pub guidance: Option<String>,
}

impl JudgeOutcome {
    /// The mandatory fallback when anything about the review fails.
    pub fn approve() -> Self {
        Self {
            decision: JudgeDecision::Approve,
            guidance: None,
        }
    }
}

/// Parse a raw judge reply against the review grammar.
///
/// The first `DECISION:` line wins; `GUIDANCE:` lines are joined in order.
/// A decision outside the phase's valid set, or a reply with no decision
/// line at all, is a [`CoreError::JudgeFailed`].
pub fn parse_judge_reply(phase: ReviewPhase, reply: &str) -> CoreResult<JudgeOutcome> {
    let mut decision: Option<JudgeDecision> = None;
    let mut guidance_lines: Vec<&str> = Vec::new();

    for line in reply.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();
        if let Some(rest) = lower.strip_prefix("decision:") {
            if decision.is_none() {
                decision = JudgeDecision::from_str(rest);
                if decision.is_none() {
                    return Err(CoreError::JudgeFailed(format!(
                        "unrecognized decision {:?}",
                        rest.trim()
                    )));
                }
            }
        } else if lower.starts_with("guidance:") {
            // Preserve original casing of the guidance text.
            let value = trimmed[9..].trim();
            if !value.is_empty() {
                guidance_lines.push(value);
            }
        }
    }

    let decision = decision
        .ok_or_else(|| CoreError::JudgeFailed("reply contains no decision line".to_string()))?;

    if !phase.valid_decisions().contains(&decision) {
        return Err(CoreError::JudgeFailed(format!(
            "decision {decision} is not valid for the {phase} review"
        )));
    }

    let guidance = if guidance_lines.is_empty() {
        None
    } else {
        Some(guidance_lines.join("\n"))
    };

    Ok(JudgeOutcome { decision, guidance })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_approve() {
        let outcome = parse_judge_reply(ReviewPhase::Plan, "DECISION: APPROVE").unwrap();
        assert_eq!(outcome.decision, JudgeDecision::Approve);
        assert_eq!(outcome.guidance, None);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let outcome =
            parse_judge_reply(ReviewPhase::Plan, "decision: Revise\nguidance: add sources")
                .unwrap();
        assert_eq!(outcome.decision, JudgeDecision::Revise);
        assert_eq!(outcome.guidance.as_deref(), Some("add sources"));
    }

    #[test]
    fn test_parse_supplement_with_guidance() {
        let reply = "DECISION: SUPPLEMENT\nGUIDANCE: dig into regional sales data";
        let outcome = parse_judge_reply(ReviewPhase::Research, reply).unwrap();
        assert_eq!(outcome.decision, JudgeDecision::Supplement);
        assert_eq!(
            outcome.guidance.as_deref(),
            Some("dig into regional sales data")
        );
    }

    #[test]
    fn test_guidance_casing_preserved() {
        let reply = "DECISION: REVISE\nGUIDANCE: Compare EU and US markets";
        let outcome = parse_judge_reply(ReviewPhase::Plan, reply).unwrap();
        assert_eq!(outcome.guidance.as_deref(), Some("Compare EU and US markets"));
    }

    #[test]
    fn test_multiple_guidance_lines_joined() {
        let reply = "DECISION: SUPPLEMENT\nGUIDANCE: first\nGUIDANCE: second";
        let outcome = parse_judge_reply(ReviewPhase::Research, reply).unwrap();
        assert_eq!(outcome.guidance.as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn test_first_decision_wins() {
        let reply = "DECISION: APPROVE\nDECISION: SUPPLEMENT";
        let outcome = parse_judge_reply(ReviewPhase::Research, reply).unwrap();
        assert_eq!(outcome.decision, JudgeDecision::Approve);
    }

    #[test]
    fn test_empty_reply_is_error() {
        assert!(parse_judge_reply(ReviewPhase::Plan, "").is_err());
        assert!(parse_judge_reply(ReviewPhase::Plan, "looks good to me!").is_err());
    }

    #[test]
    fn test_unknown_decision_is_error() {
        assert!(parse_judge_reply(ReviewPhase::Plan, "DECISION: MAYBE").is_err());
    }

    #[test]
    fn test_phase_mismatch_is_error() {
        // SUPPLEMENT is not valid for the plan review, REVISE not for research.
        assert!(parse_judge_reply(ReviewPhase::Plan, "DECISION: SUPPLEMENT").is_err());
        assert!(parse_judge_reply(ReviewPhase::Research, "DECISION: REVISE").is_err());
    }

    #[test]
    fn test_surrounding_noise_tolerated() {
        let reply = "After reviewing all three plans:\nDECISION: APPROVE\nThanks.";
        let outcome = parse_judge_reply(ReviewPhase::Plan, reply).unwrap();
        assert_eq!(outcome.decision, JudgeDecision::Approve);
    }
}
