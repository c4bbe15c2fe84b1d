//! Triumvir - phased multi-agent analysis orchestration core.
//!
//! Three research agents (web search, media, insight) work through
//! plan, research, and report phases under an orchestrator judge, with:
//! - A durable blackboard carrying phase results, guidance, and a forum log
//! - A work queue with fan-out barrier groups driving the phase machine
//! - A task status store behind a polling HTTP API
//! - A similarity-aware query result cache
//! - Failure isolation via per-agent fallback payloads

pub mod adapters;
pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
