//! Ports: trait seams between the core and its collaborators.

pub mod blackboard;
pub mod chat_model;
pub mod query_cache;
pub mod renderer;
pub mod research_agent;
pub mod task_store;
pub mod work_queue;

pub use blackboard::{Blackboard, BlackboardSummary};
pub use chat_model::{ChatModel, ChatRequest};
pub use query_cache::{CacheHit, CacheHitKind, QueryCache};
pub use renderer::ReportRenderer;
pub use research_agent::ResearchAgent;
pub use task_store::{TaskStats, TaskStore};
pub use work_queue::WorkQueue;
