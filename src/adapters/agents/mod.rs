//! Research agent adapters.

pub mod mock;
pub mod registry;

pub use mock::{MockBehavior, MockResearchAgent};
pub use registry::AgentRegistry;
