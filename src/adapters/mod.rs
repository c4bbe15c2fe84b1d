//! Adapters: concrete implementations of the domain ports.

pub mod agents;
pub mod llm;
pub mod render;
pub mod sqlite;
