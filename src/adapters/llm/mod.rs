//! Outbound LLM clients.

pub mod chat;

pub use chat::{ChatEndpoint, OpenAiChatModel};
