//! Infrastructure: configuration, logging, and background maintenance.

pub mod config;
pub mod logging;
pub mod sweeper;

pub use config::{ConfigError, ConfigLoader};
pub use logging::init_tracing;
pub use sweeper::spawn_sweeper;
