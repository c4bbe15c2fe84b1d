//! Tracing initialization.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::domain::models::config::LoggingConfig;

/// Initialize the global tracing subscriber.
///
/// Returns the appender guard when file logging is configured; it must
/// be held for the lifetime of the process or buffered lines are lost.
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "triumvir.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false);
            if config.format == "json" {
                builder.json().init();
            } else {
                builder.init();
            }
            Some(guard)
        }
        None => {
            let builder = tracing_subscriber::fmt().with_env_filter(filter);
            if config.format == "json" {
                builder.json().init();
            } else {
                builder.init();
            }
            None
        }
    }
}
