//! Structured logging setup.

use crate::config::LogConfig;
use anyhow::{Context, Result};
use std::fs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Where log records are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Daily-rolling file under the configured directory; the terminal belongs to the UI
    File,
    /// Standard error, leaving stdout for the reply
    Stderr,
}

/// Filter from `RUST_LOG`, falling back to the configured level.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Calling it twice keeps the first subscriber.
pub fn init(config: &LogConfig, target: LogTarget) -> Result<()> {
    let filter = env_filter(&config.level);

    match target {
        LogTarget::File => {
            fs::create_dir_all(&config.directory).with_context(|| {
                format!("Failed to create log directory {}", config.directory.display())
            })?;
            let appender =
                RollingFileAppender::new(Rotation::DAILY, &config.directory, "streamchat.log");
            let file_layer = fmt::layer().with_writer(appender).with_ansi(false);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .try_init();
        }
        LogTarget::Stderr => {
            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init();
        }
    }

    Ok(())
}
