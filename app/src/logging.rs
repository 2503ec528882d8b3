use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,doclens_core=debug";
pub const LOG_FILE_NAME: &str = "doclens.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] TryInitError),
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub default_filter: String,
    pub include_location: bool,
}

impl LoggingConfig {
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            default_filter: DEFAULT_FILTER.to_string(),
            include_location: cfg!(debug_assertions),
        }
    }

    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Keep the returned guard alive until exit so buffered lines are flushed.
pub fn init(config: &LoggingConfig) -> Result<WorkerGuard, LoggingError> {
    std::fs::create_dir_all(&config.log_dir).map_err(|source| LoggingError::CreateDir {
        path: config.log_dir.clone(),
        source,
    })?;

    let appender = tracing_appender::rolling::never(&config.log_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
