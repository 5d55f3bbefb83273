//! Tracing subscriber setup.
//!
//! Events go to stderr and, when a directory is configured, to a daily
//! rolling file `cityaq.log.YYYY-MM-DD`. `RUST_LOG` overrides the configured
//! level.

use std::path::PathBuf;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LoggingSettings, DEFAULT_LOG_LEVEL};

/// Prefix of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "cityaq.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("creating log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("installing tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn directive(&self) -> String {
        format!("cityaq={0},cityaq_cli={0}", self.level)
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            directory: settings.directory.clone(),
        }
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the life of the process.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directive()));

    // The offset must be read before any threads start.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(offset, Rfc3339);

    let stderr = fmt::layer()
        .with_timer(timer.clone())
        .with_writer(std::io::stderr);

    let (file, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LoggingError::Directory {
                path: dir.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_timer(timer)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_default_directive() {
        assert_eq!(
            LoggingConfig::default().directive(),
            "cityaq=info,cityaq_cli=info"
        );
    }

    #[test]
    fn test_from_settings() {
        let settings = LoggingSettings {
            directory: Some(PathBuf::from("/tmp/cityaq-logs")),
            level: "debug".into(),
        };
        let config = LoggingConfig::from(&settings);
        assert_eq!(config.level, "debug");
        assert_eq!(config.directory.as_deref(), Some(Path::new("/tmp/cityaq-logs")));
    }

    #[test]
    fn test_builder_pattern() {
        let config = LoggingConfig::default()
            .with_level("warn")
            .with_directory("/var/log/cityaq");
        assert_eq!(config.directive(), "cityaq=warn,cityaq_cli=warn");
        assert!(config.directory.is_some());
    }
}
