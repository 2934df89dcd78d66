use serde::Deserialize;
use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::RestartHookConfig;
use crate::error::ConfigError;

const DEFAULT_LOG_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "restart_hook";

/// How often log files roll over, set with `log_rotation` in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Rolling file output under `log_directory`, keeping at most `max_files`
pub struct FileLogger {
    log_directory: PathBuf,
    max_files: usize,
    rotation: LogRotation,
}

impl FileLogger {
    /// File settings from the config, or `None` when `log_dir` is unset
    pub fn from_config(config: &RestartHookConfig) -> Option<Self> {
        config.log_dir.as_ref().map(|dir| Self {
            log_directory: dir.clone(),
            max_files: config.log_max_files,
            rotation: config.log_rotation,
        })
    }

    /// Create the rolling appender and wrap it in a non-blocking writer.
    /// The guard must live as long as logging is needed.
    pub fn setup_file_logging(&self) -> Result<(NonBlocking, WorkerGuard), ConfigError> {
        let logging_error = |message: String| ConfigError::Logging {
            path: self.log_directory.display().to_string(),
            message,
        };

        // Ensure log directory exists
        std::fs::create_dir_all(&self.log_directory).map_err(|e| logging_error(e.to_string()))?;

        let file_appender = RollingFileAppender::builder()
            .rotation(self.rotation.into())
            .filename_prefix(LOG_FILE_PREFIX)
            .max_log_files(self.max_files)
            .build(&self.log_directory)
            .map_err(|e| logging_error(e.to_string()))?;

        Ok(tracing_appender::non_blocking(file_appender))
    }
}

/// Install the global subscriber: console output, plus rotated files when
/// `log_dir` is set. `RUST_LOG` overrides the default `info` filter.
pub fn setup_logging(config: &RestartHookConfig) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (file_layer, guard) = match FileLogger::from_config(config) {
        Some(file_logger) => {
            let (writer, guard) = file_logger.setup_file_logging()?;
            let layer = fmt::layer().with_writer(writer).with_ansi(false); // Disable ANSI colors for file logs
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer()) // Console output
        .with(file_layer)
        .init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_log_dir_means_console_only() {
        assert!(FileLogger::from_config(&RestartHookConfig::default()).is_none());
    }

    #[test]
    fn file_logging_creates_missing_directory() {
        let dir = std::env::temp_dir().join(format!("restart_hook_logs_{}", uuid::Uuid::now_v7()));
        assert!(!dir.exists());

        let config = RestartHookConfig {
            log_dir: Some(dir.clone()),
            log_max_files: 2,
            log_rotation: LogRotation::Never,
            ..Default::default()
        };
        let logger = FileLogger::from_config(&config).unwrap();
        assert_eq!(logger.rotation, LogRotation::Never);
        let (_writer, guard) = logger.setup_file_logging().unwrap();
        assert!(dir.is_dir());

        drop(guard);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
