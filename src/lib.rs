pub mod api;
pub mod error;
pub mod logging;
pub mod policy;
pub mod restart;
pub mod runtime;
pub mod utils;
pub mod webhook;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use error::ConfigError;
use logging::LogRotation;
use restart::RestartExecutor;
use runtime::ContainerRuntime;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";
pub const DEFAULT_RESTART_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_LOG_FILES: usize = 5;

pub const SECRET_ENV: &str = "WEBHOOK_SECRET";
pub const BIND_ADDRESS_ENV: &str = "BIND_ADDRESS";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RestartHookConfig {
    pub bind_address: String,
    /// Grace period handed to the runtime for plain restarts
    pub restart_timeout_secs: u64,
    /// Hold a per-container lock while a restart runs
    pub serialize_restarts: bool,
    /// Write rotated log files here in addition to stdout
    pub log_dir: Option<PathBuf>,
    pub log_max_files: usize,
    pub log_rotation: LogRotation,
    pub webhook_secret: Option<String>,
}

impl Default for RestartHookConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            restart_timeout_secs: DEFAULT_RESTART_TIMEOUT_SECS,
            serialize_restarts: false,
            log_dir: None,
            log_max_files: DEFAULT_MAX_LOG_FILES,
            log_rotation: LogRotation::default(),
            webhook_secret: None,
        }
    }
}

impl RestartHookConfig {
    /// Environment variables win over the config file.
    pub fn apply_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(secret) = lookup(SECRET_ENV) {
            self.webhook_secret = Some(secret);
        }
        if let Some(bind_address) = lookup(BIND_ADDRESS_ENV) {
            self.bind_address = bind_address;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::Invalid("bind_address is empty".to_string()));
        }
        if self.restart_timeout_secs > isize::MAX as u64 {
            return Err(ConfigError::Invalid(format!(
                "restart_timeout_secs is out of range: {}",
                self.restart_timeout_secs
            )));
        }
        if self.log_max_files == 0 {
            return Err(ConfigError::Invalid(
                "log_max_files must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_secs(self.restart_timeout_secs)
    }

    pub fn auth_mode(&self) -> AuthMode {
        AuthMode::from_secret(self.webhook_secret.clone())
    }
}

/// Parse a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<RestartHookConfig, ConfigError> {
    let config_str = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RestartHookConfig::default()),
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source: e,
            });
        }
    };

    parse_config(&config_str, path)
}

pub fn parse_config(config_str: &str, path: &Path) -> Result<RestartHookConfig, ConfigError> {
    toml::from_str(config_str).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })
}

/// How deliveries are authenticated.
///
/// `Open` skips signature checks entirely and is meant for local use only.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    Open,
    Secret(String),
}

impl AuthMode {
    /// An absent or empty secret means open mode
    pub fn from_secret(secret: Option<String>) -> Self {
        match secret {
            Some(s) if !s.is_empty() => AuthMode::Secret(s),
            _ => AuthMode::Open,
        }
    }

    pub fn secret(&self) -> Option<&str> {
        match self {
            AuthMode::Open => None,
            AuthMode::Secret(s) => Some(s),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, AuthMode::Open)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuthMode::Open => "open",
            AuthMode::Secret(_) => "secret",
        }
    }
}

// Never print the secret
impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Open => f.write_str("Open"),
            AuthMode::Secret(_) => f.write_str("Secret(***)"),
        }
    }
}

pub struct AppState {
    pub auth: AuthMode,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub executor: Arc<RestartExecutor>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn from_config(config: &RestartHookConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let executor = RestartExecutor::new(Arc::clone(&runtime), config.restart_timeout())
            .with_serialization(config.serialize_restarts);

        Self {
            auth: config.auth_mode(),
            runtime,
            executor: Arc::new(executor),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config_file() {
        let config = load_config(Path::new("/nonexistent/restart_hook.toml")).unwrap();
        assert_eq!(config, RestartHookConfig::default());
        assert_eq!(config.restart_timeout(), Duration::from_secs(30));
        assert!(config.auth_mode().is_open());
    }

    #[test]
    fn parses_partial_config() {
        let config = parse_config(
            "restart_timeout_secs = 10\nserialize_restarts = true\n",
            Path::new("test.toml"),
        )
        .unwrap();
        assert_eq!(config.restart_timeout_secs, 10);
        assert!(config.serialize_restarts);
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.log_rotation, LogRotation::Daily);
    }

    #[test]
    fn parses_log_rotation() {
        let config = parse_config("log_rotation = \"hourly\"\n", Path::new("test.toml")).unwrap();
        assert_eq!(config.log_rotation, LogRotation::Hourly);

        let err = parse_config("log_rotation = \"weekly\"\n", Path::new("test.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = parse_config("restart_timeout = 10\n", Path::new("test.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_file_values() {
        let config = RestartHookConfig {
            webhook_secret: Some("from-file".to_string()),
            ..Default::default()
        }
        .apply_env_overrides(|key| match key {
            SECRET_ENV => Some("from-env".to_string()),
            BIND_ADDRESS_ENV => Some("127.0.0.1:9000".to_string()),
            _ => None,
        });
        assert_eq!(config.webhook_secret.as_deref(), Some("from-env"));
        assert_eq!(config.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn empty_secret_is_open_mode() {
        assert!(AuthMode::from_secret(Some(String::new())).is_open());
        assert!(AuthMode::from_secret(None).is_open());
        assert_eq!(
            AuthMode::from_secret(Some("s".to_string())).secret(),
            Some("s")
        );
    }

    #[test]
    fn secret_is_redacted_in_debug_output() {
        let mode = AuthMode::Secret("hunter2".to_string());
        assert_eq!(format!("{:?}", mode), "Secret(***)");
    }

    #[test]
    fn validation_catches_bad_values() {
        let config = RestartHookConfig {
            bind_address: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RestartHookConfig {
            log_max_files: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(RestartHookConfig::default().validate().is_ok());
    }
}
