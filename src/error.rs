use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::policy::Denial;

/// Errors raised while loading configuration at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read { path: String, source: io::Error },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to set up logging in '{path}': {message}")]
    Logging { path: String, message: String },
}

/// Signature verification failures. Always terminal, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("signature header missing")]
    MissingSignature,

    #[error("signature does not match payload")]
    InvalidSignature,
}

/// Errors reported by a `ContainerRuntime` implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime unreachable: {0}")]
    Unavailable(String),

    #[error("no such container: {0}")]
    NoSuchContainer(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Failures from the container runtime while a restart is in flight.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("container runtime unreachable: {0}")]
    RuntimeUnavailable(String),

    #[error("container '{0}' disappeared before it could be restarted")]
    ContainerGone(String),

    #[error("runtime rejected signal {signal} for container '{container}': {message}")]
    SignalRejected {
        container: String,
        signal: String,
        message: String,
    },

    #[error("runtime error during {operation} of '{container}': {message}")]
    Runtime {
        operation: &'static str,
        container: String,
        message: String,
    },
}

/// Everything a restart endpoint can fail with, mapped to HTTP at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum RestartError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("policy denied restart: {0}")]
    PolicyDenied(#[from] Denial),

    #[error("invalid signal '{0}'")]
    InvalidSignal(String),

    #[error("no container named '{0}'")]
    NotFound(String),

    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("restart failed: {0}")]
    Execution(#[from] ExecutionError),
}

impl RestartError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RestartError::Auth(_) => StatusCode::FORBIDDEN,
            RestartError::PolicyDenied(_)
            | RestartError::InvalidSignal(_)
            | RestartError::NotFound(_) => StatusCode::BAD_REQUEST,
            RestartError::Runtime(_) | RestartError::Execution(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message returned to the webhook caller
    pub fn detail(&self) -> &'static str {
        match self {
            RestartError::Auth(AuthError::MissingSignature) => "Missing signature!",
            RestartError::Auth(AuthError::InvalidSignature) => "Invalid signature!",
            RestartError::PolicyDenied(denial) => denial.detail(),
            RestartError::InvalidSignal(_) => "Invalid signal!",
            RestartError::NotFound(_) => "Container not found!",
            RestartError::Runtime(_) => "Container runtime error!",
            RestartError::Execution(_) => "Restart failed!",
        }
    }
}

impl IntoResponse for RestartError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "detail": self.detail() }))).into_response()
    }
}
