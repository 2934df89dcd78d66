//! Health and server status endpoints

use axum::{
    Json,
    extract::Query,
    extract::State as AxumState,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::SharedState;

/// Root health check endpoint
/// Supports ?format=json for a JSON response
pub async fn root(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if params.get("format").map(String::as_str) == Some("json") {
        Json(json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": state.start_time.elapsed().as_secs(),
            "status": "healthy"
        }))
        .into_response()
    } else {
        concat!(env!("CARGO_PKG_NAME"), " - healthy").into_response()
    }
}

/// Returns server metadata and the restart settings in effect
pub async fn status(AxumState(state): AxumState<SharedState>) -> Json<Value> {
    Json(json!({
        "server": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
        },
        "auth_mode": state.auth.label(),
        "restart": {
            "timeout_seconds": state.executor.restart_timeout().as_secs(),
            "serialized": state.executor.is_serialized(),
        }
    }))
}
