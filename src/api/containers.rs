//! Container listing endpoint

use axum::{Json, extract::State as AxumState};
use serde_json::{Value, json};
use tracing::error;

use crate::SharedState;
use crate::error::RestartError;

/// GET /containers - names of the currently running containers
pub async fn list_containers(
    AxumState(state): AxumState<SharedState>,
) -> Result<Json<Value>, RestartError> {
    let containers = state.runtime.list_containers(false).await.map_err(|e| {
        error!("Failed to list containers: {}", e);
        RestartError::Runtime(e.to_string())
    })?;

    let names: Vec<String> = containers.into_iter().map(|c| c.name).collect();
    Ok(Json(json!({ "containers": names })))
}
