//! Restart endpoints.
//!
//! Both endpoints run the same pipeline: verify the signature, evaluate the
//! policy, locate the container, then hand off to the executor. Nothing
//! touches the container runtime before the first two steps pass.

use axum::{
    Json,
    body::Bytes,
    extract::State as AxumState,
    extract::{Path, Query},
    http::HeaderMap,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::SharedState;
use crate::error::RestartError;
use crate::policy::{Decision, RestartPolicy, evaluate};
use crate::restart::{Completion, RestartRequest, Signal};
use crate::utils::{locate_container, verify_signature};
use crate::webhook::WebhookEvent;

pub const DRY_RUN_HEADER: &str = "x-dry-run";

/// Query parameters shared by both restart endpoints
#[derive(Debug, Default, Deserialize)]
pub struct RestartParams {
    /// Signal to send instead of a plain restart, e.g. `SIGHUP`
    pub signal: Option<String>,
    pub branch: Option<String>,
    /// Wait for the restart to finish and report its outcome
    #[serde(default)]
    pub wait: bool,
    #[serde(default)]
    pub dry_run: bool,
}

impl RestartParams {
    fn branch(&self) -> Option<&str> {
        self.branch.as_deref().filter(|b| !b.is_empty())
    }

    fn completion(&self) -> Completion {
        if self.wait {
            Completion::Wait
        } else {
            Completion::Detached
        }
    }
}

/// POST /restart/{container_name}
pub async fn restart_container(
    AxumState(state): AxumState<SharedState>,
    Path(container_name): Path<String>,
    Query(params): Query<RestartParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, RestartError> {
    let policy = RestartPolicy::push(container_name, params.branch());
    run_restart_pipeline(&state, policy, &params, &headers, &body).await
}

/// POST /restart-passing-workflow/{container_name}/{workflow_name}
pub async fn restart_passing_workflow(
    AxumState(state): AxumState<SharedState>,
    Path((container_name, workflow_name)): Path<(String, String)>,
    Query(params): Query<RestartParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, RestartError> {
    let policy = RestartPolicy::passing_workflow(container_name, workflow_name, params.branch());
    run_restart_pipeline(&state, policy, &params, &headers, &body).await
}

async fn run_restart_pipeline(
    state: &SharedState,
    policy: RestartPolicy,
    params: &RestartParams,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<Value>, RestartError> {
    let event = WebhookEvent::from_request(headers, body);

    if let Err(e) = verify_signature(&event.body, state.auth.secret(), event.signature.as_deref())
    {
        warn!(
            "Rejected delivery for container '{}': {}",
            policy.container_name, e
        );
        return Err(e.into());
    }

    let signal = params
        .signal
        .as_deref()
        .map(str::parse::<Signal>)
        .transpose()?;
    let policy = policy.with_signal(signal);
    debug!("Evaluating {:?}", policy);

    if let Decision::Denied(denial) = evaluate(&event, &policy) {
        info!(
            "Restart of '{}' denied: {}",
            policy.container_name, denial
        );
        return Err(denial.into());
    }

    let container = locate_container(state.runtime.as_ref(), &policy.container_name)
        .await
        .inspect_err(|e| warn!("{}", e))?;

    let dry_run = params.dry_run || headers.get(DRY_RUN_HEADER).is_some();
    if dry_run {
        info!(
            "[DRY_RUN] Would restart '{}' ({}) with {}",
            container.name,
            container.id,
            policy
                .signal
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "plain restart".to_string())
        );
        return Ok(Json(
            json!({ "message": "Dry run: container would be restarted" }),
        ));
    }

    let request = RestartRequest::new(container, policy.signal);
    info!(
        "Restart {} accepted for '{}' ({:?})",
        request.id,
        request.container.name,
        params.completion()
    );
    state.executor.run(request, params.completion()).await?;

    Ok(Json(json!({ "message": "Container restarted" })))
}
