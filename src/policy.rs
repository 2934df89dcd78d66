//! Restart policy evaluation.
//!
//! A policy is built from the path and query parameters of a request and
//! checked against the decoded webhook payload. Evaluation never touches the
//! container runtime.

use crate::restart::Signal;
use crate::webhook::WebhookEvent;

pub const DEFAULT_BRANCH: &str = "main";
const REF_PREFIX: &str = "refs/heads/";
const SUCCESS_CONCLUSION: &str = "success";

/// Which endpoint the request came in on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyKind {
    /// `ref` of a push event must point at the expected branch
    Push,
    /// A completed `workflow_run` with the given name must have passed on the expected branch
    PassingWorkflow { workflow_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    pub container_name: String,
    pub expected_branch: String,
    pub kind: PolicyKind,
    pub signal: Option<Signal>,
}

impl RestartPolicy {
    /// Policy for `/restart/{container}`
    pub fn push(container_name: impl Into<String>, branch: Option<&str>) -> Self {
        Self {
            container_name: container_name.into(),
            expected_branch: branch.unwrap_or(DEFAULT_BRANCH).to_string(),
            kind: PolicyKind::Push,
            signal: None,
        }
    }

    /// Policy for `/restart-passing-workflow/{container}/{workflow}`
    pub fn passing_workflow(
        container_name: impl Into<String>,
        workflow_name: impl Into<String>,
        branch: Option<&str>,
    ) -> Self {
        Self {
            container_name: container_name.into(),
            expected_branch: branch.unwrap_or(DEFAULT_BRANCH).to_string(),
            kind: PolicyKind::PassingWorkflow {
                workflow_name: workflow_name.into(),
            },
            signal: None,
        }
    }

    pub fn with_signal(mut self, signal: Option<Signal>) -> Self {
        self.signal = signal;
        self
    }
}

/// Why a restart was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("malformed payload")]
    MalformedPayload,

    #[error("no workflow_run in payload")]
    NoWorkflowRun,

    #[error("wrong branch")]
    WrongBranch,

    #[error("wrong workflow name")]
    WrongWorkflowName,

    #[error("workflow still running or failed")]
    WorkflowNotSuccessful,
}

impl Denial {
    /// Message returned to the webhook caller
    pub fn detail(&self) -> &'static str {
        match self {
            Denial::MalformedPayload => "Malformed payload!",
            Denial::NoWorkflowRun => "No workflow_run in payload!",
            Denial::WrongBranch => "Wrong branch!",
            Denial::WrongWorkflowName => "Wrong workflow name!",
            Denial::WorkflowNotSuccessful => "Workflow still running or failed!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Authorized,
    Denied(Denial),
}

impl From<Result<(), Denial>> for Decision {
    fn from(result: Result<(), Denial>) -> Self {
        match result {
            Ok(()) => Decision::Authorized,
            Err(denial) => Decision::Denied(denial),
        }
    }
}

/// Decide whether `event` authorizes a restart under `policy`.
///
/// Workflow checks run in a fixed order and stop at the first failure.
pub fn evaluate(event: &WebhookEvent, policy: &RestartPolicy) -> Decision {
    let result = match &policy.kind {
        PolicyKind::Push => check_push(event, &policy.expected_branch),
        PolicyKind::PassingWorkflow { workflow_name } => {
            check_workflow(event, &policy.expected_branch, workflow_name)
        }
    };
    result.into()
}

fn check_push(event: &WebhookEvent, expected_branch: &str) -> Result<(), Denial> {
    if event.payload.is_none() {
        return Err(Denial::MalformedPayload);
    }

    let branch = event
        .git_ref()
        .and_then(|r| r.strip_prefix(REF_PREFIX))
        .ok_or(Denial::WrongBranch)?;

    if branch != expected_branch {
        return Err(Denial::WrongBranch);
    }
    Ok(())
}

fn check_workflow(
    event: &WebhookEvent,
    expected_branch: &str,
    expected_name: &str,
) -> Result<(), Denial> {
    if event.payload.is_none() {
        return Err(Denial::MalformedPayload);
    }

    let run = event.workflow_run().ok_or(Denial::NoWorkflowRun)?;

    if run.head_branch.as_deref() != Some(expected_branch) {
        return Err(Denial::WrongBranch);
    }
    if run.name.as_deref() != Some(expected_name) {
        return Err(Denial::WrongWorkflowName);
    }
    if run.conclusion.as_deref() != Some(SUCCESS_CONCLUSION) {
        return Err(Denial::WorkflowNotSuccessful);
    }
    Ok(())
}
