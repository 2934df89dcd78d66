//! Webhook related structures

use axum::http::HeaderMap;

// Lowercase so it can also be used with `HeaderMap::insert`
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// The `workflow_run` object of a GitHub `workflow_run` event.
/// Every field is optional so partial payloads still decode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowRun {
    pub name: Option<String>,
    pub head_branch: Option<String>,
    pub conclusion: Option<String>,
}

/// Fields of the decoded payload that restart policies look at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPayload {
    pub git_ref: Option<String>,
    pub workflow_run: Option<WorkflowRun>,
}

/// A single incoming delivery: raw body, signature header and the decoded payload.
///
/// `payload` is `None` when the body is not a JSON object; the policy
/// evaluator turns that into a denial.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub body: Vec<u8>,
    pub signature: Option<String>,
    pub payload: Option<EventPayload>,
}

impl WebhookEvent {
    /// Build an event from a raw body and the request headers
    pub fn from_request(headers: &HeaderMap, body: &[u8]) -> Self {
        // A present but non-UTF-8 header must still fail as invalid, not missing
        let signature = headers
            .get(SIGNATURE_HEADER)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

        Self::new(body.to_vec(), signature)
    }

    pub fn new(body: Vec<u8>, signature: Option<String>) -> Self {
        let payload = decode_payload(&body);
        Self {
            body,
            signature,
            payload,
        }
    }

    pub fn git_ref(&self) -> Option<&str> {
        self.payload.as_ref().and_then(|p| p.git_ref.as_deref())
    }

    pub fn workflow_run(&self) -> Option<&WorkflowRun> {
        self.payload.as_ref().and_then(|p| p.workflow_run.as_ref())
    }
}

/// Decode the policy-relevant fields. Only a top-level JSON object counts as a payload;
/// fields with an unexpected type are treated as absent.
fn decode_payload(body: &[u8]) -> Option<EventPayload> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let object = value.as_object()?;

    let git_ref = object.get("ref").and_then(|r| r.as_str()).map(String::from);
    let workflow_run = object
        .get("workflow_run")
        .and_then(|w| w.as_object())
        .map(|run| {
            let field = |key: &str| run.get(key).and_then(|v| v.as_str()).map(String::from);
            WorkflowRun {
                name: field("name"),
                head_branch: field("head_branch"),
                conclusion: field("conclusion"),
            }
        });

    Some(EventPayload {
        git_ref,
        workflow_run,
    })
}
