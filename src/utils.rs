use crate::error::{AuthError, RestartError};
use crate::runtime::{ContainerHandle, ContainerRuntime};
use tracing::{debug, error};

// For signature verification
use hex::decode as hex_decode;
use hmac::{Hmac, Mac};
use sha2::Sha256;
type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Verify a GitHub-style `X-Hub-Signature-256` header against the raw payload.
///
/// `secret == None` is open mode and accepts everything. The digest
/// comparison is constant time (`Mac::verify_slice`). Logging is left to the caller.
pub fn verify_signature(
    payload: &[u8],
    secret: Option<&str>,
    signature_header: Option<&str>,
) -> Result<(), AuthError> {
    let Some(secret) = secret else {
        return Ok(());
    };
    let signature_header = signature_header.ok_or(AuthError::MissingSignature)?;

    // Expected format: "sha256=..."
    let git_signature = signature_header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(AuthError::InvalidSignature)?;

    // GitHub provides the signature as hex
    let git_signature_bytes =
        hex_decode(git_signature).map_err(|_| AuthError::InvalidSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidSignature)?;
    mac.update(payload);
    mac.verify_slice(&git_signature_bytes)
        .map_err(|_| AuthError::InvalidSignature)
}

/// Compute the `X-Hub-Signature-256` header value for `payload`
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(payload);
    format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Finds the first container, running or stopped, whose name is exactly `name`.
pub async fn locate_container(
    runtime: &dyn ContainerRuntime,
    name: &str,
) -> Result<ContainerHandle, RestartError> {
    let containers = runtime.list_containers(true).await.map_err(|e| {
        error!("Failed to list containers: {}", e);
        RestartError::Runtime(e.to_string())
    })?;
    debug!("Runtime reports {} containers", containers.len());

    containers
        .into_iter()
        .find(|c| c.name == name)
        .ok_or_else(|| RestartError::NotFound(name.to_string()))
}
