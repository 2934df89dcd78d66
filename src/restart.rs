//! Restart execution.
//!
//! A restart is either a plain bounded-timeout restart, or a signal followed
//! (unless the signal is a hang-up) by a wait for the container to stop and a
//! fresh start. Work can run detached from the request that triggered it; a
//! detached restart reports its outcome only through the logs.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ExecutionError, RestartError, RuntimeError};
use crate::runtime::{ContainerHandle, ContainerRuntime};

pub const DEFAULT_RESTART_TIMEOUT: Duration = Duration::from_secs(30);

/// Highest signal number on Linux (`SIGRTMAX`)
const MAX_SIGNAL_NUMBER: u8 = 64;
const SIGHUP_NUMBER: &str = "1";

/// A normalized OS signal name such as `SIGTERM`, or a bare signal number
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signal(String);

impl Signal {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hang-up asks the process to reload in place; it is not expected to exit.
    pub fn is_hangup(&self) -> bool {
        self.0 == "SIGHUP" || self.0 == SIGHUP_NUMBER
    }
}

impl FromStr for Signal {
    type Err = RestartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(RestartError::InvalidSignal(s.to_string()));
        }
        if raw.chars().all(|c| c.is_ascii_digit()) {
            // Stored without leading zeros, the way the runtime reads it
            return match raw.parse::<u8>() {
                Ok(n) if (1..=MAX_SIGNAL_NUMBER).contains(&n) => Ok(Signal(n.to_string())),
                _ => Err(RestartError::InvalidSignal(s.to_string())),
            };
        }
        // SIGRTMIN+3 style names are valid for docker kill
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-')
        {
            return Err(RestartError::InvalidSignal(s.to_string()));
        }

        let upper = raw.to_ascii_uppercase();
        let name = if upper.starts_with("SIG") {
            upper
        } else {
            format!("SIG{}", upper)
        };
        Ok(Signal(name))
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartStrategy {
    /// Runtime-managed stop and start with a grace period
    Plain { timeout: Duration },
    /// Signal the main process, wait for it to stop (unless hang-up), then start
    Signal(Signal),
}

/// Whether the caller waits for the restart to finish.
///
/// `Detached` gives no delivery guarantee: the outcome is never reported back
/// to the caller, only logged. There is no cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    #[default]
    Detached,
    Wait,
}

/// One unit of restart work
#[derive(Debug, Clone)]
pub struct RestartRequest {
    pub id: String,
    pub container: ContainerHandle,
    pub signal: Option<Signal>,
    pub requested_at: DateTime<Utc>,
}

impl RestartRequest {
    pub fn new(container: ContainerHandle, signal: Option<Signal>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            container,
            signal,
            requested_at: Utc::now(),
        }
    }
}

/// Per-container-name locks, handed out on demand
#[derive(Default)]
struct RestartLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RestartLocks {
    async fn for_name(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Take the lock for the request's container, logging when it is contended
    async fn acquire(&self, request: &RestartRequest) -> OwnedMutexGuard<()> {
        let lock = self.for_name(&request.container.name).await;
        match Arc::clone(&lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    "Restart {} - waiting for an earlier restart of '{}' to finish",
                    request.id, request.container.name
                );
                lock.lock_owned().await
            }
        }
    }
}

/// Runs restarts against a [`ContainerRuntime`].
///
/// Overlapping restarts of the same container race each other unless
/// serialization is turned on with [`RestartExecutor::with_serialization`].
pub struct RestartExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    restart_timeout: Duration,
    locks: Option<RestartLocks>,
}

impl RestartExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, restart_timeout: Duration) -> Self {
        Self {
            runtime,
            restart_timeout,
            locks: None,
        }
    }

    /// Hold a per-name lock for the whole restart sequence.
    ///
    /// The lock is held while waiting for the container to stop. A signal the
    /// process survives (e.g. `SIGUSR1` used as a reload) leaves that wait
    /// pending, and later restarts of the same container queue behind it.
    pub fn with_serialization(mut self, serialize: bool) -> Self {
        self.locks = serialize.then(RestartLocks::default);
        self
    }

    pub fn is_serialized(&self) -> bool {
        self.locks.is_some()
    }

    pub fn restart_timeout(&self) -> Duration {
        self.restart_timeout
    }

    pub fn strategy_for(&self, request: &RestartRequest) -> RestartStrategy {
        match &request.signal {
            Some(signal) => RestartStrategy::Signal(signal.clone()),
            None => RestartStrategy::Plain {
                timeout: self.restart_timeout,
            },
        }
    }

    /// Run the restart to completion. Nothing is retried.
    pub async fn execute(&self, request: &RestartRequest) -> Result<(), ExecutionError> {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(request).await),
            None => None,
        };

        let container = &request.container;
        match self.strategy_for(request) {
            RestartStrategy::Plain { timeout } => {
                info!(
                    "Restart {} - restarting '{}' with {}s timeout",
                    request.id,
                    container.name,
                    timeout.as_secs()
                );
                self.runtime
                    .restart(&container.id, timeout)
                    .await
                    .map_err(|e| execution_error(e, "restart", container))?;
            }
            RestartStrategy::Signal(signal) => {
                info!(
                    "Restart {} - sending {} to '{}'",
                    request.id, signal, container.name
                );
                self.runtime
                    .kill(&container.id, signal.as_str())
                    .await
                    .map_err(|e| match e {
                        RuntimeError::Rejected(message) => ExecutionError::SignalRejected {
                            container: container.name.clone(),
                            signal: signal.to_string(),
                            message,
                        },
                        other => execution_error(other, "kill", container),
                    })?;

                if signal.is_hangup() {
                    info!(
                        "Restart {} - {} reloads in place, not waiting for '{}' to stop",
                        request.id, signal, container.name
                    );
                } else {
                    info!(
                        "Restart {} - waiting for '{}' to stop",
                        request.id, container.name
                    );
                    self.runtime
                        .wait_stopped(&container.id)
                        .await
                        .map_err(|e| execution_error(e, "wait", container))?;
                }

                info!("Restart {} - starting '{}'", request.id, container.name);
                self.runtime
                    .start(&container.id)
                    .await
                    .map_err(|e| execution_error(e, "start", container))?;
            }
        }

        let elapsed = Utc::now() - request.requested_at;
        info!(
            "Restart {} - '{}' restarted successfully in {}ms.",
            request.id,
            container.name,
            elapsed.num_milliseconds()
        );
        Ok(())
    }

    /// Launch the restart in the background and return immediately.
    ///
    /// Fire and forget: the task outlives the caller, cannot be cancelled and
    /// has no channel back. Failures are only logged.
    pub fn spawn_detached(self: &Arc<Self>, request: RestartRequest) {
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = executor.execute(&request).await {
                error!(
                    "Restart {} of '{}' failed: {}",
                    request.id, request.container.name, e
                );
            }
        });
    }

    /// Dispatch according to `completion`. Detached runs always return `Ok`.
    pub async fn run(
        self: &Arc<Self>,
        request: RestartRequest,
        completion: Completion,
    ) -> Result<(), ExecutionError> {
        match completion {
            Completion::Detached => {
                self.spawn_detached(request);
                Ok(())
            }
            Completion::Wait => self.execute(&request).await.inspect_err(|e| {
                warn!(
                    "Restart {} of '{}' failed: {}",
                    request.id, request.container.name, e
                );
            }),
        }
    }
}

fn execution_error(
    error: RuntimeError,
    operation: &'static str,
    container: &ContainerHandle,
) -> ExecutionError {
    match error {
        RuntimeError::Unavailable(message) => ExecutionError::RuntimeUnavailable(message),
        RuntimeError::NoSuchContainer(_) => ExecutionError::ContainerGone(container.name.clone()),
        RuntimeError::Rejected(message) => ExecutionError::Runtime {
            operation,
            container: container.name.clone(),
            message,
        },
    }
}
