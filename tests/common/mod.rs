//! In-memory container runtime used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::response::Response;
use restart_hook::error::RuntimeError;
use restart_hook::runtime::{ContainerHandle, ContainerRuntime};
use restart_hook::utils::sign_payload;
use restart_hook::webhook::SIGNATURE_HEADER;
use restart_hook::{AppState, RestartHookConfig, SharedState};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SECRET: &str = "It's a Secret to Everybody";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List { all: bool },
    Kill { id: String, signal: String },
    Wait { id: String },
    Start { id: String },
    Restart { id: String, timeout_secs: u64 },
}

#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<Vec<ContainerHandle>>,
    calls: Mutex<Vec<Call>>,
    pub unreachable: AtomicBool,
    pub reject_signals: AtomicBool,
    restart_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_containers(containers: &[(&str, &str, &str)]) -> Arc<Self> {
        let runtime = Self::new();
        for (id, name, state) in containers {
            runtime.add(id, name, state);
        }
        runtime
    }

    pub fn add(&self, id: &str, name: &str, state: &str) {
        self.containers.lock().unwrap().push(ContainerHandle {
            id: id.to_string(),
            name: name.to_string(),
            state: Some(state.to_string()),
        });
    }

    /// Simulate the container being removed behind our back
    pub fn remove(&self, name: &str) {
        self.containers.lock().unwrap().retain(|c| c.name != name);
    }

    pub fn set_restart_delay(&self, delay: Duration) {
        *self.restart_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change container state
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::List { .. }))
            .collect()
    }

    pub fn max_concurrent_restarts(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn state_of(&self, id: &str) -> Option<String> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.state.clone())
    }

    /// Poll until `predicate` holds for the recorded calls, or give up after a second.
    pub async fn wait_for_calls(&self, predicate: impl Fn(&[Call]) -> bool) -> bool {
        for _ in 0..100 {
            if predicate(&self.calls()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_reachable(&self) -> Result<(), RuntimeError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RuntimeError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn set_state(&self, id: &str, state: &str) -> Result<(), RuntimeError> {
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| RuntimeError::NoSuchContainer(id.to_string()))?;
        container.state = Some(state.to_string());
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.check_reachable()
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerHandle>, RuntimeError> {
        self.check_reachable()?;
        self.record(Call::List { all });
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| all || c.is_running())
            .cloned()
            .collect())
    }

    async fn kill(&self, id: &str, signal: &str) -> Result<(), RuntimeError> {
        self.check_reachable()?;
        self.record(Call::Kill {
            id: id.to_string(),
            signal: signal.to_string(),
        });
        if self.reject_signals.load(Ordering::SeqCst) {
            return Err(RuntimeError::Rejected(format!("invalid signal: {}", signal)));
        }
        // A hang-up reloads in place; anything else terminates the process
        if signal == "SIGHUP" {
            self.set_state(id, "running")
        } else {
            self.set_state(id, "exited")
        }
    }

    async fn wait_stopped(&self, id: &str) -> Result<(), RuntimeError> {
        self.check_reachable()?;
        self.record(Call::Wait { id: id.to_string() });
        match self.state_of(id) {
            None => Err(RuntimeError::NoSuchContainer(id.to_string())),
            // Never resolves, like waiting on a process that does not exit
            Some(state) if state == "running" => {
                std::future::pending::<Result<(), RuntimeError>>().await
            }
            Some(_) => Ok(()),
        }
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        self.check_reachable()?;
        self.record(Call::Start { id: id.to_string() });
        self.set_state(id, "running")
    }

    async fn restart(&self, id: &str, timeout: Duration) -> Result<(), RuntimeError> {
        self.check_reachable()?;
        self.record(Call::Restart {
            id: id.to_string(),
            timeout_secs: timeout.as_secs(),
        });
        if self.state_of(id).is_none() {
            return Err(RuntimeError::NoSuchContainer(id.to_string()));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.restart_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.set_state(id, "running")
    }
}

pub fn state_with(runtime: Arc<FakeRuntime>, config: RestartHookConfig) -> SharedState {
    let runtime: Arc<dyn ContainerRuntime> = runtime;
    Arc::new(AppState::from_config(&config, runtime))
}

pub fn secured_state(runtime: Arc<FakeRuntime>) -> SharedState {
    state_with(
        runtime,
        RestartHookConfig {
            webhook_secret: Some(SECRET.to_string()),
            ..Default::default()
        },
    )
}

pub fn signed_headers(body: &[u8]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        SIGNATURE_HEADER,
        sign_payload(SECRET, body).parse().unwrap(),
    );
    headers
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
