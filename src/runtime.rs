//! Container runtime access.
//!
//! The restart pipeline only talks to the runtime through [`ContainerRuntime`],
//! so the Docker client is built once at startup and shared, and tests can
//! swap in an in-memory runtime.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    KillContainerOptions, ListContainersOptions, RestartContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::ContainerSummary;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::debug;

use crate::error::RuntimeError;

/// A container as seen by the runtime. Observed, never owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    /// Runtime state string, e.g. `running` or `exited`
    pub state: Option<String>,
}

impl ContainerHandle {
    pub fn is_running(&self) -> bool {
        self.state.as_deref() == Some("running")
    }
}

/// Lifecycle primitives the restart pipeline needs.
///
/// Write operations may be called concurrently for the same container; no
/// locking is added here.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Enumerate containers in runtime order. `all` includes stopped ones.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerHandle>, RuntimeError>;

    async fn kill(&self, id: &str, signal: &str) -> Result<(), RuntimeError>;

    /// Resolve once the container is no longer running.
    async fn wait_stopped(&self, id: &str) -> Result<(), RuntimeError>;

    async fn start(&self, id: &str) -> Result<(), RuntimeError>;

    /// Stop then start, giving the process `timeout` to exit before it is killed.
    async fn restart(&self, id: &str, timeout: Duration) -> Result<(), RuntimeError>;
}

/// [`ContainerRuntime`] backed by the local Docker daemon
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect with the local defaults (`DOCKER_HOST` or the unix socket).
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await.map_err(map_bollard_error)?;
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerHandle>, RuntimeError> {
        let opts = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(opts))
            .await
            .map_err(map_bollard_error)?;

        Ok(containers.into_iter().filter_map(summary_to_handle).collect())
    }

    async fn kill(&self, id: &str, signal: &str) -> Result<(), RuntimeError> {
        self.docker
            .kill_container(id, Some(KillContainerOptions { signal }))
            .await
            .map_err(map_bollard_error)
    }

    async fn wait_stopped(&self, id: &str) -> Result<(), RuntimeError> {
        let opts = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(id, Some(opts));
        match stream.next().await {
            Some(Ok(response)) => {
                debug!("Container {} stopped with status {}", id, response.status_code);
                Ok(())
            }
            // bollard turns a non-zero exit status into an error; the container is stopped all the same
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => {
                debug!("Container {} stopped with status {}", id, code);
                Ok(())
            }
            Some(Err(e)) => Err(map_bollard_error(e)),
            None => Err(RuntimeError::Unavailable(
                "container wait stream ended unexpectedly".to_string(),
            )),
        }
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_bollard_error)
    }

    async fn restart(&self, id: &str, timeout: Duration) -> Result<(), RuntimeError> {
        let opts = RestartContainerOptions {
            t: timeout.as_secs() as isize,
        };
        self.docker
            .restart_container(id, Some(opts))
            .await
            .map_err(map_bollard_error)
    }
}

fn summary_to_handle(summary: ContainerSummary) -> Option<ContainerHandle> {
    let id = summary.id?;
    // Docker reports names with a leading slash
    let name = summary
        .names?
        .into_iter()
        .next()?
        .trim_start_matches('/')
        .to_string();

    Some(ContainerHandle {
        id,
        name,
        state: summary.state,
    })
}

fn map_bollard_error(error: BollardError) -> RuntimeError {
    match error {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NoSuchContainer(message),
        BollardError::DockerResponseServerError { message, .. } => {
            RuntimeError::Rejected(message)
        }
        other => RuntimeError::Unavailable(other.to_string()),
    }
}
