//! Container engine operations
//!
//! Containers are pre-existing: the engine starts and stops them by id,
//! it never creates them. A missing container is a deployment error
//! surfaced as [`LifecycleError::ContainerMissing`] on start and treated
//! as already-stopped on stop.

use crate::{LifecycleError, Result};
use bollard::container::{InspectContainerOptions, StartContainerOptions, StopContainerOptions};
use bollard::Docker;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Deadline for any single engine call
const ENGINE_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period a container gets before the engine kills it
const STOP_GRACE_SECS: i64 = 30;

/// Thin wrapper over the container engine client
#[derive(Debug, Clone)]
pub struct ContainerEngine {
    docker: Docker,
}

impl ContainerEngine {
    /// Connect through the ambient daemon socket
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| LifecycleError::Engine(format!("cannot reach container engine: {}", e)))?;
        Ok(Self { docker })
    }

    /// Whether the container is currently running.
    ///
    /// `Ok(None)` means the container does not exist at all.
    pub async fn is_running(&self, container_id: &str) -> Result<Option<bool>> {
        let inspect = timeout(
            ENGINE_TIMEOUT,
            self.docker
                .inspect_container(container_id, None::<InspectContainerOptions>),
        )
        .await
        .map_err(|_| LifecycleError::Engine(format!("inspect of {} timed out", container_id)))?;

        match inspect {
            Ok(details) => {
                let running = details
                    .state
                    .and_then(|state| state.running)
                    .unwrap_or(false);
                Ok(Some(running))
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(LifecycleError::Engine(e.to_string())),
        }
    }

    /// Start a pre-existing container.
    pub async fn start(&self, container_id: &str) -> Result<()> {
        match self.is_running(container_id).await? {
            Some(true) => {
                debug!("container {} already running", container_id);
                return Ok(());
            }
            Some(false) => {}
            None => return Err(LifecycleError::ContainerMissing(container_id.to_string())),
        }

        info!("starting container {}", container_id);
        timeout(
            ENGINE_TIMEOUT,
            self.docker
                .start_container(container_id, None::<StartContainerOptions<String>>),
        )
        .await
        .map_err(|_| LifecycleError::Engine(format!("start of {} timed out", container_id)))?
        .map_err(|e| LifecycleError::Engine(e.to_string()))?;

        Ok(())
    }

    /// Stop a container: graceful with a 30-second grace period, or a
    /// harsh kill when `force` is set. A missing or already-stopped
    /// container counts as success.
    pub async fn stop(&self, container_id: &str, force: bool) -> Result<()> {
        match self.is_running(container_id).await? {
            Some(true) => {}
            Some(false) | None => {
                debug!("container {} already stopped", container_id);
                return Ok(());
            }
        }

        info!("stopping container {} (force={})", container_id, force);
        if force {
            timeout(
                ENGINE_TIMEOUT,
                self.docker.kill_container::<String>(container_id, None),
            )
            .await
            .map_err(|_| LifecycleError::Engine(format!("kill of {} timed out", container_id)))?
            .map_err(|e| LifecycleError::Engine(e.to_string()))?;
        } else {
            // The engine itself waits out the grace period, so this call
            // gets the grace on top of the usual deadline.
            timeout(
                ENGINE_TIMEOUT + Duration::from_secs(STOP_GRACE_SECS as u64),
                self.docker
                    .stop_container(container_id, Some(StopContainerOptions { t: STOP_GRACE_SECS })),
            )
            .await
            .map_err(|_| LifecycleError::StopTimeout(container_id.to_string()))?
            .map_err(|e| LifecycleError::Engine(e.to_string()))?;
        }

        Ok(())
    }
}
