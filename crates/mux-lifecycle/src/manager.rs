//! Lifecycle manager
//!
//! One interface over both hosting kinds. The manager keeps a cached
//! [`ServiceState`] per service, but the cache is advisory: every path
//! that hands a state to a caller re-probes first, and operations on the
//! same service are serialized through a per-service mutex so starts and
//! stops never interleave.

use crate::docker::ContainerEngine;
use crate::native;
use crate::probe::HealthProber;
use crate::{LifecycleError, Result};
use async_trait::async_trait;
use mux_core::{ServiceDescriptor, ServiceKind, ServiceRegistry, ServiceState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Interval between readiness probes while waiting for a start
const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Settle delay after a container stop, so the driver reclaims VRAM
const SETTLE_CONTAINER: Duration = Duration::from_secs(2);

/// Settle delay after a native stop; shell kills are coarser, wait longer
const SETTLE_NATIVE: Duration = Duration::from_secs(3);

/// The operations the orchestrator needs from a lifecycle implementation
#[async_trait]
pub trait ServiceControl: Send + Sync {
    /// Idempotent start: true iff the service is healthy on return
    async fn ensure_running(&self, name: &str) -> Result<bool>;

    /// Idempotent stop: true iff the service is observed stopped on return
    async fn stop(&self, name: &str, force: bool) -> Result<bool>;

    /// One health check; updates the cached state
    async fn probe(&self, name: &str) -> Result<bool>;

    /// Poll until healthy or the deadline passes
    async fn wait_ready(&self, name: &str, timeout: Duration) -> Result<bool>;

    /// Fresh states for every registered service (re-probed, not cached)
    async fn states(&self) -> HashMap<String, ServiceState>;
}

/// Lifecycle manager over containerized and native services
#[derive(Clone)]
pub struct LifecycleManager {
    registry: Arc<ServiceRegistry>,
    prober: HealthProber,
    engine: Option<ContainerEngine>,
    engine_error: Option<String>,
    states: Arc<Mutex<HashMap<String, ServiceState>>>,
    op_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    settle_container: Duration,
    settle_native: Duration,
}

impl LifecycleManager {
    /// Create a manager for the given registry.
    ///
    /// The container engine connection is attempted up front; when it is
    /// unavailable, containerized operations fail with the cached reason
    /// while native services keep working.
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        let (engine, engine_error) = match ContainerEngine::connect() {
            Ok(engine) => (Some(engine), None),
            Err(e) => {
                warn!("container engine unavailable: {}", e);
                (None, Some(e.to_string()))
            }
        };

        Self {
            registry,
            prober: HealthProber::new(),
            engine,
            engine_error,
            states: Arc::new(Mutex::new(HashMap::new())),
            op_locks: Arc::new(Mutex::new(HashMap::new())),
            settle_container: SETTLE_CONTAINER,
            settle_native: SETTLE_NATIVE,
        }
    }

    /// Override the post-stop settle delays (used by tests)
    pub fn with_settle_delays(mut self, container: Duration, native: Duration) -> Self {
        self.settle_container = container;
        self.settle_native = native;
        self
    }

    fn descriptor(&self, name: &str) -> Result<ServiceDescriptor> {
        self.registry
            .get(name)
            .cloned()
            .ok_or_else(|| LifecycleError::UnknownService(name.to_string()))
    }

    fn engine(&self) -> Result<&ContainerEngine> {
        self.engine.as_ref().ok_or_else(|| {
            LifecycleError::Engine(
                self.engine_error
                    .clone()
                    .unwrap_or_else(|| "container engine unavailable".to_string()),
            )
        })
    }

    /// Per-service mutex so same-name operations never run concurrently
    async fn op_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.op_locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn set_state(&self, name: &str, state: ServiceState) {
        self.states.lock().await.insert(name.to_string(), state);
    }

    async fn cached_state(&self, name: &str) -> ServiceState {
        self.states
            .lock()
            .await
            .get(name)
            .copied()
            .unwrap_or(ServiceState::Unknown)
    }

    async fn probe_descriptor(&self, descriptor: &ServiceDescriptor) -> bool {
        let healthy = self.prober.probe(&descriptor.health_url).await;
        if healthy {
            self.set_state(&descriptor.name, ServiceState::Ready).await;
        } else {
            // A failed probe on a stable service means it is gone. Leave
            // in-flight transitions alone, and keep Error sticky until a
            // retry or an explicit stop clears it.
            match self.cached_state(&descriptor.name).await {
                ServiceState::Starting | ServiceState::Stopping | ServiceState::Error => {}
                _ => self.set_state(&descriptor.name, ServiceState::Stopped).await,
            }
        }
        healthy
    }

    async fn wait_ready_descriptor(
        &self,
        descriptor: &ServiceDescriptor,
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        info!(
            "waiting for {} to become healthy (timeout: {:?})",
            descriptor.name, timeout
        );

        loop {
            if self.probe_descriptor(descriptor).await {
                return true;
            }
            if tokio::time::Instant::now() + READY_POLL_INTERVAL > deadline {
                return false;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn start_inner(&self, descriptor: &ServiceDescriptor) -> Result<bool> {
        // Already healthy: nothing to do
        if self.probe_descriptor(descriptor).await {
            debug!("service {} already running", descriptor.name);
            return Ok(true);
        }

        self.set_state(&descriptor.name, ServiceState::Starting).await;

        let start_result = match &descriptor.kind {
            ServiceKind::Containerized { container_id } => {
                self.engine()?.start(container_id).await
            }
            ServiceKind::Native {
                start_cmd,
                pid_file,
                ..
            } => native::spawn_detached(&descriptor.name, start_cmd, pid_file.as_deref())
                .map(|_| ()),
        };

        if let Err(e) = start_result {
            error!("failed to start {}: {}", descriptor.name, e);
            self.set_state(&descriptor.name, ServiceState::Error).await;
            return Err(e);
        }

        debug!(
            "waiting {:?} for {} warm-up",
            descriptor.warmup, descriptor.name
        );
        tokio::time::sleep(descriptor.warmup).await;

        if self
            .wait_ready_descriptor(descriptor, descriptor.health_timeout)
            .await
        {
            self.set_state(&descriptor.name, ServiceState::Ready).await;
            Ok(true)
        } else {
            error!(
                "service {} not healthy after {:?}",
                descriptor.name, descriptor.health_timeout
            );
            self.set_state(&descriptor.name, ServiceState::Error).await;
            Ok(false)
        }
    }

    async fn stop_inner(&self, descriptor: &ServiceDescriptor, force: bool) -> Result<bool> {
        // A completed stop already ran the external command; repeating it
        // would only re-kill by pattern. Force always goes through.
        if !force && self.cached_state(&descriptor.name).await == ServiceState::Stopped {
            debug!("service {} already stopped", descriptor.name);
            return Ok(true);
        }

        // Ask nicely for the VRAM first; a refusal never blocks the stop
        if let Some(evict_url) = &descriptor.graceful_evict_url {
            self.prober.request_eviction(evict_url).await;
        }

        self.set_state(&descriptor.name, ServiceState::Stopping).await;

        let (stop_result, settle) = match &descriptor.kind {
            ServiceKind::Containerized { container_id } => (
                self.engine()?.stop(container_id, force).await,
                self.settle_container,
            ),
            ServiceKind::Native { stop_cmd, .. } => (
                native::run_stop_command(&descriptor.name, stop_cmd, force).await,
                self.settle_native,
            ),
        };

        if let Err(e) = stop_result {
            error!("failed to stop {}: {}", descriptor.name, e);
            self.set_state(&descriptor.name, ServiceState::Error).await;
            return Err(e);
        }

        // Give the driver a moment to reclaim the VRAM
        tokio::time::sleep(settle).await;

        self.set_state(&descriptor.name, ServiceState::Stopped).await;
        info!("service {} stopped", descriptor.name);
        Ok(true)
    }
}

#[async_trait]
impl ServiceControl for LifecycleManager {
    async fn ensure_running(&self, name: &str) -> Result<bool> {
        let descriptor = self.descriptor(name)?;
        let lock = self.op_lock(name).await;
        let _guard = lock.lock().await;
        self.start_inner(&descriptor).await
    }

    async fn stop(&self, name: &str, force: bool) -> Result<bool> {
        let descriptor = self.descriptor(name)?;
        let lock = self.op_lock(name).await;

        // The stop runs on its own task: a caller abandoning the wait must
        // not abandon the stop.
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let _guard = lock.lock().await;
            this.stop_inner(&descriptor, force).await
        });

        handle
            .await
            .map_err(|e| LifecycleError::Process(format!("stop task failed: {}", e)))?
    }

    async fn probe(&self, name: &str) -> Result<bool> {
        let descriptor = self.descriptor(name)?;
        Ok(self.probe_descriptor(&descriptor).await)
    }

    async fn wait_ready(&self, name: &str, timeout: Duration) -> Result<bool> {
        let descriptor = self.descriptor(name)?;
        Ok(self.wait_ready_descriptor(&descriptor, timeout).await)
    }

    async fn states(&self) -> HashMap<String, ServiceState> {
        let mut out = HashMap::new();
        for descriptor in self.registry.all() {
            if self.probe_descriptor(descriptor).await {
                out.insert(descriptor.name.clone(), ServiceState::Ready);
            } else {
                // probe_descriptor already folded the failure into the cache
                out.insert(descriptor.name.clone(), self.cached_state(&descriptor.name).await);
            }
        }
        out
    }
}
