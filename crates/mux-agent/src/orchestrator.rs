//! Orchestrator
//!
//! Combines the tracker, registry, lifecycle manager, and distributed
//! mutex into the two operations callers actually want: prepare the GPU
//! for a pipeline phase, and use one service exclusively.
//!
//! Phase preparation centralizes eviction so callers never reason about
//! cross-service interaction. `use_service` leaves the service running
//! after the lease is released (the warm path for the next invocation)
//! while the mutex alone prevents overlap.

use crate::config::AgentConfig;
use crate::{AgentError, Result};
use mux_core::{ServiceDescriptor, ServiceRegistry, ServiceState};
use mux_gpu::{GpuProcess, VramTracker};
use mux_lifecycle::{LifecycleError, LifecycleManager, ServiceControl};
use mux_lock::{GpuMutex, Lease, LockStore, MemoryLockStore, RedisLockStore};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// The process-wide GPU arbiter
pub struct Orchestrator {
    registry: Arc<ServiceRegistry>,
    tracker: VramTracker,
    lifecycle: Arc<dyn ServiceControl>,
    mutex: GpuMutex,
    default_lock_ttl: Duration,
    // Serializes whole prepare sequences; two racing prepares for
    // different phases must not interleave their stop/start steps.
    prepare_guard: Mutex<()>,
}

impl Orchestrator {
    /// Wire an orchestrator from explicit parts
    pub fn new(
        registry: Arc<ServiceRegistry>,
        tracker: VramTracker,
        lifecycle: Arc<dyn ServiceControl>,
        mutex: GpuMutex,
        default_lock_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            tracker,
            lifecycle,
            mutex,
            default_lock_ttl,
            prepare_guard: Mutex::new(()),
        }
    }

    /// Build the production wiring from configuration
    pub async fn from_config(config: &AgentConfig) -> Result<Self> {
        let registry = Arc::new(config.registry()?);

        let backend: Box<dyn mux_gpu::GpuTelemetry> = match config.agent.gpu_backend.as_str() {
            "mock" => {
                warn!("using mock GPU telemetry; VRAM figures are simulated");
                Box::new(mux_gpu::mock::MockTelemetry::new(24576))
            }
            #[cfg(feature = "nvml")]
            "nvml" => Box::new(mux_gpu::nvml::NvmlTelemetry::new(config.manager.device_index)),
            #[cfg(not(feature = "nvml"))]
            "nvml" => {
                return Err(AgentError::config(
                    "gpu_backend \"nvml\" requires building with the nvml feature",
                ))
            }
            other => {
                return Err(AgentError::config(format!("invalid gpu_backend: {}", other)));
            }
        };
        let tracker = VramTracker::new(backend, config.manager.vram_reserve_mb);

        let store: Arc<dyn LockStore> = match config.agent.lock_store.as_str() {
            "memory" => Arc::new(MemoryLockStore::new()),
            "redis" => Arc::new(RedisLockStore::connect(&config.agent.redis_url).await?),
            other => {
                return Err(AgentError::config(format!("invalid lock_store: {}", other)));
            }
        };
        let mutex = GpuMutex::new(store, config.agent.lock_key.clone());

        let lifecycle: Arc<dyn ServiceControl> =
            Arc::new(LifecycleManager::new(registry.clone()));

        Ok(Self::new(
            registry,
            tracker,
            lifecycle,
            mutex,
            Duration::from_secs(config.manager.default_lock_ttl_s),
        ))
    }

    fn descriptor(&self, name: &str) -> Result<&ServiceDescriptor> {
        self.registry
            .get(name)
            .ok_or_else(|| AgentError::UnknownService(name.to_string()))
    }

    /// The default TTL granted to leases that do not ask for one
    pub fn default_lock_ttl(&self) -> Duration {
        self.default_lock_ttl
    }

    // === Phase management ===

    /// Prepare the GPU for a pipeline phase: stop what the phase does not
    /// need (lowest priority first) until the phase's nominal footprint
    /// fits, then start everything it does need.
    ///
    /// Returns true only when every needed service came up healthy.
    /// Partial failures leave the successes running.
    pub async fn prepare_for_phase(&self, phase: u32) -> Result<bool> {
        let _guard = self.prepare_guard.lock().await;
        info!("preparing GPU for pipeline phase {}", phase);

        let needed = self.registry.for_phase(phase);
        let needed_names: HashSet<&str> = needed.iter().map(|d| d.name.as_str()).collect();
        let needed_vram: u64 = needed.iter().map(|d| d.vram_mb).sum();
        debug!(
            "phase {} needs {:?} ({} MB nominal)",
            phase,
            needed_names,
            needed_vram
        );

        // Who is actually up right now
        let mut candidates = Vec::new();
        for descriptor in self.registry.all() {
            if self.lifecycle.probe(&descriptor.name).await? {
                if !needed_names.contains(descriptor.name.as_str()) {
                    candidates.push(descriptor);
                }
            }
        }
        // Lowest priority goes first; the stable sort keeps registry
        // order as the tie-break between equals.
        candidates.sort_by_key(|d| d.priority);

        for candidate in candidates {
            if self.tracker.available_mb().await? >= needed_vram {
                break;
            }
            info!(
                "stopping {} to free VRAM for phase {}",
                candidate.name, phase
            );
            if let Err(e) = self.lifecycle.stop(&candidate.name, false).await {
                warn!("stop of {} failed during prepare: {}", candidate.name, e);
            }
        }

        let mut success = true;
        for descriptor in &needed {
            if self.lifecycle.probe(&descriptor.name).await? {
                continue;
            }
            info!("starting {} for phase {}", descriptor.name, phase);
            match self.lifecycle.ensure_running(&descriptor.name).await {
                Ok(true) => {}
                Ok(false) => {
                    error!("failed to start {} for phase {}", descriptor.name, phase);
                    success = false;
                }
                Err(e) => {
                    error!("failed to start {} for phase {}: {}", descriptor.name, phase, e);
                    success = false;
                }
            }
        }

        Ok(success)
    }

    /// Stop every currently-healthy service ("GPU idle")
    pub async fn release_all(&self) -> Result<()> {
        info!("releasing all GPU services");
        for descriptor in self.registry.all() {
            if self.lifecycle.probe(&descriptor.name).await? {
                if let Err(e) = self.lifecycle.stop(&descriptor.name, false).await {
                    warn!("stop of {} failed during release-all: {}", descriptor.name, e);
                }
            }
        }
        Ok(())
    }

    // === Exclusive use ===

    /// Make room, start the service, and take the GPU mutex.
    ///
    /// The returned [`Lease`] must be released on every exit path; the
    /// service itself stays running across the release.
    pub async fn use_service(&self, name: &str, ttl: Option<Duration>) -> Result<Lease> {
        let descriptor = self.descriptor(name)?.clone();
        let ttl = ttl.unwrap_or(self.default_lock_ttl);

        if !self.tracker.can_fit(descriptor.vram_mb).await? {
            if !self.preempt_for(&descriptor).await? {
                return Err(AgentError::PreemptionBlocked {
                    service: descriptor.name,
                });
            }
        }

        if !self.lifecycle.ensure_running(&descriptor.name).await? {
            return Err(AgentError::Lifecycle(LifecycleError::StartTimeout {
                name: descriptor.name,
                timeout: descriptor.health_timeout,
            }));
        }

        let lease = self.mutex.acquire(&descriptor.name, ttl).await?;
        Ok(lease)
    }

    /// Stop strictly-lower-priority services, lowest first, until the
    /// target's nominal footprint fits. True iff it fits afterwards.
    async fn preempt_for(&self, target: &ServiceDescriptor) -> Result<bool> {
        let mut candidates = Vec::new();
        for descriptor in self.registry.all() {
            if descriptor.name == target.name {
                continue;
            }
            if self.lifecycle.probe(&descriptor.name).await? {
                candidates.push(descriptor);
            }
        }
        candidates.sort_by_key(|d| d.priority);

        for candidate in candidates {
            if self.tracker.can_fit(target.vram_mb).await? {
                return Ok(true);
            }
            if candidate.priority >= target.priority {
                warn!(
                    "cannot preempt {} (priority {}) for {} (priority {})",
                    candidate.name, candidate.priority, target.name, target.priority
                );
                break;
            }
            info!(
                "preempting {} (priority {}) for {}",
                candidate.name, candidate.priority, target.name
            );
            if let Err(e) = self.lifecycle.stop(&candidate.name, false).await {
                warn!("preemptive stop of {} failed: {}", candidate.name, e);
            }
        }

        self.tracker.can_fit(target.vram_mb).await.map_err(Into::into)
    }

    // === Single-service operations (HTTP surface) ===

    /// Idempotent start; start timeout surfaces as an error
    pub async fn start_service(&self, name: &str) -> Result<()> {
        let descriptor = self.descriptor(name)?;
        let timeout = descriptor.health_timeout;
        if self.lifecycle.ensure_running(name).await? {
            Ok(())
        } else {
            Err(AgentError::Lifecycle(LifecycleError::StartTimeout {
                name: name.to_string(),
                timeout,
            }))
        }
    }

    /// Idempotent stop
    pub async fn stop_service(&self, name: &str, force: bool) -> Result<()> {
        self.descriptor(name)?;
        self.lifecycle.stop(name, force).await?;
        Ok(())
    }

    // === Status ===

    /// Composite view: fresh snapshot, re-probed states, lock record
    pub async fn status(&self) -> Result<StatusReport> {
        let snapshot = self.tracker.snapshot().await?;
        let states = self.lifecycle.states().await;
        let lock = self.mutex.record().await?;

        let mut services = BTreeMap::new();
        for descriptor in self.registry.all() {
            services.insert(
                descriptor.name.clone(),
                ServiceReport {
                    state: states
                        .get(&descriptor.name)
                        .copied()
                        .unwrap_or(ServiceState::Unknown),
                    vram_mb: descriptor.vram_mb,
                    priority: descriptor.priority,
                    phases: descriptor.phases.clone(),
                },
            );
        }

        Ok(StatusReport {
            vram: VramReport {
                total_mb: snapshot.total_mb,
                used_mb: snapshot.used_mb,
                free_mb: snapshot.free_mb,
                available_mb: snapshot.available_mb(self.tracker.reserve_mb()),
                processes: snapshot.processes,
                temperature_c: snapshot.temperature_c,
                utilization_percent: snapshot.utilization_percent,
            },
            services,
            lock: LockReport {
                holder: lock.holder,
                ttl: lock.ttl_seconds,
            },
        })
    }

    /// Operator escape hatch for a stale mutex record
    pub async fn force_release_lock(&self) -> Result<bool> {
        Ok(self.mutex.force_release().await?)
    }

    /// Release the telemetry handle on shutdown
    pub async fn shutdown(&self) -> Result<()> {
        self.tracker.shutdown().await?;
        Ok(())
    }
}

/// Composite status answer for `/gpu/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub vram: VramReport,
    pub services: BTreeMap<String, ServiceReport>,
    pub lock: LockReport,
}

/// VRAM section of the status report
#[derive(Debug, Clone, Serialize)]
pub struct VramReport {
    pub total_mb: u64,
    pub used_mb: u64,
    pub free_mb: u64,
    /// Free memory after the system reserve
    pub available_mb: u64,
    pub processes: Vec<GpuProcess>,
    pub temperature_c: Option<u32>,
    pub utilization_percent: Option<u32>,
}

/// Per-service section of the status report
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub state: ServiceState,
    pub vram_mb: u64,
    pub priority: u32,
    pub phases: Vec<u32>,
}

/// Lock section of the status report; negative TTL means no record
#[derive(Debug, Clone, Serialize)]
pub struct LockReport {
    pub holder: Option<String>,
    pub ttl: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mux_core::config::default_catalog;
    use mux_core::ServiceEntry;
    use mux_gpu::mock::MockTelemetry;
    use mux_lock::LockError;
    use std::collections::HashMap;

    /// Lifecycle double that couples service health to the mock GPU's
    /// memory counter and records every command it is told to issue.
    struct MockControl {
        registry: Arc<ServiceRegistry>,
        gpu: MockTelemetry,
        healthy: Mutex<HashSet<String>>,
        commands: Mutex<Vec<String>>,
        fail_start: Mutex<HashSet<String>>,
    }

    impl MockControl {
        fn new(registry: Arc<ServiceRegistry>, gpu: MockTelemetry) -> Arc<Self> {
            Arc::new(Self {
                registry,
                gpu,
                healthy: Mutex::new(HashSet::new()),
                commands: Mutex::new(Vec::new()),
                fail_start: Mutex::new(HashSet::new()),
            })
        }

        async fn force_healthy(&self, name: &str) {
            let vram = self.registry.get(name).unwrap().vram_mb;
            if self.healthy.lock().await.insert(name.to_string()) {
                self.gpu.occupy(vram).await;
            }
        }

        async fn fail_start_of(&self, name: &str) {
            self.fail_start.lock().await.insert(name.to_string());
        }

        async fn commands(&self) -> Vec<String> {
            self.commands.lock().await.clone()
        }

        async fn healthy_set(&self) -> HashSet<String> {
            self.healthy.lock().await.clone()
        }
    }

    #[async_trait]
    impl ServiceControl for MockControl {
        async fn ensure_running(&self, name: &str) -> mux_lifecycle::Result<bool> {
            self.commands.lock().await.push(format!("start {}", name));
            if self.fail_start.lock().await.contains(name) {
                return Ok(false);
            }
            let vram = self
                .registry
                .get(name)
                .ok_or_else(|| LifecycleError::UnknownService(name.to_string()))?
                .vram_mb;
            if self.healthy.lock().await.insert(name.to_string()) {
                self.gpu.occupy(vram).await;
            }
            Ok(true)
        }

        async fn stop(&self, name: &str, _force: bool) -> mux_lifecycle::Result<bool> {
            self.commands.lock().await.push(format!("stop {}", name));
            let vram = self
                .registry
                .get(name)
                .ok_or_else(|| LifecycleError::UnknownService(name.to_string()))?
                .vram_mb;
            if self.healthy.lock().await.remove(name) {
                self.gpu.reclaim(vram).await;
            }
            Ok(true)
        }

        async fn probe(&self, name: &str) -> mux_lifecycle::Result<bool> {
            Ok(self.healthy.lock().await.contains(name))
        }

        async fn wait_ready(
            &self,
            name: &str,
            _timeout: Duration,
        ) -> mux_lifecycle::Result<bool> {
            self.probe(name).await
        }

        async fn states(&self) -> HashMap<String, ServiceState> {
            let healthy = self.healthy.lock().await;
            self.registry
                .all()
                .map(|d| {
                    let state = if healthy.contains(&d.name) {
                        ServiceState::Ready
                    } else {
                        ServiceState::Stopped
                    };
                    (d.name.clone(), state)
                })
                .collect()
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        control: Arc<MockControl>,
        gpu: MockTelemetry,
        store: Arc<MemoryLockStore>,
    }

    fn fixture_with(entries: Vec<ServiceEntry>) -> Fixture {
        let registry = Arc::new(ServiceRegistry::from_entries(entries).unwrap());
        let gpu = MockTelemetry::new(24576);
        let control = MockControl::new(registry.clone(), gpu.clone());
        let store = Arc::new(MemoryLockStore::new());
        let tracker = VramTracker::new(Box::new(gpu.clone()), 1024);
        let mutex = GpuMutex::new(store.clone() as Arc<dyn LockStore>, "gpu_mutex");
        let orchestrator = Orchestrator::new(
            registry,
            tracker,
            control.clone(),
            mutex,
            Duration::from_secs(600),
        );
        Fixture {
            orchestrator,
            control,
            gpu,
            store,
        }
    }

    /// The default catalog doubles as the canonical test fixture:
    /// comfyui (prio 100, 20 GB, phase 4), cosyvoice (50, 4 GB, phase 3),
    /// vidi (40, 4 GB, phase 2), ollama (10, 18 GB, no phase).
    fn fixture() -> Fixture {
        fixture_with(default_catalog())
    }

    fn small_entry(name: &str, priority: u32, vram_mb: u64) -> ServiceEntry {
        ServiceEntry {
            name: name.to_string(),
            kind: "native".to_string(),
            vram_mb,
            priority,
            health_url: format!("http://localhost:9999/{}", name),
            health_timeout_s: 5,
            warmup_s: 0,
            phases: vec![],
            container_id: None,
            start_cmd: Some("true".to_string()),
            stop_cmd: Some("true".to_string()),
            pid_file: None,
            graceful_evict_url: None,
        }
    }

    #[tokio::test]
    async fn test_cold_start_prepare_phase4() {
        let f = fixture();

        assert!(f.orchestrator.prepare_for_phase(4).await.unwrap());

        let healthy = f.control.healthy_set().await;
        assert_eq!(healthy, HashSet::from(["comfyui".to_string()]));
        assert_eq!(f.orchestrator.status().await.unwrap().lock.holder, None);
    }

    #[tokio::test]
    async fn test_phase_transition_preempts_not_needed() {
        let f = fixture();
        f.control.force_healthy("cosyvoice").await; // phase 3 leftover, 4 GB

        assert!(f.orchestrator.prepare_for_phase(4).await.unwrap());

        let commands = f.control.commands().await;
        assert!(commands.contains(&"stop cosyvoice".to_string()));
        let healthy = f.control.healthy_set().await;
        assert!(healthy.contains("comfyui"));
        assert!(!healthy.contains("cosyvoice"));
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent() {
        let f = fixture();

        assert!(f.orchestrator.prepare_for_phase(4).await.unwrap());
        let first_round = f.control.commands().await;

        assert!(f.orchestrator.prepare_for_phase(4).await.unwrap());
        let second_round = f.control.commands().await;

        // Second call observed everything already in place and issued
        // no start or stop commands at all.
        assert_eq!(first_round, second_round);
    }

    #[tokio::test]
    async fn test_prepare_phase_without_gpu_services() {
        let f = fixture();
        f.control.force_healthy("vidi").await;

        // Phase 1 needs nothing; with a zero footprint to make room for,
        // nothing gets stopped either.
        assert!(f.orchestrator.prepare_for_phase(1).await.unwrap());
        assert!(f.control.healthy_set().await.contains("vidi"));
    }

    #[tokio::test]
    async fn test_prepare_partial_failure() {
        let f = fixture();
        f.control.fail_start_of("comfyui").await;

        assert!(!f.orchestrator.prepare_for_phase(4).await.unwrap());
    }

    #[tokio::test]
    async fn test_prepare_a_b_a_round_trip() {
        let f = fixture();

        assert!(f.orchestrator.prepare_for_phase(3).await.unwrap());
        assert!(f.orchestrator.prepare_for_phase(4).await.unwrap());
        assert!(f.orchestrator.prepare_for_phase(3).await.unwrap());

        let healthy = f.control.healthy_set().await;
        assert!(healthy.contains("cosyvoice"));
        assert!(!healthy.contains("comfyui"));
    }

    #[tokio::test]
    async fn test_use_service_warm_path() {
        let f = fixture();

        let lease = f.orchestrator.use_service("vidi", None).await.unwrap();
        assert_eq!(lease.holder(), "vidi");
        assert_eq!(
            f.orchestrator.status().await.unwrap().lock.holder,
            Some("vidi".to_string())
        );

        lease.release().await.unwrap();

        // Lock is gone, the service stays warm
        assert_eq!(f.orchestrator.status().await.unwrap().lock.holder, None);
        assert!(f.control.healthy_set().await.contains("vidi"));
    }

    #[tokio::test]
    async fn test_use_service_unknown_name() {
        let f = fixture();
        let err = f.orchestrator.use_service("ghost", None).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownService(_)));
        assert_eq!(err.to_http_status(), 404);
    }

    #[tokio::test]
    async fn test_use_service_preempts_lower_priority() {
        let f = fixture();
        f.control.force_healthy("ollama").await; // 18 GB at priority 10

        // comfyui needs 20 GB; 24576 - 18000 - 1024 leaves far too little
        let lease = f.orchestrator.use_service("comfyui", None).await.unwrap();
        assert_eq!(lease.holder(), "comfyui");

        let healthy = f.control.healthy_set().await;
        assert!(!healthy.contains("ollama"));
        assert!(healthy.contains("comfyui"));
        assert!(f
            .control
            .commands()
            .await
            .contains(&"stop ollama".to_string()));

        lease.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_preemption_blocked_by_higher_priority() {
        let f = fixture();
        f.control.force_healthy("comfyui").await; // 20 GB at priority 100

        // ollama (priority 10, 18 GB) cannot evict its superior
        let err = f.orchestrator.use_service("ollama", None).await.unwrap_err();
        assert!(matches!(err, AgentError::PreemptionBlocked { .. }));
        assert_eq!(err.to_http_status(), 409);
        assert!(f.control.healthy_set().await.contains("comfyui"));
    }

    #[tokio::test]
    async fn test_preempt_skips_equal_priority() {
        let f = fixture_with(vec![
            small_entry("left", 50, 15000),
            small_entry("right", 50, 15000),
        ]);
        f.control.force_healthy("left").await;

        // Equal priority blocks preemption; 24576 - 15000 - 1024 < 15000
        let err = f.orchestrator.use_service("right", None).await.unwrap_err();
        assert!(matches!(err, AgentError::PreemptionBlocked { .. }));
        assert!(f
            .control
            .commands()
            .await
            .iter()
            .all(|c| !c.starts_with("stop")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_contention_exhausts_backoff() {
        let f = fixture_with(vec![
            small_entry("alpha", 50, 1000),
            small_entry("beta", 40, 1000),
        ]);

        let held = f.orchestrator.use_service("alpha", None).await.unwrap();

        let err = f.orchestrator.use_service("beta", None).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Lock(LockError::Unavailable { .. })
        ));
        assert_eq!(err.to_http_status(), 423);

        held.release().await.unwrap();
        let lease = f.orchestrator.use_service("beta", None).await.unwrap();
        lease.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_all_stops_everything() {
        let f = fixture();
        f.control.force_healthy("vidi").await;
        f.control.force_healthy("cosyvoice").await;

        f.orchestrator.release_all().await.unwrap();

        assert!(f.control.healthy_set().await.is_empty());
        assert_eq!(f.gpu.used_mb().await, 0);
    }

    #[tokio::test]
    async fn test_crash_recovery_via_force_release() {
        let f = fixture();

        // A previous incarnation died holding the lock; the record is
        // still in the store.
        f.store
            .acquire("gpu_mutex", "comfyui", Duration::from_secs(600))
            .await
            .unwrap();

        let status = f.orchestrator.status().await.unwrap();
        assert_eq!(status.lock.holder, Some("comfyui".to_string()));
        assert!(status.lock.ttl > 0);

        assert!(f.orchestrator.force_release_lock().await.unwrap());

        // Anything can lock immediately now
        let lease = f.orchestrator.use_service("vidi", None).await.unwrap();
        lease.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_status_report_shape() {
        let f = fixture();
        f.control.force_healthy("cosyvoice").await;

        let report = f.orchestrator.status().await.unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["vram"]["total_mb"], 24576);
        assert_eq!(json["vram"]["used_mb"], 4000);
        assert_eq!(json["vram"]["available_mb"], 24576 - 4000 - 1024);
        assert_eq!(json["services"]["cosyvoice"]["state"], "ready");
        assert_eq!(json["services"]["comfyui"]["state"], "stopped");
        assert_eq!(json["services"]["comfyui"]["priority"], 100);
        assert_eq!(json["services"]["comfyui"]["phases"][0], 4);
        assert!(json["lock"]["holder"].is_null());
        assert!(json["lock"]["ttl"].as_i64().unwrap() < 0);
    }

    #[tokio::test]
    async fn test_start_and_stop_service_wrappers() {
        let f = fixture();

        f.orchestrator.start_service("vidi").await.unwrap();
        assert!(f.control.healthy_set().await.contains("vidi"));

        f.orchestrator.stop_service("vidi", false).await.unwrap();
        assert!(!f.control.healthy_set().await.contains("vidi"));

        let err = f.orchestrator.start_service("ghost").await.unwrap_err();
        assert_eq!(err.to_http_status(), 404);
    }

    #[tokio::test]
    async fn test_start_timeout_surfaces_as_504() {
        let f = fixture();
        f.control.fail_start_of("vidi").await;

        let err = f.orchestrator.start_service("vidi").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Lifecycle(LifecycleError::StartTimeout { .. })
        ));
        assert_eq!(err.to_http_status(), 504);
    }
}
