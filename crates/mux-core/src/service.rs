//! Service catalog types
//!
//! A [`ServiceDescriptor`] is the immutable catalog entry for one managed
//! GPU service. The `vram_mb` figure is a planning number; the live tracker
//! reading is always authoritative over it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// How a service is hosted, with the kind-specific control payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceKind {
    /// A pre-existing container managed through the container engine.
    Containerized {
        /// Name or id the engine knows the container by
        container_id: String,
    },
    /// A host process managed through shell start/stop commands.
    Native {
        /// Shell invocation that launches the service
        start_cmd: String,
        /// Shell invocation that terminates it (typically a pattern kill)
        stop_cmd: String,
        /// Where to record the spawned PID, if anywhere
        pid_file: Option<PathBuf>,
    },
}

impl ServiceKind {
    /// Short label used in logs and status output
    pub fn label(&self) -> &'static str {
        match self {
            ServiceKind::Containerized { .. } => "containerized",
            ServiceKind::Native { .. } => "native",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Observed state of a managed service.
///
/// `Ready` and `Stopped` are the stable states; the others may be seen
/// transiently while an operation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Unknown,
    Stopped,
    Starting,
    Ready,
    Stopping,
    Error,
}

impl ServiceState {
    /// String form used in status reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Unknown => "unknown",
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Ready => "ready",
            ServiceState::Stopping => "stopping",
            ServiceState::Error => "error",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable catalog entry for one managed GPU service.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    /// Canonical identifier; unique within the registry
    pub name: String,
    /// Hosting kind and its control payload
    pub kind: ServiceKind,
    /// Nominal VRAM footprint in MB (planning figure)
    pub vram_mb: u64,
    /// Preemption priority; higher survives, lower is evicted first
    pub priority: u32,
    /// Endpoint that answers 2xx when the service is ready
    pub health_url: Url,
    /// How long to wait for readiness after a start
    pub health_timeout: Duration,
    /// Minimum delay after a start before the first probe
    pub warmup: Duration,
    /// Pipeline phases that require this service
    pub phases: Vec<u32>,
    /// Endpoint asked to release VRAM before a hard stop, if any
    pub graceful_evict_url: Option<Url>,
}

impl ServiceDescriptor {
    /// Whether this service is required by the given pipeline phase
    pub fn in_phase(&self, phase: u32) -> bool {
        self.phases.contains(&phase)
    }
}
