//! # mux-lifecycle
//!
//! Start, stop, and health-check the managed GPU services.
//!
//! Two hosting kinds hide behind one interface: containers driven through
//! the container engine, and native host processes driven through shell
//! commands. The [`LifecycleManager`] owns a cached state per service and
//! refreshes it by probing before anyone gets to read it.

use std::time::Duration;
use thiserror::Error;

pub mod docker;
pub mod manager;
pub mod native;
pub mod probe;

pub use docker::ContainerEngine;
pub use manager::{LifecycleManager, ServiceControl};
pub use probe::HealthProber;

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Errors that can occur during lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Name is not in the registry
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// The referenced container does not exist on the engine
    #[error("Container not found: {0} (create it before managing it)")]
    ContainerMissing(String),

    /// Service failed to become healthy within its readiness window
    #[error("Service {name} did not become healthy within {timeout:?}")]
    StartTimeout { name: String, timeout: Duration },

    /// Stop command did not complete in bounded time
    #[error("Stop of {0} did not complete in time (retry with force)")]
    StopTimeout(String),

    /// Container engine call failed
    #[error("Container engine error: {0}")]
    Engine(String),

    /// Native process control failed
    #[error("Process error: {0}")]
    Process(String),
}
