//! # mux-agent
//!
//! The gpumux daemon: one process that owns the VRAM tracker, the service
//! registry, the lifecycle manager, and the distributed mutex, and exposes
//! them over a small HTTP API.
//!
//! All four components are built once at startup in [`build_orchestrator`]
//! and passed explicitly to the HTTP layer; no hidden globals.

pub mod config;
pub mod http;
pub mod orchestrator;

pub use config::AgentConfig;
pub use orchestrator::{Orchestrator, StatusReport};

use mux_gpu::GpuError;
use mux_lifecycle::LifecycleError;
use mux_lock::LockError;
use std::sync::Arc;

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors surfaced by the orchestrator and the HTTP layer
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Not enough VRAM for {service} and no lower-priority service to evict")]
    PreemptionBlocked { service: String },

    #[error("GPU telemetry error: {0}")]
    Gpu(#[from] GpuError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Core error: {0}")]
    Core(#[from] mux_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short category for logs and error bodies
    pub fn category(&self) -> &'static str {
        match self {
            AgentError::Config(_) => "config",
            AgentError::InvalidArgument(_) => "invalid_argument",
            AgentError::UnknownService(_) => "unknown_service",
            AgentError::PreemptionBlocked { .. } => "preemption_blocked",
            AgentError::Gpu(_) => "gpu_telemetry",
            AgentError::Lifecycle(LifecycleError::UnknownService(_)) => "unknown_service",
            AgentError::Lifecycle(LifecycleError::ContainerMissing(_)) => "container_missing",
            AgentError::Lifecycle(LifecycleError::StartTimeout { .. }) => "start_timeout",
            AgentError::Lifecycle(LifecycleError::StopTimeout(_)) => "stop_timeout",
            AgentError::Lifecycle(_) => "lifecycle",
            AgentError::Lock(LockError::Unavailable { .. }) => "lock_unavailable",
            AgentError::Lock(_) => "lock_store",
            AgentError::Core(_) => "core",
            AgentError::Io(_) => "io",
        }
    }

    /// HTTP status this error maps to
    pub fn to_http_status(&self) -> u16 {
        match self {
            AgentError::InvalidArgument(_) => 400,
            AgentError::UnknownService(_) => 404,
            AgentError::Lifecycle(LifecycleError::UnknownService(_)) => 404,
            AgentError::PreemptionBlocked { .. } => 409,
            AgentError::Lock(LockError::Unavailable { .. }) => 423,
            AgentError::Lifecycle(LifecycleError::ContainerMissing(_)) => 503,
            AgentError::Gpu(_) => 503,
            AgentError::Lock(LockError::Store(_)) => 503,
            AgentError::Lifecycle(LifecycleError::StartTimeout { .. }) => 504,
            AgentError::Lifecycle(LifecycleError::StopTimeout(_)) => 504,
            _ => 500,
        }
    }
}

/// Build the orchestrator from configuration: registry, tracker backend,
/// lifecycle manager, and lock store, wired together once.
pub async fn build_orchestrator(config: &AgentConfig) -> Result<Arc<Orchestrator>> {
    config.validate()?;
    orchestrator::Orchestrator::from_config(config).await.map(Arc::new)
}

/// Initialize logging and tracing from the agent configuration
pub fn init_logging(logging: &config::LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging.show_target);

    match logging.format.as_str() {
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }

    Ok(())
}
