//! # mux-gpu
//!
//! GPU memory telemetry for gpumux.
//!
//! This crate provides:
//! - A read-only [`GpuTelemetry`] backend trait over the driver's
//!   management counter
//! - An NVML backend (behind the `nvml` feature)
//! - A mock backend for tests and GPU-less development (behind `mock`)
//! - The [`VramTracker`], which layers fit checks and process lookup on
//!   top of fresh snapshots
//!
//! The tracker never mutates GPU state; it only samples it. A descriptor's
//! nominal footprint is a planning figure, the snapshot is the truth.

use thiserror::Error;

pub mod snapshot;
pub mod tracker;

#[cfg(feature = "nvml")]
pub mod nvml;

#[cfg(any(feature = "mock", test))]
pub mod mock;

pub use snapshot::{GpuProcess, GpuSnapshot};
pub use tracker::{GpuTelemetry, VramTracker};

/// Result type for GPU telemetry operations
pub type Result<T> = std::result::Result<T, GpuError>;

/// Errors that can occur while sampling GPU telemetry
#[derive(Debug, Error)]
pub enum GpuError {
    /// The management library could not be initialized at all.
    /// Callers should treat the tracker as down, not retry blindly.
    #[error("GPU telemetry unavailable: {0}")]
    Unavailable(String),

    /// A single query failed after successful initialization.
    /// Transient; callers should back off and retry.
    #[error("GPU query failed: {0}")]
    Query(String),

    /// The configured device index does not exist
    #[error("GPU device not found: index {0}")]
    DeviceNotFound(u32),
}

impl GpuError {
    /// Check if this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, GpuError::Query(_))
    }
}
