//! VRAM tracker
//!
//! The [`VramTracker`] is the read-only authority on GPU memory. Every
//! answer comes from a fresh snapshot of the backend; nothing is cached,
//! so a fit check made just before a start reflects what the driver sees
//! right now.

use crate::snapshot::{GpuProcess, GpuSnapshot};
use crate::Result;
use async_trait::async_trait;
use tracing::debug;

/// Backend that samples the GPU management counter
#[async_trait]
pub trait GpuTelemetry: Send + Sync {
    /// Take one fresh reading
    async fn snapshot(&self) -> Result<GpuSnapshot>;

    /// Release the underlying management handle
    async fn shutdown(&self) -> Result<()>;
}

/// Read-only VRAM accounting over a telemetry backend
pub struct VramTracker {
    backend: Box<dyn GpuTelemetry>,
    reserve_mb: u64,
}

impl VramTracker {
    /// Create a tracker over the given backend.
    ///
    /// `reserve_mb` is the system headroom (desktop, driver overhead)
    /// subtracted from every availability figure.
    pub fn new(backend: Box<dyn GpuTelemetry>, reserve_mb: u64) -> Self {
        Self { backend, reserve_mb }
    }

    /// The configured system reserve in MB
    pub fn reserve_mb(&self) -> u64 {
        self.reserve_mb
    }

    /// Take one fresh snapshot
    pub async fn snapshot(&self) -> Result<GpuSnapshot> {
        self.backend.snapshot().await
    }

    /// Free VRAM after the system reserve, from a fresh snapshot
    pub async fn available_mb(&self) -> Result<u64> {
        Ok(self.snapshot().await?.available_mb(self.reserve_mb))
    }

    /// Whether `required_mb` fits alongside the default system reserve
    pub async fn can_fit(&self, required_mb: u64) -> Result<bool> {
        self.can_fit_with_margin(required_mb, self.reserve_mb).await
    }

    /// Whether `required_mb` fits after holding back `margin_mb`
    pub async fn can_fit_with_margin(&self, required_mb: u64, margin_mb: u64) -> Result<bool> {
        let snap = self.snapshot().await?;
        let available = snap.available_mb(margin_mb);
        let fits = available >= required_mb;
        debug!(
            "VRAM check: need {} MB, have {} MB (free={}, margin={})",
            required_mb, available, snap.free_mb, margin_mb
        );
        Ok(fits)
    }

    /// First GPU process whose name contains `pattern`, case-insensitive
    pub async fn find_process(&self, pattern: &str) -> Result<Option<GpuProcess>> {
        let snap = self.snapshot().await?;
        Ok(snap.find_process(pattern).cloned())
    }

    /// Release the management handle
    pub async fn shutdown(&self) -> Result<()> {
        self.backend.shutdown().await
    }
}
