//! Mock telemetry backend for tests and GPU-less development

use crate::snapshot::{GpuProcess, GpuSnapshot};
use crate::tracker::GpuTelemetry;
use crate::{GpuError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug)]
struct MockState {
    total_mb: u64,
    used_mb: u64,
    processes: Vec<GpuProcess>,
    temperature_c: Option<u32>,
    utilization_percent: Option<u32>,
    fail_queries: bool,
}

/// Fake GPU with settable memory pressure.
///
/// Clones share state, so a test can hand one clone to the tracker and
/// keep another as a handle to simulate allocation and reclaim.
#[derive(Debug, Clone)]
pub struct MockTelemetry {
    state: Arc<RwLock<MockState>>,
}

impl MockTelemetry {
    /// Create an idle device with the given capacity
    pub fn new(total_mb: u64) -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState {
                total_mb,
                used_mb: 0,
                processes: Vec::new(),
                temperature_c: Some(55),
                utilization_percent: Some(0),
                fail_queries: false,
            })),
        }
    }

    /// Set the used counter directly
    pub async fn set_used_mb(&self, used_mb: u64) {
        self.state.write().await.used_mb = used_mb;
    }

    /// Current used counter
    pub async fn used_mb(&self) -> u64 {
        self.state.read().await.used_mb
    }

    /// Add to the used counter, as a service allocating would
    pub async fn occupy(&self, mb: u64) {
        let mut state = self.state.write().await;
        state.used_mb = (state.used_mb + mb).min(state.total_mb);
    }

    /// Subtract from the used counter, as the driver reclaiming would
    pub async fn reclaim(&self, mb: u64) {
        let mut state = self.state.write().await;
        state.used_mb = state.used_mb.saturating_sub(mb);
    }

    /// Replace the reported process list
    pub async fn set_processes(&self, processes: Vec<GpuProcess>) {
        self.state.write().await.processes = processes;
    }

    /// Drop the optional sensors, as a driver without them would
    pub async fn clear_sensors(&self) {
        let mut state = self.state.write().await;
        state.temperature_c = None;
        state.utilization_percent = None;
    }

    /// Make every snapshot fail with a transient query error
    pub async fn fail_queries(&self, fail: bool) {
        self.state.write().await.fail_queries = fail;
    }
}

#[async_trait]
impl GpuTelemetry for MockTelemetry {
    async fn snapshot(&self) -> Result<GpuSnapshot> {
        let state = self.state.read().await;
        if state.fail_queries {
            return Err(GpuError::Query("mock query failure".to_string()));
        }
        Ok(GpuSnapshot {
            total_mb: state.total_mb,
            used_mb: state.used_mb,
            free_mb: state.total_mb.saturating_sub(state.used_mb),
            processes: state.processes.clone(),
            temperature_c: state.temperature_c,
            utilization_percent: state.utilization_percent,
            sampled_at: Utc::now(),
        })
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_occupy_and_reclaim() {
        let gpu = MockTelemetry::new(24576);
        gpu.occupy(20000).await;
        assert_eq!(gpu.used_mb().await, 20000);

        let snap = gpu.snapshot().await.unwrap();
        assert_eq!(snap.free_mb, 4576);

        gpu.reclaim(30000).await; // floors at zero
        assert_eq!(gpu.used_mb().await, 0);
    }

    #[tokio::test]
    async fn test_snapshot_without_sensors() {
        let gpu = MockTelemetry::new(24576);
        gpu.clear_sensors().await;

        let snap = gpu.snapshot().await.unwrap();
        assert!(snap.temperature_c.is_none());
        assert!(snap.utilization_percent.is_none());
    }

    #[tokio::test]
    async fn test_shared_state_across_clones() {
        let gpu = MockTelemetry::new(24576);
        let handle = gpu.clone();
        handle.occupy(1000).await;
        assert_eq!(gpu.snapshot().await.unwrap().used_mb, 1000);
    }
}
