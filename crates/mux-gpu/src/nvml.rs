//! NVML telemetry backend
//!
//! Samples the device through NVIDIA's management library. The NVML handle
//! is initialized lazily on the first query and kept for the lifetime of
//! the backend; `shutdown` drops it, which releases the library.
//!
//! Optional sensors (temperature, utilization) are allowed to fail without
//! failing the snapshot; older drivers and passthrough setups routinely
//! withhold them.

use crate::snapshot::{GpuProcess, GpuSnapshot};
use crate::tracker::GpuTelemetry;
use crate::{GpuError, Result};
use async_trait::async_trait;
use chrono::Utc;
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::enums::device::UsedGpuMemory;
use nvml_wrapper::Nvml;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// NVML-backed telemetry for one device
pub struct NvmlTelemetry {
    device_index: u32,
    nvml: Mutex<Option<Nvml>>,
}

impl NvmlTelemetry {
    /// Create a backend for the given device index.
    ///
    /// NVML itself is not touched until the first snapshot.
    pub fn new(device_index: u32) -> Self {
        Self {
            device_index,
            nvml: Mutex::new(None),
        }
    }

    /// The tracked device index
    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    fn init_handle(&self) -> Result<Nvml> {
        let nvml = Nvml::init()
            .map_err(|e| GpuError::Unavailable(format!("NVML initialization failed: {}", e)))?;

        let device_count = nvml
            .device_count()
            .map_err(|e| GpuError::Unavailable(format!("failed to get device count: {}", e)))?;
        if self.device_index >= device_count {
            return Err(GpuError::DeviceNotFound(self.device_index));
        }

        info!(
            "NVML initialized: device {} of {}",
            self.device_index, device_count
        );
        Ok(nvml)
    }
}

#[async_trait]
impl GpuTelemetry for NvmlTelemetry {
    async fn snapshot(&self) -> Result<GpuSnapshot> {
        let mut guard = self.nvml.lock().await;
        if guard.is_none() {
            *guard = Some(self.init_handle()?);
        }
        // Guaranteed populated just above
        let nvml = guard.as_ref().ok_or_else(|| {
            GpuError::Unavailable("NVML handle missing after initialization".to_string())
        })?;

        let device = nvml
            .device_by_index(self.device_index)
            .map_err(|e| GpuError::Query(format!("failed to get device: {}", e)))?;

        let memory = device
            .memory_info()
            .map_err(|e| GpuError::Query(format!("failed to get memory info: {}", e)))?;

        let mut processes = Vec::new();
        match device.running_compute_processes() {
            Ok(procs) => {
                for proc in procs {
                    let name = nvml
                        .sys_process_name(proc.pid, 64)
                        .unwrap_or_else(|_| format!("pid_{}", proc.pid));
                    let memory_mb = match proc.used_gpu_memory {
                        UsedGpuMemory::Used(bytes) => bytes / BYTES_PER_MB,
                        UsedGpuMemory::Unavailable => 0,
                    };
                    processes.push(GpuProcess {
                        pid: proc.pid,
                        name,
                        memory_mb,
                    });
                }
            }
            Err(e) => {
                warn!("could not list GPU processes: {}", e);
            }
        }

        // Sensors are best-effort
        let temperature_c = device.temperature(TemperatureSensor::Gpu).ok();
        let utilization_percent = device.utilization_rates().ok().map(|u| u.gpu);

        let snapshot = GpuSnapshot {
            total_mb: memory.total / BYTES_PER_MB,
            used_mb: memory.used / BYTES_PER_MB,
            free_mb: memory.free / BYTES_PER_MB,
            processes,
            temperature_c,
            utilization_percent,
            sampled_at: Utc::now(),
        };

        debug!(
            "GPU snapshot: {}/{} MB used, {} processes",
            snapshot.used_mb,
            snapshot.total_mb,
            snapshot.processes.len()
        );

        Ok(snapshot)
    }

    async fn shutdown(&self) -> Result<()> {
        let mut guard = self.nvml.lock().await;
        if guard.take().is_some() {
            debug!("NVML handle released");
        }
        Ok(())
    }
}
