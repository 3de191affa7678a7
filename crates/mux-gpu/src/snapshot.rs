//! Snapshot types
//!
//! A [`GpuSnapshot`] is one momentary reading of the device: memory
//! counters, the compute process list, and whatever optional sensors the
//! driver was willing to report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A process holding GPU memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuProcess {
    pub pid: u32,
    pub name: String,
    pub memory_mb: u64,
}

/// One sampled reading of the GPU device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuSnapshot {
    pub total_mb: u64,
    pub used_mb: u64,
    pub free_mb: u64,
    /// Compute processes, in the order the driver reported them
    pub processes: Vec<GpuProcess>,
    /// GPU core temperature, when the sensor answered
    pub temperature_c: Option<u32>,
    /// GPU utilization, when the counter answered
    pub utilization_percent: Option<u32>,
    pub sampled_at: DateTime<Utc>,
}

impl GpuSnapshot {
    /// Free memory after subtracting a reserve, floored at zero
    pub fn available_mb(&self, reserve_mb: u64) -> u64 {
        self.free_mb.saturating_sub(reserve_mb)
    }

    /// First process whose name contains `pattern`, case-insensitive
    pub fn find_process(&self, pattern: &str) -> Option<&GpuProcess> {
        let needle = pattern.to_lowercase();
        self.processes
            .iter()
            .find(|p| p.name.to_lowercase().contains(&needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> GpuSnapshot {
        GpuSnapshot {
            total_mb: 24576,
            used_mb: 4600,
            free_mb: 19976,
            processes: vec![
                GpuProcess {
                    pid: 4242,
                    name: "Python3".to_string(),
                    memory_mb: 4000,
                },
                GpuProcess {
                    pid: 5151,
                    name: "ollama_llama_server".to_string(),
                    memory_mb: 600,
                },
            ],
            temperature_c: Some(61),
            utilization_percent: Some(37),
            sampled_at: Utc::now(),
        }
    }

    #[test]
    fn test_available_applies_reserve() {
        let snap = snapshot();
        assert_eq!(snap.available_mb(1024), 18952);
        // Reserve larger than free floors at zero
        assert_eq!(snap.available_mb(30000), 0);
    }

    #[test]
    fn test_find_process_case_insensitive() {
        let snap = snapshot();
        assert_eq!(snap.find_process("python").unwrap().pid, 4242);
        assert_eq!(snap.find_process("OLLAMA").unwrap().pid, 5151);
        assert!(snap.find_process("comfy").is_none());
    }

    #[test]
    fn test_serializes_optional_sensors_as_null() {
        let mut snap = snapshot();
        snap.temperature_c = None;
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json["temperature_c"].is_null());
        assert_eq!(json["utilization_percent"], 37);
    }
}
