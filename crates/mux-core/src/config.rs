//! Manager configuration
//!
//! One YAML document, loaded at startup, declares the service catalog and
//! the global knobs. Unknown keys are rejected so a typo cannot silently
//! drop a service from management.

use crate::error::{Error, Result};
use crate::service::{ServiceDescriptor, ServiceKind};
use crate::{DEFAULT_LOCK_TTL_S, DEFAULT_VRAM_RESERVE_MB};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Top-level manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// VRAM held back for desktop/background consumers (MB)
    #[serde(default = "default_vram_reserve_mb")]
    pub vram_reserve_mb: u64,

    /// Default TTL for the GPU mutex (seconds)
    #[serde(default = "default_lock_ttl_s")]
    pub default_lock_ttl_s: u64,

    /// GPU device index to track
    #[serde(default)]
    pub device_index: u32,

    /// Managed service catalog
    #[serde(default = "default_catalog")]
    pub services: Vec<ServiceEntry>,
}

fn default_vram_reserve_mb() -> u64 {
    DEFAULT_VRAM_RESERVE_MB
}

fn default_lock_ttl_s() -> u64 {
    DEFAULT_LOCK_TTL_S
}

/// One service as written in the configuration document.
///
/// Flat on the wire; kind-specific requirements are enforced by
/// [`ServiceEntry::into_descriptor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceEntry {
    pub name: String,
    /// "containerized" or "native"
    pub kind: String,
    pub vram_mb: u64,
    pub priority: u32,
    pub health_url: String,
    #[serde(default = "default_health_timeout_s")]
    pub health_timeout_s: u64,
    #[serde(default = "default_warmup_s")]
    pub warmup_s: u64,
    #[serde(default)]
    pub phases: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graceful_evict_url: Option<String>,
}

fn default_health_timeout_s() -> u64 {
    60
}

fn default_warmup_s() -> u64 {
    10
}

impl ServiceEntry {
    /// Validate this entry and convert it into an immutable descriptor.
    pub fn into_descriptor(self) -> Result<ServiceDescriptor> {
        let name = self.name;
        if name.is_empty() {
            return Err(Error::config("service name cannot be empty"));
        }

        let kind = match self.kind.as_str() {
            "containerized" => {
                let container_id = self.container_id.ok_or_else(|| {
                    Error::config(format!("{}: containerized service needs container_id", name))
                })?;
                ServiceKind::Containerized { container_id }
            }
            "native" => {
                let start_cmd = self.start_cmd.ok_or_else(|| {
                    Error::config(format!("{}: native service needs start_cmd", name))
                })?;
                let stop_cmd = self.stop_cmd.ok_or_else(|| {
                    Error::config(format!("{}: native service needs stop_cmd", name))
                })?;
                ServiceKind::Native {
                    start_cmd,
                    stop_cmd,
                    pid_file: self.pid_file,
                }
            }
            other => {
                return Err(Error::config(format!(
                    "{}: unknown service kind {:?} (expected \"containerized\" or \"native\")",
                    name, other
                )))
            }
        };

        let health_url = Url::parse(&self.health_url)
            .map_err(|e| Error::config(format!("{}: invalid health_url: {}", name, e)))?;

        let graceful_evict_url = match self.graceful_evict_url {
            Some(raw) => Some(
                Url::parse(&raw)
                    .map_err(|e| Error::config(format!("{}: invalid graceful_evict_url: {}", name, e)))?,
            ),
            None => None,
        };

        if self.health_timeout_s == 0 {
            return Err(Error::config(format!(
                "{}: health_timeout_s must be greater than zero",
                name
            )));
        }

        Ok(ServiceDescriptor {
            name,
            kind,
            vram_mb: self.vram_mb,
            priority: self.priority,
            health_url,
            health_timeout: Duration::from_secs(self.health_timeout_s),
            warmup: Duration::from_secs(self.warmup_s),
            phases: self.phases,
            graceful_evict_url,
        })
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            vram_reserve_mb: DEFAULT_VRAM_RESERVE_MB,
            default_lock_ttl_s: DEFAULT_LOCK_TTL_S,
            device_index: 0,
            services: default_catalog(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ManagerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// The catalog used when no configuration file is supplied.
///
/// Four services of a content-production pipeline sharing one 24 GB card:
/// the video generator gets top priority, the LLM fallback sits at the
/// bottom and is first out the door when room is needed.
pub fn default_catalog() -> Vec<ServiceEntry> {
    vec![
        ServiceEntry {
            name: "comfyui".to_string(),
            kind: "native".to_string(),
            vram_mb: 20000,
            priority: 100,
            health_url: "http://localhost:8188/system_stats".to_string(),
            health_timeout_s: 120, // slow to load models
            warmup_s: 30,
            phases: vec![4],
            container_id: None,
            start_cmd: Some("/opt/mux/start_comfy.sh".to_string()),
            stop_cmd: Some("pkill -f 'python.*main.py.*8188'".to_string()),
            pid_file: Some(PathBuf::from("/run/mux/comfy.pid")),
            graceful_evict_url: None,
        },
        ServiceEntry {
            name: "cosyvoice".to_string(),
            kind: "containerized".to_string(),
            vram_mb: 4000,
            priority: 50,
            health_url: "http://localhost:50000/docs".to_string(),
            health_timeout_s: 60,
            warmup_s: 10,
            phases: vec![3],
            container_id: Some("mux_cosyvoice".to_string()),
            start_cmd: None,
            stop_cmd: None,
            pid_file: None,
            graceful_evict_url: None,
        },
        ServiceEntry {
            name: "vidi".to_string(),
            kind: "native".to_string(),
            vram_mb: 4000,
            priority: 40,
            health_url: "http://localhost:8099/health".to_string(),
            health_timeout_s: 90,
            warmup_s: 20,
            phases: vec![2],
            container_id: None,
            start_cmd: Some("/opt/mux/start_vidi.sh".to_string()),
            stop_cmd: Some("pkill -f 'vidi'".to_string()),
            pid_file: Some(PathBuf::from("/run/mux/vidi.pid")),
            graceful_evict_url: None,
        },
        ServiceEntry {
            name: "ollama".to_string(),
            kind: "containerized".to_string(),
            vram_mb: 18000,
            priority: 10, // fallback only, evicted first
            health_url: "http://localhost:11434/api/tags".to_string(),
            health_timeout_s: 30,
            warmup_s: 5,
            phases: vec![],
            container_id: Some("mux_ollama".to_string()),
            start_cmd: None,
            stop_cmd: None,
            pid_file: None,
            graceful_evict_url: Some("http://localhost:11434/api/generate".to_string()),
        },
    ]
}
