//! Agent configuration
//!
//! Wraps the manager configuration (registry + global knobs) with the
//! agent's own concerns: where to bind, how to log, which telemetry and
//! lock-store backends to use.

use crate::{AgentError, Result};
use mux_core::{ManagerConfig, ServiceRegistry};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Complete configuration for the gpumux agent
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Agent-specific settings
    #[serde(default)]
    pub agent: AgentSection,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Manager configuration: registry and global knobs
    #[serde(default)]
    pub manager: ManagerConfig,
}

/// Agent-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSection {
    /// HTTP bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Telemetry backend: "nvml" or "mock"
    #[serde(default = "default_gpu_backend")]
    pub gpu_backend: String,

    /// Lock store backend: "redis" or "memory"
    #[serde(default = "default_lock_store")]
    pub lock_store: String,

    /// Redis URL for the lock store
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Key the GPU mutex lives under
    #[serde(default = "default_lock_key")]
    pub lock_key: String,
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:7070".parse().expect("static bind address")
}

fn default_gpu_backend() -> String {
    "nvml".to_string()
}

fn default_lock_store() -> String {
    "redis".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_lock_key() -> String {
    "gpu_mutex".to_string()
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            gpu_backend: default_gpu_backend(),
            lock_store: default_lock_store(),
            redis_url: default_redis_url(),
            lock_key: default_lock_key(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Show target in logs
    #[serde(default)]
    pub show_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            show_target: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AgentConfig = serde_yaml::from_str(&content)
            .map_err(|e| AgentError::config(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| AgentError::config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the whole document, registry included.
    ///
    /// The process must refuse to start on any failure here.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(AgentError::config(format!("invalid log level: {}", other)));
            }
        }
        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(AgentError::config(format!("invalid log format: {}", other)));
            }
        }
        match self.agent.gpu_backend.as_str() {
            "nvml" | "mock" => {}
            other => {
                return Err(AgentError::config(format!("invalid gpu_backend: {}", other)));
            }
        }
        match self.agent.lock_store.as_str() {
            "redis" | "memory" => {}
            other => {
                return Err(AgentError::config(format!("invalid lock_store: {}", other)));
            }
        }

        // Surface catalog errors now rather than at first use
        self.registry()?;
        Ok(())
    }

    /// Build the validated service registry from the manager section
    pub fn registry(&self) -> Result<ServiceRegistry> {
        Ok(ServiceRegistry::from_entries(self.manager.services.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AgentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.agent.lock_key, "gpu_mutex");
        assert_eq!(config.manager.vram_reserve_mb, 1024);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = AgentConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_backend_rejected() {
        let mut config = AgentConfig::default();
        config.agent.gpu_backend = "dcgm".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_service_entry_rejected() {
        let mut config = AgentConfig::default();
        config.manager.services[0].start_cmd = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let yaml = "agents:\n  bind_addr: 127.0.0.1:7070\n";
        let parsed: std::result::Result<AgentConfig, _> = serde_yaml::from_str(yaml);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("agent.yaml");

        let config = AgentConfig::default();
        config.to_file(&path).unwrap();

        let loaded = AgentConfig::from_file(&path).unwrap();
        assert_eq!(loaded.agent.bind_addr, config.agent.bind_addr);
        assert_eq!(loaded.manager.services.len(), 4);
    }
}
