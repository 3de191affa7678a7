//! Error handling for mux-core
//!
//! Configuration and catalog errors. The process refuses to start on any of
//! these; runtime subsystems carry their own error types.

/// Result type alias for mux-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading or validating the service catalog
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration document is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error reading the configuration document
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
