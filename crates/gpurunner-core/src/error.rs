//! Error types for gpurunner

use thiserror::Error;

/// Main error type for gpurunner
#[derive(Error, Debug)]
pub enum GpuRunnerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device enumeration or binding error
    #[error("Device error: {0}")]
    Device(String),

    /// Process pool error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Fault raised inside a worker loop
    #[error("Worker error: {0}")]
    Worker(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for gpurunner operations
pub type GpuRunnerResult<T> = Result<T, GpuRunnerError>;

impl From<serde_json::Error> for GpuRunnerError {
    fn from(err: serde_json::Error) -> Self {
        GpuRunnerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for GpuRunnerError {
    fn from(err: toml::de::Error) -> Self {
        GpuRunnerError::Config(err.to_string())
    }
}
