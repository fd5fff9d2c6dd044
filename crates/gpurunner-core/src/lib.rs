//! gpurunner-core: Core types for the gpurunner keep-alive utility
//!
//! This crate provides the pieces shared by the runtime and the CLI:
//! - Device identifiers and compute backends
//! - Worker, jitter and run configuration
//! - Error handling
//! - The jitter schedule that modulates a worker's sleep time

pub mod config;
pub mod device;
pub mod error;
pub mod jitter;

pub use config::*;
pub use device::*;
pub use error::*;
pub use jitter::*;
