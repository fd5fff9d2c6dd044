//! Device identifiers and compute backends

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{GpuRunnerError, GpuRunnerResult};

/// Index of one accelerator device as seen by its backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Device ordinal as the backend runtime expects it
    pub fn ordinal(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compute backend a worker binds its device through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Host CPU; each device is one logical core slot
    Cpu,
    /// NVIDIA GPU through the CUDA driver
    Cuda,
}

impl Default for Backend {
    #[cfg(feature = "cuda")]
    fn default() -> Self {
        Backend::Cuda
    }

    #[cfg(not(feature = "cuda"))]
    fn default() -> Self {
        Backend::Cpu
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Cpu => write!(f, "cpu"),
            Backend::Cuda => write!(f, "cuda"),
        }
    }
}

impl FromStr for Backend {
    type Err = GpuRunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Backend::Cpu),
            "cuda" | "gpu" | "nvidia" => Ok(Backend::Cuda),
            other => Err(GpuRunnerError::Config(format!(
                "Unknown backend '{}', expected 'cpu' or 'cuda'",
                other
            ))),
        }
    }
}

/// Parse a comma separated device list such as `0,2,3`
pub fn parse_device_list(list: &str) -> GpuRunnerResult<Vec<DeviceId>> {
    let mut devices = Vec::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let index: u32 = part
            .parse()
            .map_err(|_| GpuRunnerError::Config(format!("Invalid device id '{}'", part)))?;
        let id = DeviceId(index);
        if devices.contains(&id) {
            return Err(GpuRunnerError::Config(format!(
                "Device {} listed more than once",
                id
            )));
        }
        devices.push(id);
    }
    Ok(devices)
}

/// Device ids `0..count`, the shape every backend enumerates in
pub fn device_range(count: u32) -> Vec<DeviceId> {
    (0..count).map(DeviceId).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("cpu".parse::<Backend>().unwrap(), Backend::Cpu);
        assert_eq!("CUDA".parse::<Backend>().unwrap(), Backend::Cuda);
        assert!("rocm".parse::<Backend>().is_err());
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(Backend::Cpu.to_string(), "cpu");
        assert_eq!(Backend::Cuda.to_string(), "cuda");
    }

    #[test]
    fn test_parse_device_list() {
        let devices = parse_device_list("0, 2,3").unwrap();
        assert_eq!(devices, vec![DeviceId(0), DeviceId(2), DeviceId(3)]);
        assert!(parse_device_list("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_device_list_rejects_garbage() {
        assert!(parse_device_list("0,x").is_err());
        assert!(parse_device_list("1,1").is_err());
        assert!(parse_device_list("-1").is_err());
    }

    #[test]
    fn test_device_range() {
        assert_eq!(device_range(2), vec![DeviceId(0), DeviceId(1)]);
        assert!(device_range(0).is_empty());
    }

    #[test]
    fn test_device_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&DeviceId(3)).unwrap(), "3");
    }
}
