//! Configuration types for gpurunner

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Backend, DeviceId, GpuRunnerError, GpuRunnerResult};

/// Base sleep between compute operations, in seconds
pub const DEFAULT_SLEEP_TIME_SECS: f64 = 0.0;
/// Edge length of the square compute buffer
pub const DEFAULT_MATRIX_SIZE: usize = 30_000;

pub const DEFAULT_JITTER_MIN_INTERVAL_SECS: f64 = 30.0;
pub const DEFAULT_JITTER_MAX_INTERVAL_SECS: f64 = 120.0;
pub const DEFAULT_JITTER_MIN_DURATION_SECS: f64 = 5.0;
pub const DEFAULT_JITTER_MAX_DURATION_SECS: f64 = 20.0;
pub const DEFAULT_JITTER_SLEEP_MULTIPLIER: f64 = 10.0;

/// Whole run configuration, as read from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Hours to keep the devices busy; `None` runs until interrupted
    pub hours_to_run: Option<u64>,
    /// Explicit device subset; `None` uses every enumerated device
    pub devices: Option<Vec<DeviceId>>,
    /// Per-worker settings
    pub worker: WorkerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl RunConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> GpuRunnerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GpuRunnerError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> GpuRunnerResult<Self> {
        toml::from_str(content)
            .map_err(|e| GpuRunnerError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Run duration, if bounded
    pub fn run_duration(&self) -> Option<Duration> {
        self.hours_to_run
            .map(|hours| Duration::from_secs(hours.saturating_mul(3600)))
    }

    pub fn validate(&self) -> GpuRunnerResult<()> {
        self.worker.validate()
    }
}

/// Settings handed to every worker process; immutable for the worker's lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Backend the worker binds its device through
    pub backend: Backend,
    /// Base sleep between compute operations, in seconds
    pub sleep_time: f64,
    /// Edge length of the square compute buffer
    pub matrix_size: usize,
    /// Utilization jitter, the `[worker.jitter]` table
    pub jitter: JitterConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            sleep_time: DEFAULT_SLEEP_TIME_SECS,
            matrix_size: DEFAULT_MATRIX_SIZE,
            jitter: JitterConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Base sleep as a duration, saturating for values `validate` rejects
    pub fn base_sleep(&self) -> Duration {
        Duration::try_from_secs_f64(self.sleep_time).unwrap_or(Duration::MAX)
    }

    /// Check every field is usable before any process is spawned
    pub fn validate(&self) -> GpuRunnerResult<()> {
        check_seconds("sleep_time", self.sleep_time)?;
        if self.matrix_size == 0 {
            return Err(GpuRunnerError::Config(
                "matrix_size must be greater than zero".to_string(),
            ));
        }
        self.jitter.validate()?;
        if self.jitter.enabled {
            check_seconds(
                "sleep_time * jitter sleep_multiplier",
                self.sleep_time * self.jitter.sleep_multiplier,
            )?;
        }
        Ok(())
    }
}

/// Jitter tuning: when and for how long utilization is lowered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    /// Whether jitter is applied at all
    pub enabled: bool,
    /// Minimum seconds between jitter events
    pub min_interval: f64,
    /// Maximum seconds between jitter events
    pub max_interval: f64,
    /// Minimum length of a jitter event, in seconds
    pub min_duration: f64,
    /// Maximum length of a jitter event, in seconds
    pub max_duration: f64,
    /// Sleep inflation during a jitter event (higher means lower utilization)
    pub sleep_multiplier: f64,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_interval: DEFAULT_JITTER_MIN_INTERVAL_SECS,
            max_interval: DEFAULT_JITTER_MAX_INTERVAL_SECS,
            min_duration: DEFAULT_JITTER_MIN_DURATION_SECS,
            max_duration: DEFAULT_JITTER_MAX_DURATION_SECS,
            sleep_multiplier: DEFAULT_JITTER_SLEEP_MULTIPLIER,
        }
    }
}

impl JitterConfig {
    pub fn validate(&self) -> GpuRunnerResult<()> {
        check_seconds("jitter min_interval", self.min_interval)?;
        check_seconds("jitter max_interval", self.max_interval)?;
        check_seconds("jitter min_duration", self.min_duration)?;
        check_seconds("jitter max_duration", self.max_duration)?;
        check_seconds("jitter sleep_multiplier", self.sleep_multiplier)?;
        if self.min_interval > self.max_interval {
            return Err(GpuRunnerError::Config(format!(
                "jitter min_interval ({}) exceeds max_interval ({})",
                self.min_interval, self.max_interval
            )));
        }
        if self.min_duration > self.max_duration {
            return Err(GpuRunnerError::Config(format!(
                "jitter min_duration ({}) exceeds max_duration ({})",
                self.min_duration, self.max_duration
            )));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Accepts any value that converts to a `Duration`
fn check_seconds(name: &str, value: f64) -> GpuRunnerResult<()> {
    Duration::try_from_secs_f64(value).map(|_| ()).map_err(|_| {
        GpuRunnerError::Config(format!(
            "{} must be a finite, non-negative number of seconds in range (got {})",
            name, value
        ))
    })
}
