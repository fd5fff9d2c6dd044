//! Worker process launchers
//!
//! A launcher only builds the command; the pool owns spawning, the stdin
//! stop pipe and joining.

use std::path::PathBuf;

use gpurunner_core::{DeviceId, GpuRunnerError, GpuRunnerResult, WorkerConfig};
use tokio::process::Command;

/// Subcommand a worker process is started with
pub const WORKER_SUBCOMMAND: &str = "worker";

/// Builds the command that starts the worker for one device
pub trait Launcher: Send + Sync {
    fn command(&self, device: DeviceId, config: &WorkerConfig) -> GpuRunnerResult<Command>;

    /// Get the launcher name
    fn name(&self) -> &'static str;
}

/// Re-executes a gpurunner binary in worker mode.
///
/// Every worker starts from a fresh exec, so no device context initialized in
/// the parent (for example while enumerating devices) leaks into a child.
#[derive(Debug, Clone)]
pub struct SelfExecLauncher {
    program: PathBuf,
    log_level: String,
}

impl SelfExecLauncher {
    pub fn new(program: PathBuf, log_level: impl Into<String>) -> Self {
        Self {
            program,
            log_level: log_level.into(),
        }
    }

    /// Launcher for the currently running executable
    pub fn current(log_level: impl Into<String>) -> GpuRunnerResult<Self> {
        let program = std::env::current_exe().map_err(|e| {
            GpuRunnerError::Runtime(format!("Cannot locate the gpurunner executable: {}", e))
        })?;
        Ok(Self::new(program, log_level))
    }
}

impl Launcher for SelfExecLauncher {
    fn command(&self, device: DeviceId, config: &WorkerConfig) -> GpuRunnerResult<Command> {
        let settings = serde_json::to_string(config)?;

        let mut cmd = Command::new(&self.program);
        cmd.arg(WORKER_SUBCOMMAND);
        cmd.arg("--device").arg(device.to_string());
        cmd.arg("--settings").arg(settings);
        cmd.arg("--log-level").arg(&self.log_level);
        Ok(cmd)
    }

    fn name(&self) -> &'static str {
        "self-exec"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_build_command() {
        let launcher = SelfExecLauncher::new(PathBuf::from("/usr/bin/gpurunner"), "debug");
        let mut config = WorkerConfig::default();
        config.matrix_size = 256;

        let cmd = launcher.command(DeviceId(2), &config).unwrap();
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), OsStr::new("/usr/bin/gpurunner"));

        let args: Vec<&OsStr> = std_cmd.get_args().collect();
        assert_eq!(args[0], "worker");
        assert_eq!(args[1..3], ["--device", "2"]);
        assert_eq!(args[3], "--settings");
        let parsed: WorkerConfig = serde_json::from_str(args[4].to_str().unwrap()).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(args[5..7], ["--log-level", "debug"]);
        assert_eq!(launcher.name(), "self-exec");
    }

    #[test]
    fn test_current_exe() {
        let launcher = SelfExecLauncher::current("info").unwrap();
        assert!(launcher.program.is_absolute());
    }
}
