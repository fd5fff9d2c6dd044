//! Process pool
//!
//! One worker process and one stop signal per device. The pool offers coarse
//! lifecycle control only: no restarts, no health checks. A worker that dies
//! early is noticed when `stop()` joins it.

use std::process::Stdio;
use std::sync::Arc;

use gpurunner_core::{DeviceId, GpuRunnerError, GpuRunnerResult, WorkerConfig};
use tokio::process::Child;
use tracing::{debug, error, info, warn};

use crate::launcher::Launcher;
use crate::signal::StopSignal;

/// Worker status as seen by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Created, not yet spawned
    Pending,
    /// Process spawned
    Running,
    /// Stop signal set, not yet joined
    Terminating,
    /// Joined with a successful exit
    Terminated,
    /// Failed to spawn, or joined with a failing exit
    Failed,
}

/// How one worker process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub device: DeviceId,
    pub pid: Option<u32>,
    /// Exit code, `None` when killed by a signal or the join itself failed
    pub code: Option<i32>,
    pub success: bool,
}

struct WorkerSlot {
    device: DeviceId,
    status: WorkerStatus,
    stop: StopSignal,
    child: Option<Child>,
}

/// Owns the worker processes and their stop signals
pub struct WorkerPool {
    config: WorkerConfig,
    launcher: Arc<dyn Launcher>,
    slots: Vec<WorkerSlot>,
}

impl WorkerPool {
    /// Create one pending worker and one unset stop signal per device.
    /// Nothing is spawned until [`WorkerPool::start`].
    pub fn new(devices: Vec<DeviceId>, config: WorkerConfig, launcher: Arc<dyn Launcher>) -> Self {
        let slots = devices
            .into_iter()
            .map(|device| WorkerSlot {
                device,
                status: WorkerStatus::Pending,
                stop: StopSignal::new(),
                child: None,
            })
            .collect();

        Self {
            config,
            launcher,
            slots,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn devices(&self) -> Vec<DeviceId> {
        self.slots.iter().map(|s| s.device).collect()
    }

    pub fn statuses(&self) -> Vec<(DeviceId, WorkerStatus)> {
        self.slots.iter().map(|s| (s.device, s.status)).collect()
    }

    /// Spawn every worker, in device order.
    ///
    /// A pool can only be started once. If a spawn fails the error is
    /// returned and workers spawned before it keep running; call
    /// [`WorkerPool::stop`] to reap them.
    pub async fn start(&mut self) -> GpuRunnerResult<()> {
        info!(
            workers = self.slots.len(),
            launcher = self.launcher.name(),
            "Starting workers"
        );

        for slot in self.slots.iter_mut() {
            if slot.status != WorkerStatus::Pending {
                return Err(GpuRunnerError::Runtime(format!(
                    "Worker for device {} was already started",
                    slot.device
                )));
            }

            let mut cmd = self.launcher.command(slot.device, &self.config)?;
            cmd.stdin(Stdio::piped());

            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => {
                    error!(device = %slot.device, error = %e, "Failed to spawn worker process");
                    slot.status = WorkerStatus::Failed;
                    return Err(GpuRunnerError::Runtime(format!(
                        "Failed to spawn worker for device {}: {}",
                        slot.device, e
                    )));
                }
            };

            debug!(device = %slot.device, pid = ?child.id(), "Worker process spawned");

            let stdin = child.stdin.take();
            slot.child = Some(child);
            slot.status = WorkerStatus::Running;
            match stdin {
                Some(pipe) => slot.stop.attach(pipe).await,
                None => {
                    return Err(GpuRunnerError::Runtime(format!(
                        "Worker for device {} has no stdin pipe",
                        slot.device
                    )))
                }
            }
        }

        Ok(())
    }

    /// Set every stop signal, then wait for every spawned worker in device
    /// order.
    ///
    /// Blocks until all of them have exited; there is no timeout, so a worker
    /// stuck inside a device call holds this up indefinitely.
    pub async fn stop(&mut self) -> Vec<WorkerExit> {
        for slot in self.slots.iter_mut() {
            slot.stop.set().await;
            if slot.status == WorkerStatus::Running {
                slot.status = WorkerStatus::Terminating;
            }
        }

        let mut exits = Vec::new();
        for slot in self.slots.iter_mut() {
            let Some(mut child) = slot.child.take() else {
                continue;
            };
            let pid = child.id();

            let exit = match child.wait().await {
                Ok(status) => WorkerExit {
                    device: slot.device,
                    pid,
                    code: status.code(),
                    success: status.success(),
                },
                Err(e) => {
                    error!(device = %slot.device, error = %e, "Failed to wait for worker");
                    WorkerExit {
                        device: slot.device,
                        pid,
                        code: None,
                        success: false,
                    }
                }
            };

            if exit.success {
                slot.status = WorkerStatus::Terminated;
                debug!(device = %slot.device, "Worker exited");
            } else {
                slot.status = WorkerStatus::Failed;
                warn!(device = %slot.device, code = ?exit.code, "Worker exited with failure");
            }
            exits.push(exit);
        }

        exits
    }
}
