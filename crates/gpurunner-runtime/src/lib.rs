//! gpurunner-runtime: Worker processes and the pool that owns them
//!
//! This crate provides the moving parts of a keep-alive run:
//! - Compute kernels that bind to one device (CPU, or CUDA behind the `cuda` feature)
//! - The busy-loop a worker process runs until it is told to stop
//! - The stop latch shared between the pool and each worker process
//! - The process pool that spawns, signals and joins the workers

pub mod kernel;
pub mod launcher;
pub mod pool;
pub mod signal;
pub mod worker;

pub use kernel::{detect_devices, open_kernel, Kernel};
pub use launcher::{Launcher, SelfExecLauncher};
pub use pool::{WorkerExit, WorkerPool, WorkerStatus};
pub use signal::{StopListener, StopSignal};
pub use worker::{run_worker, BusyLoop, Clock, SystemClock};
