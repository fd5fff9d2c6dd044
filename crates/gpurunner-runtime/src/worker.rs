//! Worker busy-loop
//!
//! Runs inside a dedicated worker process: binds one device, then alternates
//! a compute step with a sleep until the stop listener is set. The stop
//! listener is checked once per iteration, so a worker may finish one more
//! compute + sleep after the stop was requested.

use std::time::{Duration, Instant};

use gpurunner_core::{DeviceId, GpuRunnerResult, JitterSchedule, JitterTransition, WorkerConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::kernel::{open_kernel, Kernel};
use crate::signal::StopListener;

/// Time source for the loop
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&mut self, duration: Duration);
}

/// Wall clock with a real blocking sleep
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Bind `device`, then keep it busy until `stop` is set.
///
/// Returns the number of completed iterations. Kernel faults propagate and
/// end the worker; nothing is retried.
pub fn run_worker(
    device: DeviceId,
    config: &WorkerConfig,
    stop: &StopListener,
) -> GpuRunnerResult<u64> {
    let kernel = open_kernel(config.backend, device, config.matrix_size)?;
    debug!(
        device = %device,
        backend = kernel.name(),
        matrix_size = config.matrix_size,
        "Device bound"
    );
    BusyLoop::new(kernel, config).run(stop)
}

/// Compute + sleep loop for one device
pub struct BusyLoop<C = SystemClock, R = StdRng> {
    kernel: Box<dyn Kernel>,
    base_sleep: Duration,
    schedule: JitterSchedule,
    clock: C,
    rng: R,
}

impl BusyLoop {
    pub fn new(kernel: Box<dyn Kernel>, config: &WorkerConfig) -> Self {
        Self::with_clock(kernel, config, SystemClock, StdRng::from_os_rng())
    }
}

impl<C: Clock, R: Rng> BusyLoop<C, R> {
    pub fn with_clock(kernel: Box<dyn Kernel>, config: &WorkerConfig, clock: C, rng: R) -> Self {
        Self {
            kernel,
            base_sleep: config.base_sleep(),
            schedule: JitterSchedule::new(config.jitter.clone()),
            clock,
            rng,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.kernel.device()
    }

    pub fn schedule(&self) -> &JitterSchedule {
        &self.schedule
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Loop until `stop` is set
    pub fn run(&mut self, stop: &StopListener) -> GpuRunnerResult<u64> {
        let device = self.device();
        info!(device = %device, "Running");

        if self.schedule.is_enabled() {
            let now = self.clock.now();
            let delay = self.schedule.schedule(now, &mut self.rng);
            info!(device = %device, "Next jitter in {:.1}s", delay.as_secs_f64());
        }

        let mut iterations = 0u64;
        while !stop.is_set() {
            self.iterate()?;
            iterations += 1;
        }

        info!(device = %device, iterations, "Stopped");
        Ok(iterations)
    }

    /// One compute step followed by one sleep. Returns the time slept.
    pub fn iterate(&mut self) -> GpuRunnerResult<Duration> {
        self.kernel.step()?;

        let now = self.clock.now();
        let step = self.schedule.step(self.base_sleep, now, &mut self.rng);
        for transition in &step.transitions {
            report(self.kernel.device(), transition);
        }

        self.clock.sleep(step.sleep);
        Ok(step.sleep)
    }
}

fn report(device: DeviceId, transition: &JitterTransition) {
    match *transition {
        JitterTransition::Scheduled { delay } => {
            info!(device = %device, "Next jitter in {:.1}s", delay.as_secs_f64())
        }
        JitterTransition::Started { duration } => {
            info!(device = %device, "Jitter started for {:.1}s", duration.as_secs_f64())
        }
        JitterTransition::Ended { next_in } => {
            info!(device = %device, "Jitter ended, next in {:.1}s", next_in.as_secs_f64())
        }
    }
}
