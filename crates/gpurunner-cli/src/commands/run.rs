//! Default command: start a worker per device and wait for shutdown

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use gpurunner_core::{parse_device_list, Backend, DeviceId, RunConfig};
use gpurunner_runtime::{detect_devices, SelfExecLauncher, WorkerPool};
use tracing::{info, warn};

/// Run options; anything left unset falls back to the config file, then to
/// the built-in defaults
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Hours to keep the devices busy (runs until interrupted when omitted)
    #[arg(long)]
    pub hours_to_run: Option<u64>,

    /// Base sleep between compute operations, in seconds [default: 0]
    #[arg(long)]
    pub sleep_time: Option<f64>,

    /// Edge length of the square compute matrix [default: 30000]
    #[arg(long)]
    pub matrix_size: Option<usize>,

    /// Compute backend (cpu or cuda)
    #[arg(long)]
    pub backend: Option<Backend>,

    /// Comma separated device ids to use instead of every detected device
    #[arg(long)]
    pub devices: Option<String>,

    /// Periodically lower utilization for a random while
    #[arg(long)]
    pub enable_jitter: bool,

    /// Minimum seconds between jitter events [default: 30]
    #[arg(long)]
    pub jitter_min_interval: Option<f64>,

    /// Maximum seconds between jitter events [default: 120]
    #[arg(long)]
    pub jitter_max_interval: Option<f64>,

    /// Minimum length of a jitter event, in seconds [default: 5]
    #[arg(long)]
    pub jitter_min_duration: Option<f64>,

    /// Maximum length of a jitter event, in seconds [default: 20]
    #[arg(long)]
    pub jitter_max_duration: Option<f64>,

    /// Sleep multiplier during a jitter event [default: 10]
    #[arg(long)]
    pub jitter_sleep_multiplier: Option<f64>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    /// Layer defaults, the config file and these flags into one validated config
    pub fn resolve(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };

        if self.hours_to_run.is_some() {
            config.hours_to_run = self.hours_to_run;
        }
        if let Some(devices) = &self.devices {
            config.devices = Some(parse_device_list(devices)?);
        }

        let worker = &mut config.worker;
        if let Some(backend) = self.backend {
            worker.backend = backend;
        }
        if let Some(sleep_time) = self.sleep_time {
            worker.sleep_time = sleep_time;
        }
        if let Some(matrix_size) = self.matrix_size {
            worker.matrix_size = matrix_size;
        }

        let jitter = &mut worker.jitter;
        if self.enable_jitter {
            jitter.enabled = true;
        }
        if let Some(v) = self.jitter_min_interval {
            jitter.min_interval = v;
        }
        if let Some(v) = self.jitter_max_interval {
            jitter.max_interval = v;
        }
        if let Some(v) = self.jitter_min_duration {
            jitter.min_duration = v;
        }
        if let Some(v) = self.jitter_max_duration {
            jitter.max_duration = v;
        }
        if let Some(v) = self.jitter_sleep_multiplier {
            jitter.sleep_multiplier = v;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Why the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The requested run time elapsed
    Elapsed,
    /// Interrupted from the terminal
    Interrupted,
    /// Terminated by the system or a job scheduler
    Terminated,
}

/// Start the pool, wait for shutdown, stop the pool
pub async fn run(config: RunConfig, log_level: String) -> Result<()> {
    let mut pool = match prepare(&config, log_level) {
        Ok(pool) => pool,
        Err(e) => return Err(setup_failed(e)),
    };

    match drive(&mut pool, config.run_duration()).await {
        Ok(reason) => {
            info!(reason = ?reason, "Shutting down");
            report(&pool.stop().await);
            println!("The dummy GPU workers are stopped successfully.");
            Ok(())
        }
        Err(e) => {
            report(&pool.stop().await);
            Err(setup_failed(e))
        }
    }
}

/// Pick the devices and build a pool for them; nothing is spawned yet
fn prepare(config: &RunConfig, log_level: String) -> Result<WorkerPool> {
    let backend = config.worker.backend;
    let devices = select_devices(backend, config.devices.as_deref())?;

    info!(
        backend = %backend,
        devices = ?devices,
        sleep_time = config.worker.sleep_time,
        matrix_size = config.worker.matrix_size,
        jitter = config.worker.jitter.enabled,
        "Starting gpurunner v{}",
        env!("CARGO_PKG_VERSION")
    );

    let launcher = Arc::new(SelfExecLauncher::current(log_level)?);
    Ok(WorkerPool::new(devices, config.worker.clone(), launcher))
}

fn setup_failed(e: anyhow::Error) -> anyhow::Error {
    eprintln!("Error starting dummy GPU workers: {:#}", e);
    e
}

async fn drive(pool: &mut WorkerPool, run_for: Option<Duration>) -> Result<ShutdownReason> {
    pool.start().await?;
    match run_for {
        Some(d) => info!("Workers running for {:.1}h", d.as_secs_f64() / 3600.0),
        None => info!("Workers running until interrupted"),
    }
    wait_for_shutdown(run_for).await
}

/// Every detected device, or the explicit subset after checking it exists
fn select_devices(backend: Backend, requested: Option<&[DeviceId]>) -> Result<Vec<DeviceId>> {
    let detected = detect_devices(backend)
        .with_context(|| format!("Failed to enumerate {} devices", backend))?;

    let devices = match requested {
        Some(requested) => {
            for device in requested {
                if !detected.contains(device) {
                    bail!(
                        "Device {} is not available on the {} backend ({} found)",
                        device,
                        backend,
                        detected.len()
                    );
                }
            }
            requested.to_vec()
        }
        None => detected,
    };

    if devices.is_empty() {
        bail!("No {} devices found", backend);
    }
    Ok(devices)
}

/// Resolve when the run time is up or a shutdown signal arrives
pub async fn wait_for_shutdown(run_for: Option<Duration>) -> Result<ShutdownReason> {
    let deadline = async {
        match run_for {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())?.recv().await;
        Ok::<(), std::io::Error>(())
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    tokio::select! {
        _ = deadline => Ok(ShutdownReason::Elapsed),
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for interrupts")?;
            Ok(ShutdownReason::Interrupted)
        }
        res = terminate => {
            res.context("Failed to listen for SIGTERM")?;
            Ok(ShutdownReason::Terminated)
        }
    }
}

fn report(exits: &[gpurunner_runtime::WorkerExit]) {
    let failed = exits.iter().filter(|e| !e.success).count();
    if failed > 0 {
        warn!(
            failed,
            total = exits.len(),
            "Some workers had already failed before shutdown"
        );
    } else {
        info!(workers = exits.len(), "All workers exited");
    }
}
