//! Hidden `worker` command: the body of one worker process

use anyhow::{Context, Result};
use gpurunner_core::{DeviceId, WorkerConfig};
use gpurunner_runtime::{run_worker, StopListener};
use tracing::debug;

/// Keep `device` busy until the pool sets this worker's stop signal
pub async fn worker(device: DeviceId, settings: &str) -> Result<()> {
    let config: WorkerConfig =
        serde_json::from_str(settings).context("Invalid worker settings")?;
    config.validate()?;

    let stop = StopListener::new();
    let _watcher = stop.watch_stdin();

    // Ctrl-C reaches the whole process group; shutdown is the parent's call
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!(device = %device, "Interrupt ignored, waiting for the stop signal");
        }
    });

    let iterations = tokio::task::spawn_blocking(move || run_worker(device, &config, &stop))
        .await
        .context("Worker loop panicked")?
        .with_context(|| format!("Worker for device {} failed", device))?;

    debug!(device = %device, iterations, "Worker finished");
    Ok(())
}
