//! gpurunner CLI
//!
//! Keeps every accelerator device busy until the run time is up or the
//! process is interrupted. Also hosts the hidden `worker` entry that each
//! worker process is started with.

mod commands;

use clap::{Parser, Subcommand};
use gpurunner_core::DeviceId;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::commands::RunArgs;

/// gpurunner - keep accelerator devices busy so the scheduler leaves them alone
#[derive(Parser, Debug)]
#[command(name = "gpurunner")]
#[command(version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(flatten)]
    run: RunArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the busy-loop for one device (started by the pool)
    #[command(hide = true)]
    Worker {
        /// Device index to bind
        #[arg(long)]
        device: u32,

        /// Worker settings as JSON
        #[arg(long)]
        settings: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli {
        run,
        log_level,
        verbose,
        command,
    } = Cli::parse();

    let level_override = log_level.or_else(|| verbose.then(|| "debug".to_string()));

    match command {
        Some(Commands::Worker { device, settings }) => {
            init_logging(level_override.as_deref().unwrap_or("info"));
            commands::worker(DeviceId(device), &settings).await
        }
        None => {
            let config = run.resolve()?;
            let level = level_override.unwrap_or_else(|| config.logging.level.clone());
            init_logging(&level);
            commands::run(config, level).await
        }
    }
}

/// Log to stderr; `RUST_LOG` wins over the configured level when set
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
