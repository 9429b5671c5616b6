//! lokiscaled — evaluate Loki query triggers outside a cluster.
//!
//! # Usage
//!
//! ```text
//! lokiscaled check --config lokiscaled.toml
//! lokiscaled watch --config lokiscaled.toml --interval 30
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::DaemonConfig;

const DEFAULT_FILTER: &str = "info,lokiscale=debug,lokiscaled=debug";

#[derive(Parser)]
#[command(name = "lokiscaled", about = "Loki query scaler", version)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate every trigger once and print one JSON line per trigger.
    Check {
        /// Path to the TOML config.
        #[arg(long)]
        config: PathBuf,
    },
    /// Evaluate every trigger on a fixed interval until Ctrl-C.
    Watch {
        /// Path to the TOML config.
        #[arg(long)]
        config: PathBuf,

        /// Poll interval in seconds; also the per-poll deadline.
        #[arg(long, default_value = "30")]
        interval: u64,
    },
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Check { config } => run_check(config).await,
        Command::Watch { config, interval } => run_watch(config, interval).await,
    }
}

async fn run_check(path: PathBuf) -> anyhow::Result<()> {
    let config = DaemonConfig::from_file(&path)?;
    let lines = commands::check(&config, &CancellationToken::new()).await;

    let mut failed = 0;
    for line in &lines {
        failed += usize::from(line.is_failure());
        println!("{}", serde_json::to_string(line)?);
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} triggers failed", lines.len());
    }
    Ok(())
}

async fn run_watch(path: PathBuf, interval: u64) -> anyhow::Result<()> {
    if interval == 0 {
        anyhow::bail!("--interval must be at least 1 second");
    }
    let config = DaemonConfig::from_file(&path)?;

    // ── Shutdown signal ────────────────────────────────────────

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                    return;
                }
            }
            shutdown.cancel();
        }
    });

    commands::watch(&config, Duration::from_secs(interval), shutdown).await?;
    info!("lokiscaled stopped");
    Ok(())
}
