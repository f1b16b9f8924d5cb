//! golypus - Docker container autoscaling daemon.
//!
//! Watches container `create` events, samples Docker stats, clones a
//! container under memory/CPU pressure, and stands up a round-robin
//! reverse proxy in front of the clones.

use anyhow::{Context, Result};
use clap::Parser;
use daemonize::Daemonize;
use tracing::{error, info};

use golypus::cmd;
use golypus::config::Configuration;

#[derive(Parser)]
#[command(name = "golypus")]
#[command(about = "Docker container autoscaling daemon")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "golypus.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if std::path::Path::new(&cli.config).exists() {
        Configuration::load(&cli.config)
            .with_context(|| format!("failed to load configuration from {}", cli.config))?
    } else {
        Configuration::default()
    };

    // Daemonizing must happen before the Tokio runtime starts: the
    // double-fork replaces the process image and would otherwise strand
    // the runtime's worker threads in the parent.
    if config.daemonize {
        let stdout = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file)
            .with_context(|| format!("failed to open log file {}", config.log_file))?;
        let stderr = stdout
            .try_clone()
            .context("failed to duplicate log file handle")?;

        Daemonize::new()
            .pid_file(&config.pid_file)
            .working_directory(".")
            .stdout(stdout)
            .stderr(stderr)
            .start()
            .context("failed to daemonize")?;
    }

    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("golypus={}", log_level).into()),
        )
        .init();

    info!("starting golypus v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(async {
        if let Err(e) = cmd::root::run(&cli.config).await {
            error!("daemon error: {}", e);
            std::process::exit(1);
        }
    });

    Ok(())
}
