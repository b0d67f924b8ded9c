//! big-red daemon
//!
//! Serves a status page with a single button. Pressing it streams the
//! output of the source command into the destination command over SSH.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use br_core::config;
use br_daemon::ssh::{load_credentials, SshSessionFactory};
use br_daemon::{server, JobOrchestrator};

/// How long shutdown waits for an aborted run to release its sessions
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "big-red")]
#[command(about = "Trigger and watch a remote dump/restore pipeline")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Status page bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Validate configuration and credentials, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("big-red starting...");

    let config_path = args.config.unwrap_or_else(config::default_config_path);
    let mut app_config = config::load_app_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    if let Some(bind) = args.bind {
        app_config.http.bind_address = bind;
    }

    let key = load_credentials(&app_config.private_key_file)
        .context("Failed to load SSH credentials")?;

    tracing::info!(
        "Pipeline: {} `{}` -> {} `{}`",
        app_config.source.label(),
        app_config.source.command,
        app_config.destination.label(),
        app_config.destination.command
    );

    if args.check {
        tracing::info!("Configuration OK");
        return Ok(());
    }

    let factory = SshSessionFactory::new(key, app_config.connect_timeout);
    let job = JobOrchestrator::new(Arc::new(factory), app_config);
    let bind_addr = job.config().http.bind_address.clone();

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        cancel_clone.cancel();
    });

    server::serve(job.clone(), &bind_addr, cancel).await?;

    if job.abort() {
        tracing::info!("Waiting for the aborted run to settle...");
        if tokio::time::timeout(SHUTDOWN_GRACE, job.wait_idle()).await.is_err() {
            tracing::warn!("Run did not settle within {:?}", SHUTDOWN_GRACE);
        }
    }

    tracing::info!("big-red shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
