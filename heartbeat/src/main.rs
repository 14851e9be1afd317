//! fwagent heartbeat: reports this host's liveness to the controller
//!
//! Runs the reporter on its own task and stops it through a cancellation
//! token when the process is interrupted.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cli;
mod reporter;

use reporter::HeartbeatReporter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .compact()
        .init();

    let token_prefix: String = args.token.chars().take(8).collect();
    info!("Connecting to backend: {}", args.backend_url);
    info!("Using token: {token_prefix}...");

    let reporter = HeartbeatReporter::new(
        &args.backend_url,
        &args.token,
        &args.node_id,
        Duration::from_secs(args.interval_secs.max(1)),
        args.timeout_secs.map(Duration::from_secs),
    )
    .context("Invalid heartbeat settings")?;
    let reporter = Arc::new(reporter);

    let cancel = CancellationToken::new();
    let worker = {
        let reporter = reporter.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { reporter.run(cancel).await })
    };

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for Ctrl-C: {e}");
            }
            info!("Agent stopped");
            cancel.cancel();
        }
        _ = cancel.cancelled() => {}
    }

    worker.await.context("Heartbeat worker panicked")?;
    Ok(())
}
