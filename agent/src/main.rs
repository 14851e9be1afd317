//! fwagent: remote firewall management agent
//!
//! Exposes an HTTP API that turns rule requests into iptables invocations
//! on this host. Liveness reporting lives in the separate heartbeat binary.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod executor;
mod rules;

#[cfg(test)]
mod testing;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .compact()
        .init();

    info!("fwagent starting...");

    let config = config::load_config().context("Failed to load configuration")?;
    let addr = config.bind_addr();
    info!(
        "Agent {} (controller: {}, token set: {}, sudo: {})",
        config.agent.name,
        config.agent.controller_url,
        !config.agent.token.is_empty(),
        config.executor.use_sudo
    );

    let executor = executor::RuleExecutor::new(config.executor.clone());
    let state = api::AppState::new(config, executor);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("fwagent API listening on http://{addr}");

    api::serve(listener, state, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("fwagent stopped");
    Ok(())
}
