//! `forge-daemon`: the optional host-local daemon. Owns a Unix domain
//! socket serving `Ping`/`StartLoopRunner`/`ListLoopRunners`/`Shutdown`,
//! and a background sweep that reaps dead runner processes.

use eyre::{Context, Result};
use forge_daemon::{server, sweep, Registry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("forge-daemon starting");

    let socket_path = forge_supervisor::ipc::socket_path();
    let listener = server::bind(&socket_path).context("failed to bind daemon socket")?;
    info!(?socket_path, "listening");

    let registry = Arc::new(Registry::new());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let sweep_handle = tokio::spawn(sweep::run(Arc::clone(&registry), SWEEP_INTERVAL, shutdown_rx));
    let server_handle = tokio::spawn(server::run(listener, registry, shutdown_tx.clone()));

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received, shutting down"),
            _ = sigterm.recv() => warn!("SIGTERM received, shutting down"),
            _ = shutdown_tx.closed() => {}
        }
        let _ = shutdown_tx.send(true);
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(true);
    }

    server_handle.await.context("server task panicked")?;
    let _ = sweep_handle.await;
    server::cleanup(&socket_path);
    info!("forge-daemon stopped");
    Ok(())
}
