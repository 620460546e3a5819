//! Accept loop and per-connection request handling for the daemon's Unix
//! domain socket, mirroring the newline-framed protocol in
//! `forge_supervisor::ipc`.

use crate::registry::Registry;
use forge_supervisor::ipc::{DaemonRequest, DaemonResponse, RunnerInfo};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MAX_MESSAGE_SIZE: usize = 65536;

/// Binds the daemon's Unix domain socket, removing a stale socket file left
/// by a prior, uncleanly-terminated run.
pub fn bind(socket_path: &Path) -> std::io::Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if socket_path.exists() {
        debug!(?socket_path, "bind: removing stale socket file");
        std::fs::remove_file(socket_path)?;
    }
    UnixListener::bind(socket_path)
}

/// Accepts connections until a `Shutdown` request is handled, dispatching
/// each to its own task. `shutdown_tx` is flipped to `true` by the
/// connection that received the request, waking this accept loop.
pub async fn run(listener: UnixListener, registry: Arc<Registry>, shutdown_tx: watch::Sender<bool>) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let registry = Arc::clone(&registry);
                        let shutdown_tx = shutdown_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, registry, shutdown_tx).await {
                                warn!(error = %e, "server: connection handling failed");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "server: accept failed"),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("server: shutdown requested, no longer accepting connections");
                    return;
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    registry: Arc<Registry>,
    shutdown_tx: watch::Sender<bool>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Ok(());
    }
    if line.len() > MAX_MESSAGE_SIZE {
        let response = DaemonResponse::Error { message: "request too large".into() };
        return write_response(&mut writer, &response).await;
    }

    let request: DaemonRequest = match serde_json::from_str(line.trim_end()) {
        Ok(req) => req,
        Err(e) => {
            let response = DaemonResponse::Error { message: format!("malformed request: {e}") };
            return write_response(&mut writer, &response).await;
        }
    };
    debug!(?request, "server: handling request");

    let response = match request {
        DaemonRequest::Ping => DaemonResponse::Pong { version: VERSION.to_string() },
        DaemonRequest::StartLoopRunner { loop_id, config_path, command_path } => {
            start_loop_runner(&registry, loop_id, &config_path, &command_path).await
        }
        DaemonRequest::ListLoopRunners => {
            let runners: Vec<RunnerInfo> = registry.reap_and_list().await;
            DaemonResponse::Runners { runners }
        }
        DaemonRequest::Shutdown => {
            info!("server: shutdown request received");
            let _ = shutdown_tx.send(true);
            DaemonResponse::Ok
        }
    };

    write_response(&mut writer, &response).await
}

async fn start_loop_runner(registry: &Registry, loop_id: String, config_path: &str, command_path: &str) -> DaemonResponse {
    let child = Command::new(command_path)
        .arg("run")
        .arg(&loop_id)
        .arg("--config")
        .arg(config_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match child {
        Ok(child) => {
            let instance_id = registry.insert(loop_id, child).await;
            DaemonResponse::Runner { instance_id, state: "running".to_string() }
        }
        Err(e) => DaemonResponse::Error { message: format!("failed to spawn runner: {e}") },
    }
}

async fn write_response<W: AsyncWriteExt + Unpin>(writer: &mut W, response: &DaemonResponse) -> std::io::Result<()> {
    let mut line =
        serde_json::to_string(response).unwrap_or_else(|_| "{\"type\":\"Error\",\"message\":\"encode failure\"}".into());
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

pub fn cleanup(socket_path: &PathBuf) {
    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(?socket_path, error = %e, "cleanup: failed to remove socket file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_over_the_wire_returns_pong_with_this_crates_version() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        let listener = bind(&socket_path).unwrap();
        let registry = Arc::new(Registry::new());
        let (tx, _rx) = watch::channel(false);
        let server = tokio::spawn(run(listener, registry, tx));

        let client = forge_supervisor::ipc::DaemonClient::new().with_socket_path(socket_path.clone());
        let version = client.ping().await.unwrap();
        assert_eq!(version, VERSION);

        server.abort();
    }

    #[tokio::test]
    async fn start_loop_runner_registers_a_live_process() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        let listener = bind(&socket_path).unwrap();
        let registry = Arc::new(Registry::new());
        let (tx, _rx) = watch::channel(false);
        let server = tokio::spawn(run(listener, Arc::clone(&registry), tx));

        // Trailing args the daemon appends (run/loop_id/--config/path) are
        // simply ignored by a script that sleeps regardless of its argv.
        let script = dir.path().join("runner.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let client = forge_supervisor::ipc::DaemonClient::new().with_socket_path(socket_path.clone());
        let (instance_id, state) = client
            .start_loop_runner("loop-1", "/cfg", script.to_str().unwrap())
            .await
            .unwrap();
        assert!(!instance_id.is_empty());
        assert_eq!(state, "running");

        let runners = client.list_loop_runners().await.unwrap();
        assert_eq!(runners.len(), 1);
        assert_eq!(runners[0].loop_id, "loop-1");

        server.abort();
    }

    #[tokio::test]
    async fn shutdown_request_stops_the_accept_loop() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        let listener = bind(&socket_path).unwrap();
        let registry = Arc::new(Registry::new());
        let (tx, _rx) = watch::channel(false);
        let server = tokio::spawn(run(listener, registry, tx));

        let client = forge_supervisor::ipc::DaemonClient::new().with_socket_path(socket_path.clone());
        client.shutdown().await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), server).await.unwrap().unwrap();
    }
}
