//! Daemon RPC protocol and client: newline-framed JSON requests/responses
//! over a Unix domain socket.

use forge_core::error::{ForgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub const MAX_MESSAGE_SIZE: usize = 65536;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn socket_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("forge")
        .join("daemon.sock")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonRequest {
    StartLoopRunner {
        loop_id: String,
        config_path: String,
        command_path: String,
    },
    ListLoopRunners,
    Ping,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerInfo {
    pub loop_id: String,
    pub instance_id: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonResponse {
    Runner { instance_id: String, state: String },
    Runners { runners: Vec<RunnerInfo> },
    Pong { version: String },
    Ok,
    Error { message: String },
}

#[derive(Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self {
            socket_path: socket_path(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl DaemonClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_socket_path(mut self, path: PathBuf) -> Self {
        self.socket_path = path;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    pub async fn ping(&self) -> Result<String> {
        match self.send(DaemonRequest::Ping).await? {
            DaemonResponse::Pong { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    pub async fn start_loop_runner(
        &self,
        loop_id: &str,
        config_path: &str,
        command_path: &str,
    ) -> Result<(String, String)> {
        let req = DaemonRequest::StartLoopRunner {
            loop_id: loop_id.to_string(),
            config_path: config_path.to_string(),
            command_path: command_path.to_string(),
        };
        match self.send(req).await? {
            DaemonResponse::Runner { instance_id, state } => Ok((instance_id, state)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_loop_runners(&self) -> Result<Vec<RunnerInfo>> {
        match self.send(DaemonRequest::ListLoopRunners).await? {
            DaemonResponse::Runners { runners } => Ok(runners),
            other => Err(unexpected(other)),
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        match self.send(DaemonRequest::Shutdown).await? {
            DaemonResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn send(&self, request: DaemonRequest) -> Result<DaemonResponse> {
        let connect = UnixStream::connect(&self.socket_path);
        let stream = tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| ForgeError::RunnerUnavailable("daemon connect timed out".into()))?
            .map_err(|e| ForgeError::RunnerUnavailable(format!("daemon unreachable: {e}")))?;
        send_on_stream(stream, request, self.timeout).await
    }
}

async fn send_on_stream(
    mut stream: UnixStream,
    request: DaemonRequest,
    timeout: Duration,
) -> Result<DaemonResponse> {
    let mut line = serde_json::to_string(&request).map_err(|e| ForgeError::RunnerUnavailable(e.to_string()))?;
    line.push('\n');

    tokio::time::timeout(timeout, stream.write_all(line.as_bytes()))
        .await
        .map_err(|_| ForgeError::RunnerUnavailable("daemon write timed out".into()))?
        .map_err(ForgeError::Io)?;

    let (read_half, _write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut response_line = String::new();

    let bytes_read = tokio::time::timeout(timeout, reader.read_line(&mut response_line))
        .await
        .map_err(|_| ForgeError::RunnerUnavailable("daemon response timed out".into()))?
        .map_err(ForgeError::Io)?;

    if bytes_read == 0 {
        return Err(ForgeError::RunnerUnavailable("daemon closed connection".into()));
    }
    if response_line.len() > MAX_MESSAGE_SIZE {
        return Err(ForgeError::RunnerUnavailable("daemon response too large".into()));
    }

    serde_json::from_str(response_line.trim_end())
        .map_err(|e| ForgeError::RunnerUnavailable(format!("malformed daemon response: {e}")))
}

fn unexpected(response: DaemonResponse) -> ForgeError {
    match response {
        DaemonResponse::Error { message } => ForgeError::RunnerUnavailable(message),
        other => ForgeError::RunnerUnavailable(format!("unexpected daemon response: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_ends_with_forge_daemon_sock() {
        let path = socket_path();
        assert_eq!(path.file_name().unwrap(), "daemon.sock");
        assert_eq!(path.parent().unwrap().file_name().unwrap(), "forge");
    }

    #[test]
    fn request_round_trips_through_json() {
        let req = DaemonRequest::StartLoopRunner {
            loop_id: "l1".into(),
            config_path: "/cfg".into(),
            command_path: "/bin/forge".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: DaemonRequest = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, DaemonRequest::StartLoopRunner { .. }));
    }

    #[test]
    fn response_round_trips_through_json() {
        let resp = DaemonResponse::Runners {
            runners: vec![RunnerInfo {
                loop_id: "l1".into(),
                instance_id: "i1".into(),
                state: "running".into(),
            }],
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: DaemonResponse = serde_json::from_str(&json).unwrap();
        match back {
            DaemonResponse::Runners { runners } => assert_eq!(runners.len(), 1),
            _ => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn ping_against_missing_socket_is_runner_unavailable() {
        let client = DaemonClient::new().with_socket_path(PathBuf::from("/tmp/forge-test-no-such.sock"));
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, ForgeError::RunnerUnavailable(_)));
    }
}
