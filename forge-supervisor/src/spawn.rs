//! Spawn-owner resolution and local process spawning.

use forge_core::error::{ForgeError, Result};
use std::path::Path;
use std::process::Stdio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOwner {
    Local,
    Daemon,
    Auto,
}

impl std::str::FromStr for SpawnOwner {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "local" => SpawnOwner::Local,
            "daemon" => SpawnOwner::Daemon,
            "auto" => SpawnOwner::Auto,
            other => return Err(format!("unknown spawn owner: {other}")),
        })
    }
}

impl std::fmt::Display for SpawnOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SpawnOwner::Local => "local",
            SpawnOwner::Daemon => "daemon",
            SpawnOwner::Auto => "auto",
        };
        write!(f, "{s}")
    }
}

/// Resolves the effective spawn owner: an unspecified owner defaults to
/// local rather than probing for a daemon.
pub fn resolve(requested: Option<SpawnOwner>) -> SpawnOwner {
    requested.unwrap_or(SpawnOwner::Local)
}

/// Outcome of a successful spawn, to be written into `loop.metadata`.
#[derive(Debug, Clone)]
pub struct SpawnResult {
    pub owner: SpawnOwner,
    pub instance_id: String,
}

/// Forks a detached child of `binary_path` running `run <loop_id>`,
/// redirecting stdout/stderr to `log_path` (append mode, matching the
/// per-loop append-only log file contract).
pub fn spawn_local(binary_path: &Path, loop_id: &str, log_path: &Path) -> Result<SpawnResult> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(ForgeError::Io)?;
    let log_file_err = log_file.try_clone().map_err(ForgeError::Io)?;

    let child = std::process::Command::new(binary_path)
        .arg("run")
        .arg(loop_id)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_file_err))
        .spawn()
        .map_err(ForgeError::Io)?;

    Ok(SpawnResult {
        owner: SpawnOwner::Local,
        instance_id: child.id().to_string(),
    })
}

/// Used only by tests that want a log file handle without a real spawn.
#[cfg(test)]
fn touch(path: &Path) {
    use std::fs::File;
    File::create(path).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_implicit_none_defaults_to_local() {
        assert_eq!(resolve(None), SpawnOwner::Local);
    }

    #[test]
    fn resolve_explicit_auto_stays_auto() {
        assert_eq!(resolve(Some(SpawnOwner::Auto)), SpawnOwner::Auto);
    }

    #[test]
    fn resolve_explicit_daemon_stays_daemon() {
        assert_eq!(resolve(Some(SpawnOwner::Daemon)), SpawnOwner::Daemon);
    }

    #[test]
    fn spawn_local_runs_the_configured_binary_and_writes_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("loop.log");
        touch(&log_path);
        let result = spawn_local(Path::new("/bin/true"), "loop-1", &log_path).unwrap();
        assert_eq!(result.owner, SpawnOwner::Local);
        assert!(!result.instance_id.is_empty());
    }
}
