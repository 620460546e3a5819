//! Spawns the agent command template for one iteration and captures its
//! output to the loop's log file. A `kill_now` preemption sends the child a
//! termination signal, gives it a grace window, then forces termination.

use crate::profile::{Profile, PromptMode};
use forge_core::error::{ForgeError, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::watch;

pub const KILL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct AgentOutcome {
    pub exit_code: Option<i32>,
    pub killed: bool,
}

/// Runs `profile.command_template` with `env_vars` set, delivering `prompt`
/// via stdin or as an environment variable per `profile.prompt_mode`
/// (`FORGE_PROMPT_CONTENT` is always present in `env_vars` already; stdin
/// mode additionally writes the prompt to the child's stdin). Output is
/// redirected into `log_file`, opened by the caller in append mode.
pub async fn run(
    profile: &Profile,
    env_vars: &[(String, String)],
    prompt: &str,
    cwd: &str,
    log_file: std::fs::File,
    mut kill_rx: watch::Receiver<bool>,
) -> Result<AgentOutcome> {
    let parts = shlex::split(&profile.command_template)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ForgeError::InvalidArgument(format!("unparseable command template: {}", profile.command_template)))?;

    let stdout_file = log_file.try_clone().map_err(ForgeError::Io)?;
    let stderr_file = log_file;

    let mut command = Command::new(&parts[0]);
    command
        .args(&parts[1..])
        .current_dir(cwd)
        .envs(env_vars.iter().cloned())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file));

    if let Some(auth_home) = &profile.auth_home {
        command.env("HOME", auth_home);
    }
    if profile.prompt_mode == PromptMode::Stdin {
        command.stdin(Stdio::piped());
    } else {
        command.stdin(Stdio::null());
    }

    let mut child = command.spawn().map_err(ForgeError::Io)?;

    if profile.prompt_mode == PromptMode::Stdin {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await.map_err(ForgeError::Io)?;
        }
    }

    let pid = child.id();

    tokio::select! {
        result = child.wait() => {
            let status = result.map_err(ForgeError::Io)?;
            Ok(AgentOutcome { exit_code: status.code(), killed: false })
        }
        _ = wait_for_kill(&mut kill_rx) => {
            terminate_with_grace(&mut child, pid).await
        }
    }
}

/// Runs a judge iteration: same command template and prompt delivery as a
/// main iteration, but output is captured rather than streamed to the log
/// file, since the caller needs the raw stdout token to interpret a verdict.
pub async fn run_capturing(profile: &Profile, env_vars: &[(String, String)], prompt: &str, cwd: &str) -> Result<(Option<i32>, String, String)> {
    let parts = shlex::split(&profile.command_template)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ForgeError::InvalidArgument(format!("unparseable command template: {}", profile.command_template)))?;

    let mut command = Command::new(&parts[0]);
    command
        .args(&parts[1..])
        .current_dir(cwd)
        .envs(env_vars.iter().cloned())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(auth_home) = &profile.auth_home {
        command.env("HOME", auth_home);
    }
    if profile.prompt_mode == PromptMode::Stdin {
        command.stdin(Stdio::piped());
    } else {
        command.stdin(Stdio::null());
    }

    let mut child = command.spawn().map_err(ForgeError::Io)?;
    if profile.prompt_mode == PromptMode::Stdin {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await.map_err(ForgeError::Io)?;
        }
    }

    let output = child.wait_with_output().await.map_err(ForgeError::Io)?;
    Ok((
        output.status.code(),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    ))
}

async fn wait_for_kill(kill_rx: &mut watch::Receiver<bool>) {
    loop {
        if *kill_rx.borrow() {
            return;
        }
        if kill_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn terminate_with_grace(child: &mut tokio::process::Child, pid: Option<u32>) -> Result<AgentOutcome> {
    if let Some(pid) = pid {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }

    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(result) => {
            let status = result.map_err(ForgeError::Io)?;
            Ok(AgentOutcome { exit_code: status.code(), killed: true })
        }
        Err(_) => {
            child.kill().await.map_err(ForgeError::Io)?;
            let status = child.wait().await.map_err(ForgeError::Io)?;
            Ok(AgentOutcome { exit_code: status.code(), killed: true })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(template: &str) -> Profile {
        Profile::local_shell("p", template)
    }

    #[tokio::test]
    async fn successful_command_reports_exit_code_zero() {
        let (_tx, rx) = watch::channel(false);
        let dir = tempfile::tempdir().unwrap();
        let log = std::fs::File::create(dir.path().join("log")).unwrap();
        let outcome = run(&profile("true"), &[], "prompt", dir.path().to_str().unwrap(), log, rx)
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert!(!outcome.killed);
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_without_error() {
        let (_tx, rx) = watch::channel(false);
        let dir = tempfile::tempdir().unwrap();
        let log = std::fs::File::create(dir.path().join("log")).unwrap();
        let outcome = run(&profile("false"), &[], "prompt", dir.path().to_str().unwrap(), log, rx)
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[tokio::test]
    async fn run_capturing_returns_the_judges_stdout_token() {
        let dir = tempfile::tempdir().unwrap();
        let (code, stdout, _stderr) =
            run_capturing(&profile("echo 0"), &[], "judge prompt", dir.path().to_str().unwrap())
                .await
                .unwrap();
        assert_eq!(code, Some(0));
        assert_eq!(stdout.trim(), "0");
    }

    #[tokio::test]
    async fn kill_now_terminates_a_long_running_child() {
        let (tx, rx) = watch::channel(false);
        let dir = tempfile::tempdir().unwrap();
        let log = std::fs::File::create(dir.path().join("log")).unwrap();
        let sleep_profile = profile("sleep 30");
        let run_fut = run(&sleep_profile, &[], "prompt", dir.path().to_str().unwrap(), log, rx);
        tokio::pin!(run_fut);

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), run_fut).await.unwrap().unwrap();
        assert!(outcome.killed);
    }
}
