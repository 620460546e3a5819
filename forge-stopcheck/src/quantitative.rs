//! Quantitative smart-stop checks: run a shell command, evaluate its
//! exit code / stdout / stderr against configured criteria.

use crate::config::{Decision, OutputMode, QuantitativeConfig};
use forge_core::error::{ForgeError, Result};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub matched: bool,
}

/// Runs `cfg.cmd` in `cwd` via `sh -c`, bounded by `cfg.timeout_seconds`
/// (0 = no timeout), and evaluates the match predicate.
pub async fn run(cfg: &QuantitativeConfig, cwd: &Path) -> Result<CheckOutcome> {
    let start = Instant::now();
    let run_once = Command::new("sh").arg("-c").arg(&cfg.cmd).current_dir(cwd).output();

    let output = if cfg.timeout_seconds > 0 {
        tokio::time::timeout(Duration::from_secs(cfg.timeout_seconds), run_once)
            .await
            .map_err(|_| ForgeError::EvaluatorTimeout(cfg.timeout_seconds))?
            .map_err(ForgeError::Io)?
    } else {
        run_once.await.map_err(ForgeError::Io)?
    };

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let matched = evaluate(cfg, exit_code, &stdout, &stderr)?;

    Ok(CheckOutcome {
        exit_code,
        stdout,
        stderr,
        duration_ms: start.elapsed().as_millis() as u64,
        matched,
    })
}

/// AND of every configured criterion; defaults to "exit code 0" when
/// nothing else is configured.
fn evaluate(cfg: &QuantitativeConfig, exit_code: i32, stdout: &str, stderr: &str) -> Result<bool> {
    let has_any_criterion = !cfg.exit_codes.is_empty()
        || cfg.stdout_mode != OutputMode::Any
        || cfg.stderr_mode != OutputMode::Any
        || cfg.stdout_regex.is_some()
        || cfg.stderr_regex.is_some();

    if !has_any_criterion {
        return Ok(exit_code == 0);
    }

    let mut matched = true;

    if !cfg.exit_codes.is_empty() {
        let in_set = cfg.exit_codes.contains(&exit_code);
        matched &= if cfg.exit_invert { !in_set } else { in_set };
    }

    matched &= match cfg.stdout_mode {
        OutputMode::Any => true,
        OutputMode::Empty => stdout.trim().is_empty(),
        OutputMode::Nonempty => !stdout.trim().is_empty(),
    };

    matched &= match cfg.stderr_mode {
        OutputMode::Any => true,
        OutputMode::Empty => stderr.trim().is_empty(),
        OutputMode::Nonempty => !stderr.trim().is_empty(),
    };

    if let Some(pattern) = &cfg.stdout_regex {
        let re = regex::Regex::new(pattern)
            .map_err(|e| ForgeError::InvalidArgument(format!("bad stdout_regex: {e}")))?;
        matched &= re.is_match(stdout);
    }

    if let Some(pattern) = &cfg.stderr_regex {
        let re = regex::Regex::new(pattern)
            .map_err(|e| ForgeError::InvalidArgument(format!("bad stderr_regex: {e}")))?;
        matched &= re.is_match(stderr);
    }

    Ok(matched)
}

/// Whether a matched check should halt the loop.
pub fn should_stop(cfg: &QuantitativeConfig, outcome: &CheckOutcome) -> bool {
    outcome.matched && cfg.decision == Decision::Stop
}

/// Whether iteration number `n` (1-based, global for the loop) is due for
/// this check at phase `phase`.
pub fn is_due(cfg: &QuantitativeConfig, n: u64, phase: crate::config::When) -> bool {
    if cfg.every_n == 0 || n % cfg.every_n != 0 {
        return false;
    }
    matches!(
        (cfg.when, phase),
        (crate::config::When::Both, _)
            | (crate::config::When::Before, crate::config::When::Before)
            | (crate::config::When::After, crate::config::When::After)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::When;

    fn base_cfg(cmd: &str) -> QuantitativeConfig {
        QuantitativeConfig {
            cmd: cmd.to_string(),
            every_n: 1,
            when: When::After,
            decision: Decision::Stop,
            exit_codes: vec![],
            exit_invert: false,
            stdout_mode: OutputMode::Any,
            stderr_mode: OutputMode::Any,
            stdout_regex: None,
            stderr_regex: None,
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn default_criterion_matches_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = base_cfg("exit 0");
        let outcome = run(&cfg, dir.path()).await.unwrap();
        assert!(outcome.matched);
        assert!(should_stop(&cfg, &outcome));
    }

    #[tokio::test]
    async fn default_criterion_does_not_match_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = base_cfg("exit 7");
        let outcome = run(&cfg, dir.path()).await.unwrap();
        assert!(!outcome.matched);
    }

    #[tokio::test]
    async fn stdout_regex_and_exit_code_combine_with_and() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_cfg("echo all-tests-passed; exit 0");
        cfg.exit_codes = vec![0];
        cfg.stdout_regex = Some("all-tests-passed".into());
        let outcome = run(&cfg, dir.path()).await.unwrap();
        assert!(outcome.matched);
    }

    #[tokio::test]
    async fn exit_invert_negates_exit_code_predicate() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_cfg("exit 1");
        cfg.exit_codes = vec![0];
        cfg.exit_invert = true;
        let outcome = run(&cfg, dir.path()).await.unwrap();
        assert!(outcome.matched);
    }

    #[tokio::test]
    async fn timeout_is_surfaced_as_evaluator_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_cfg("sleep 2");
        cfg.timeout_seconds = 1;
        let err = run(&cfg, dir.path()).await.unwrap_err();
        assert!(matches!(err, ForgeError::EvaluatorTimeout(1)));
    }

    #[test]
    fn is_due_respects_every_n_and_phase() {
        let mut cfg = base_cfg("true");
        cfg.every_n = 3;
        cfg.when = When::After;
        assert!(!is_due(&cfg, 2, When::After));
        assert!(is_due(&cfg, 3, When::After));
        assert!(!is_due(&cfg, 3, When::Before));
    }

    #[test]
    fn is_due_both_matches_either_phase() {
        let mut cfg = base_cfg("true");
        cfg.every_n = 1;
        cfg.when = When::Both;
        assert!(is_due(&cfg, 1, When::Before));
        assert!(is_due(&cfg, 1, When::After));
    }
}
