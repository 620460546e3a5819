//! Qualitative smart-stop checks: a judge iteration's stdout is contracted
//! to be a single token, `0` (stop) or `1` (continue). Spawning the judge
//! iteration itself requires a `Profile`/command template, which belongs
//! to `forge-runtime`; this module only owns the due-check and the
//! verdict interpretation so it stays testable without a process spawn.

use crate::config::{OnInvalid, QualitativeConfig};
use forge_core::error::{ForgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Stop,
    Continue,
}

/// Interprets a judge iteration's stdout. Any output other than a single
/// `0` or `1` token applies `on_invalid`.
pub fn interpret(cfg: &QualitativeConfig, stdout: &str) -> Result<Verdict> {
    match stdout.trim() {
        "0" => Ok(Verdict::Stop),
        "1" => Ok(Verdict::Continue),
        _ => match cfg.on_invalid {
            OnInvalid::Stop => Ok(Verdict::Stop),
            OnInvalid::Continue => Ok(Verdict::Continue),
        },
    }
}

/// Whether main iteration number `n` (1-based) is due for a judge iteration.
pub fn is_due(cfg: &QualitativeConfig, n: u64) -> bool {
    cfg.every_n != 0 && n % cfg.every_n == 0
}

/// Strict variant used when the caller wants to distinguish "invalid output,
/// but policy said continue" from "a genuine `1`" — e.g. for event logging.
pub fn classify_raw(stdout: &str) -> Result<Verdict> {
    match stdout.trim() {
        "0" => Ok(Verdict::Stop),
        "1" => Ok(Verdict::Continue),
        other => Err(ForgeError::EvaluatorInvalidOutput(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(on_invalid: OnInvalid) -> QualitativeConfig {
        QualitativeConfig {
            every_n: 5,
            prompt: "judge it".into(),
            is_path: false,
            on_invalid,
        }
    }

    #[test]
    fn token_zero_means_stop() {
        assert_eq!(interpret(&cfg(OnInvalid::Continue), "0").unwrap(), Verdict::Stop);
    }

    #[test]
    fn token_one_means_continue() {
        assert_eq!(interpret(&cfg(OnInvalid::Stop), "1\n").unwrap(), Verdict::Continue);
    }

    #[test]
    fn invalid_output_follows_on_invalid_policy() {
        assert_eq!(interpret(&cfg(OnInvalid::Stop), "maybe").unwrap(), Verdict::Stop);
        assert_eq!(
            interpret(&cfg(OnInvalid::Continue), "maybe").unwrap(),
            Verdict::Continue
        );
    }

    #[test]
    fn classify_raw_rejects_anything_but_0_or_1() {
        assert!(classify_raw("0").is_ok());
        assert!(classify_raw("1").is_ok());
        assert!(matches!(
            classify_raw("yes").unwrap_err(),
            ForgeError::EvaluatorInvalidOutput(_)
        ));
    }

    #[test]
    fn is_due_every_n_main_iterations() {
        let c = cfg(OnInvalid::Stop);
        assert!(!is_due(&c, 4));
        assert!(is_due(&c, 5));
        assert!(is_due(&c, 10));
    }
}
