//! Stable error taxonomy shared across every forge-* crate.
//!
//! Surfaced to CLI/daemon callers as `{kind, message, hint?}` JSON.

use serde::Serialize;

/// One entry of a loop-reference collision, used by `ErrorKind::Ambiguous`.
pub type Candidate = String;

#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("ambiguous reference matches {0:?}")]
    Ambiguous(Vec<Candidate>),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("runner unavailable: {0}")]
    RunnerUnavailable(String),

    #[error("runner stale: {0}")]
    RunnerStale(String),

    #[error("evaluator timed out after {0}s")]
    EvaluatorTimeout(u64),

    #[error("evaluator produced invalid output: {0}")]
    EvaluatorInvalidOutput(String),

    #[error("mail backend error: {0}")]
    MailBackend(String),

    #[error("lock conflict: held by {holder} until {expires_at} ({reason})")]
    LockConflict {
        holder: String,
        expires_at: String,
        reason: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl ForgeError {
    pub fn kind(&self) -> &'static str {
        match self {
            ForgeError::NotFound(_) => "NotFound",
            ForgeError::Ambiguous(_) => "Ambiguous",
            ForgeError::InvalidState(_) => "InvalidState",
            ForgeError::InvalidArgument(_) => "InvalidArgument",
            ForgeError::Storage(_) => "Storage",
            ForgeError::RunnerUnavailable(_) => "RunnerUnavailable",
            ForgeError::RunnerStale(_) => "RunnerStale",
            ForgeError::EvaluatorTimeout(_) => "EvaluatorTimeout",
            ForgeError::EvaluatorInvalidOutput(_) => "EvaluatorInvalidOutput",
            ForgeError::MailBackend(_) => "MailBackend",
            ForgeError::LockConflict { .. } => "LockConflict",
            ForgeError::Io(_) => "Storage",
            ForgeError::ChannelClosed(_) => "Storage",
        }
    }

    pub fn hint(&self) -> Option<String> {
        match self {
            ForgeError::Ambiguous(candidates) => Some(format!(
                "try a longer prefix; candidates: {}",
                candidates
                    .iter()
                    .take(5)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            _ => None,
        }
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            kind: self.kind().to_string(),
            message: self.to_string(),
            hint: self.hint(),
        }
    }
}

/// The wire shape for `{kind, message, hint?}` as required by the CLI/daemon JSON modes.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

pub type Result<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_hint_lists_up_to_five() {
        let err = ForgeError::Ambiguous(vec!["a".into(), "b".into(), "c".into()]);
        let env = err.to_envelope();
        assert_eq!(env.kind, "Ambiguous");
        assert!(env.hint.unwrap().contains("a, b, c"));
    }

    #[test]
    fn not_found_has_no_hint() {
        let err = ForgeError::NotFound("loop oracle-main".into());
        assert!(err.to_envelope().hint.is_none());
    }
}
