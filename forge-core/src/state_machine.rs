//! Canonical loop state machine: legal transitions between `starting`,
//! `running`, `idle`, `waiting_permission`, `cooldown`, `error`, and `stopped`.

use crate::error::{ForgeError, Result};
use crate::model::LoopState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    SpawnOk,
    IterationBegin,
    IterationEndClean,
    IterationEndBusyNext,
    PauseBegin,
    PauseEnd,
    ApprovalNeeded,
    ApprovalGranted,
    StopRequested,
    IterationFailed,
    ResumeOk,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Trigger::SpawnOk => "spawn_ok",
            Trigger::IterationBegin => "iteration_begin",
            Trigger::IterationEndClean => "iteration_end_clean",
            Trigger::IterationEndBusyNext => "iteration_end_busy_next",
            Trigger::PauseBegin => "pause_begin",
            Trigger::PauseEnd => "pause_end",
            Trigger::ApprovalNeeded => "approval_needed",
            Trigger::ApprovalGranted => "approval_granted",
            Trigger::StopRequested => "stop_requested",
            Trigger::IterationFailed => "iteration_failed",
            Trigger::ResumeOk => "resume_ok",
        };
        write!(f, "{s}")
    }
}

/// Returns the destination state for `trigger` fired from `from`, or an
/// `InvalidState` error if the transition is illegal.
pub fn apply(from: LoopState, trigger: Trigger) -> Result<LoopState> {
    use LoopState::*;
    use Trigger::*;

    let to = match (trigger, from) {
        (SpawnOk, Stopped) | (SpawnOk, Error) => Starting,
        (IterationBegin, Starting) => Running,
        (IterationEndClean, Running) => Idle,
        (IterationEndBusyNext, Idle) => Running,
        (PauseBegin, Idle) => Cooldown,
        (PauseEnd, Cooldown) => Idle,
        (ApprovalNeeded, Running) => WaitingPermission,
        (ApprovalGranted, WaitingPermission) => Running,
        (StopRequested, s) if s != Stopped => Stopped,
        (IterationFailed, Running) => Error,
        (ResumeOk, Stopped) | (ResumeOk, Error) => Starting,
        _ => {
            return Err(ForgeError::InvalidState(format!(
                "trigger {trigger} is not legal from state {from}"
            )));
        }
    };

    Ok(to)
}

/// `resume` is only legal from `stopped` or `error`.
pub fn require_resumable(state: LoopState) -> Result<()> {
    match state {
        LoopState::Stopped | LoopState::Error => Ok(()),
        other => Err(ForgeError::InvalidState(format!(
            "resume requires stopped|error, loop is {other}"
        ))),
    }
}

/// `clean` only removes loops in `stopped|error`.
pub fn require_cleanable(state: LoopState) -> Result<()> {
    match state {
        LoopState::Stopped | LoopState::Error => Ok(()),
        other => Err(ForgeError::InvalidState(format!(
            "clean requires stopped|error, loop is {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LoopState::*;

    #[test]
    fn full_happy_path() {
        let mut state = Stopped;
        for (trigger, expected) in [
            (Trigger::SpawnOk, Starting),
            (Trigger::IterationBegin, Running),
            (Trigger::IterationEndClean, Idle),
            (Trigger::PauseBegin, Cooldown),
            (Trigger::PauseEnd, Idle),
            (Trigger::IterationEndBusyNext, Running),
            (Trigger::ApprovalNeeded, WaitingPermission),
            (Trigger::ApprovalGranted, Running),
            (Trigger::StopRequested, Stopped),
        ] {
            state = apply(state, trigger).unwrap();
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn illegal_transition_is_invalid_state() {
        let err = apply(Idle, Trigger::IterationFailed).unwrap_err();
        assert!(matches!(err, ForgeError::InvalidState(_)));
    }

    #[test]
    fn stop_requested_legal_from_any_non_stopped_state() {
        for from in [Starting, Running, Idle, WaitingPermission, Cooldown, Error] {
            assert_eq!(apply(from, Trigger::StopRequested).unwrap(), Stopped);
        }
        assert!(apply(Stopped, Trigger::StopRequested).is_err());
    }

    #[test]
    fn resume_only_from_stopped_or_error() {
        assert!(require_resumable(Stopped).is_ok());
        assert!(require_resumable(Error).is_ok());
        assert!(require_resumable(Running).is_err());
    }

    #[test]
    fn iteration_failed_sets_error_from_running() {
        assert_eq!(apply(Running, Trigger::IterationFailed).unwrap(), Error);
    }
}
