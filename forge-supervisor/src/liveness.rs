//! Liveness reconciliation: decide whether a `running` loop's
//! recorded runner is actually still alive, branching the way a session
//! reconciler does between "alive and running", "alive but not running",
//! and "gone".

use forge_core::model::RunnerOwner;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonReachability {
    Unreachable,
    Reachable { instance_running: bool },
}

#[derive(Debug, Clone)]
pub struct ReconcileInput {
    pub runner_owner: Option<RunnerOwner>,
    pub pid_alive: Option<bool>,
    pub daemon: DaemonReachability,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Nothing to do: either the runner is confirmed alive, or the
    /// daemon-owned/daemon-unreachable case leaves the outcome ambiguous.
    NoAction,
    /// Mark the loop `stopped` with `last_error = "stale_runner"` and
    /// record this metadata under `runner_liveness`.
    MarkStale(RunnerLivenessRecord),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunnerLivenessRecord {
    pub pid_alive: bool,
    pub daemon_runner_alive: Option<bool>,
    pub reconciled_at: String,
    pub reason: String,
}

/// Pure decision function; the caller supplies already-gathered liveness
/// signals and persists the outcome.
pub fn reconcile(input: &ReconcileInput, now: &str) -> ReconcileOutcome {
    let pid_alive = input.pid_alive.unwrap_or(false);
    if pid_alive {
        return ReconcileOutcome::NoAction;
    }

    match (input.runner_owner, input.daemon) {
        // Daemon-owned, daemon unreachable: ambiguous, do not reconcile.
        (Some(RunnerOwner::Daemon), DaemonReachability::Unreachable) => ReconcileOutcome::NoAction,

        // Daemon confirms the instance is not running: stale regardless of ownership.
        (_, DaemonReachability::Reachable { instance_running: false }) => {
            ReconcileOutcome::MarkStale(RunnerLivenessRecord {
                pid_alive: false,
                daemon_runner_alive: Some(false),
                reconciled_at: now.to_string(),
                reason: "pid dead and daemon confirms runner not running".into(),
            })
        }

        // Daemon confirms the instance IS running even though our PID probe
        // failed (e.g. locally-recorded PID was wrong) — do not reconcile.
        (_, DaemonReachability::Reachable { instance_running: true }) => ReconcileOutcome::NoAction,

        // Not daemon-owned, daemon reachability unknown/unreachable: stale.
        (Some(RunnerOwner::Local) | None, DaemonReachability::Unreachable) => {
            ReconcileOutcome::MarkStale(RunnerLivenessRecord {
                pid_alive: false,
                daemon_runner_alive: None,
                reconciled_at: now.to_string(),
                reason: "pid dead, loop is not daemon-owned, daemon reachability unknown".into(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alive_pid_never_reconciles() {
        let input = ReconcileInput {
            runner_owner: Some(RunnerOwner::Local),
            pid_alive: Some(true),
            daemon: DaemonReachability::Unreachable,
        };
        assert_eq!(reconcile(&input, "t"), ReconcileOutcome::NoAction);
    }

    #[test]
    fn daemon_owned_unreachable_daemon_is_not_reconciled() {
        let input = ReconcileInput {
            runner_owner: Some(RunnerOwner::Daemon),
            pid_alive: Some(false),
            daemon: DaemonReachability::Unreachable,
        };
        assert_eq!(reconcile(&input, "t"), ReconcileOutcome::NoAction);
    }

    #[test]
    fn local_owned_dead_pid_unreachable_daemon_marks_stale() {
        let input = ReconcileInput {
            runner_owner: Some(RunnerOwner::Local),
            pid_alive: Some(false),
            daemon: DaemonReachability::Unreachable,
        };
        assert!(matches!(reconcile(&input, "t"), ReconcileOutcome::MarkStale(_)));
    }

    #[test]
    fn daemon_confirms_not_running_marks_stale_even_without_pid_recorded() {
        let input = ReconcileInput {
            runner_owner: Some(RunnerOwner::Daemon),
            pid_alive: None,
            daemon: DaemonReachability::Reachable { instance_running: false },
        };
        assert!(matches!(reconcile(&input, "t"), ReconcileOutcome::MarkStale(_)));
    }

    #[test]
    fn daemon_confirms_running_overrides_dead_pid_probe() {
        let input = ReconcileInput {
            runner_owner: Some(RunnerOwner::Daemon),
            pid_alive: Some(false),
            daemon: DaemonReachability::Reachable { instance_running: true },
        };
        assert_eq!(reconcile(&input, "t"), ReconcileOutcome::NoAction);
    }
}
