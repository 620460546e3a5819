//! Decides how a loop's iteration driver is launched: local fork vs.
//! daemon RPC, and reconciles liveness of already-running loops.

pub mod ipc;
pub mod liveness;
pub mod pid;
pub mod spawn;

pub use ipc::DaemonClient;
pub use liveness::{reconcile, DaemonReachability, ReconcileInput, ReconcileOutcome, RunnerLivenessRecord};
pub use spawn::{resolve as resolve_spawn_owner, spawn_local, SpawnOwner, SpawnResult};
