//! In-memory bookkeeping for runner processes this daemon has spawned.
//!
//! The daemon never touches a loop's Store directly; `forge run <loop_id>`
//! owns that. All the daemon knows is which child process it forked for
//! which loop id, and whether that child is still alive.

use forge_core::ids::generate_loop_id;
use forge_supervisor::ipc::RunnerInfo;
use tokio::process::Child;
use tokio::sync::Mutex;

struct Runner {
    loop_id: String,
    instance_id: String,
    child: Child,
}

#[derive(Default)]
pub struct Registry {
    runners: Mutex<Vec<Runner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly spawned child under a new instance id, replacing
    /// any prior entry for the same loop.
    pub async fn insert(&self, loop_id: String, child: Child) -> String {
        let (instance_id, _) = generate_loop_id();
        let mut runners = self.runners.lock().await;
        runners.retain(|r| r.loop_id != loop_id);
        runners.push(Runner { loop_id, instance_id: instance_id.clone(), child });
        instance_id
    }

    /// Sweeps dead children out of the table and returns the live roster,
    /// used by both `ListLoopRunners` and the background liveness sweep.
    pub async fn reap_and_list(&self) -> Vec<RunnerInfo> {
        let mut runners = self.runners.lock().await;
        let mut still_alive = Vec::with_capacity(runners.len());
        let mut info = Vec::with_capacity(runners.len());
        for mut runner in runners.drain(..) {
            match runner.child.try_wait() {
                Ok(None) => {
                    info.push(RunnerInfo {
                        loop_id: runner.loop_id.clone(),
                        instance_id: runner.instance_id.clone(),
                        state: "running".to_string(),
                    });
                    still_alive.push(runner);
                }
                _ => {
                    tracing::debug!(loop_id = %runner.loop_id, instance_id = %runner.instance_id, "registry: runner exited, reaping");
                }
            }
        }
        *runners = still_alive;
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn(cmd: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn inserted_runner_is_listed_as_running() {
        let registry = Registry::new();
        registry.insert("loop-1".into(), spawn("sleep 5")).await;
        let listed = registry.reap_and_list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].loop_id, "loop-1");
        assert_eq!(listed[0].state, "running");
    }

    #[tokio::test]
    async fn exited_runner_is_reaped() {
        let registry = Registry::new();
        registry.insert("loop-1".into(), spawn("true")).await;
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let listed = registry.reap_and_list().await;
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn inserting_twice_for_the_same_loop_replaces_the_prior_entry() {
        let registry = Registry::new();
        registry.insert("loop-1".into(), spawn("sleep 5")).await;
        registry.insert("loop-1".into(), spawn("sleep 5")).await;
        let listed = registry.reap_and_list().await;
        assert_eq!(listed.len(), 1);
    }
}
