use crate::context::Context;
use crate::output;
use chrono::Utc;
use forge_core::error::Result;
use forge_core::model::{Event, LoopState};
use forge_core::store::LoopFilter;
use forge_supervisor::ipc::DaemonClient;
use forge_supervisor::liveness::{self, DaemonReachability, ReconcileInput, ReconcileOutcome};
use forge_supervisor::pid;
use std::str::FromStr;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    ctx: &Context,
    repo: Option<String>,
    pool: Option<String>,
    profile: Option<String>,
    state: Option<String>,
    tag: Option<String>,
) -> Result<()> {
    reconcile_all(ctx).await?;

    let state = state.map(|s| LoopState::from_str(&s)).transpose().map_err(forge_core::error::ForgeError::InvalidArgument)?;
    let filter = LoopFilter { repo_path: repo, pool_id: pool, profile_id: profile, state, tag };
    let loops = ctx.store.list_loops(filter).await?;

    output::print_list(ctx.mode, &loops, |lp| {
        format!(
            "{:<8} {:<24} {:<18} iter={} repo={}",
            lp.short_id, lp.name, lp.state, lp.iteration_count, lp.repo_path
        )
    });
    Ok(())
}

/// Liveness reconciliation for every currently-`running` loop, matching the
/// sweep the daemon runs periodically and `ps` runs on demand.
pub async fn reconcile_all(ctx: &Context) -> Result<()> {
    let running = ctx.store.list_loops(LoopFilter { state: Some(LoopState::Running), ..Default::default() }).await?;
    if running.is_empty() {
        return Ok(());
    }

    let client = DaemonClient::new();
    let daemon_runners = client.list_loop_runners().await.ok();

    for mut lp in running {
        let runner_owner = lp.runner_owner();
        let pid_alive = lp
            .metadata
            .get("runner_instance_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<u32>().ok())
            .map(pid::is_alive);

        let daemon = match &daemon_runners {
            None => DaemonReachability::Unreachable,
            Some(runners) => {
                let instance_id = lp.metadata.get("runner_instance_id").and_then(|v| v.as_str());
                let instance_running = instance_id.map(|id| runners.iter().any(|r| r.instance_id == id)).unwrap_or(false);
                DaemonReachability::Reachable { instance_running }
            }
        };

        let now = Utc::now().to_rfc3339();
        let input = ReconcileInput { runner_owner, pid_alive, daemon };
        if let ReconcileOutcome::MarkStale(record) = liveness::reconcile(&input, &now) {
            let from = lp.state;
            lp.state = LoopState::Stopped;
            lp.last_error = Some("stale_runner".into());
            lp.set_metadata_field("runner_liveness", serde_json::to_value(&record).unwrap());
            lp.touch();
            ctx.store.update_loop(lp.clone()).await?;
            ctx.store
                .append_event(Event::new(
                    "loop.state_changed",
                    "loop",
                    &lp.id,
                    serde_json::json!({"from": from.to_string(), "to": "stopped", "reason": record.reason}),
                ))
                .await?;
        }
    }
    Ok(())
}
