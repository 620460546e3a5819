//! Loop creation and spawn-owner dispatch shared by `up`, `resume`, and `scale`.

use crate::context::Context;
use chrono::Utc;
use forge_core::error::{ForgeError, Result};
use forge_core::ids::generate_loop_id;
use forge_core::model::{Event, Loop, LoopState, QueueItemPayload, QueueItemType};
use forge_core::state_machine::{self, Trigger};
use forge_supervisor::ipc::DaemonClient;
use forge_supervisor::spawn::{self, SpawnOwner};

pub struct NewLoopParams {
    pub name: String,
    pub repo_path: String,
    pub pool_id: Option<String>,
    pub profile_id: Option<String>,
    pub prompt_path: Option<String>,
    pub prompt_msg: Option<String>,
    pub interval_seconds: u64,
    pub initial_wait: Option<u64>,
    pub max_runtime_seconds: u64,
    pub max_iterations: u64,
    pub tags: Vec<String>,
}

/// Creates the loop record, enqueues an optional leading pause, transitions
/// it to `starting`, and spawns its runner per `spawn_owner`.
pub async fn create_and_start(ctx: &Context, params: NewLoopParams, spawn_owner: Option<SpawnOwner>) -> Result<Loop> {
    let (id, short_id) = generate_loop_id();
    let now = Utc::now().to_rfc3339();
    let loop_dir = ctx.config.loop_dir(&params.name, &short_id);
    std::fs::create_dir_all(&loop_dir).map_err(ForgeError::Io)?;

    let mut lp = Loop {
        id: id.clone(),
        short_id,
        name: params.name,
        repo_path: params.repo_path,
        base_prompt_path: params.prompt_path,
        base_prompt_msg: params.prompt_msg,
        interval_seconds: params.interval_seconds,
        max_iterations: params.max_iterations,
        max_runtime_seconds: params.max_runtime_seconds,
        pool_id: params.pool_id,
        profile_id: params.profile_id,
        tags: params.tags,
        state: LoopState::Stopped,
        last_error: None,
        log_path: loop_dir.join("run.log").to_string_lossy().to_string(),
        ledger_path: loop_dir.join("ledger.log").to_string_lossy().to_string(),
        metadata: serde_json::json!({}),
        iteration_count: 0,
        created_at: now.clone(),
        updated_at: now,
        last_run_at: None,
    };

    ctx.store.create_loop(lp.clone()).await?;

    if let Some(duration_seconds) = params.initial_wait {
        ctx.store
            .enqueue(&lp.id, QueueItemType::Pause, QueueItemPayload::Pause { duration_seconds }, true)
            .await?;
    }

    start(ctx, &mut lp, Trigger::SpawnOk, spawn_owner).await?;
    Ok(lp)
}

/// Transitions an existing `stopped|error` loop and spawns its runner.
pub async fn resume_and_start(ctx: &Context, mut lp: Loop, spawn_owner: Option<SpawnOwner>) -> Result<Loop> {
    state_machine::require_resumable(lp.state)?;
    start(ctx, &mut lp, Trigger::ResumeOk, spawn_owner).await?;
    Ok(lp)
}

async fn start(ctx: &Context, lp: &mut Loop, trigger: Trigger, spawn_owner: Option<SpawnOwner>) -> Result<()> {
    lp.state = state_machine::apply(lp.state, trigger)?;
    lp.touch();
    ctx.store.update_loop(lp.clone()).await?;
    ctx.store
        .append_event(Event::new(
            "loop.state_changed",
            "loop",
            &lp.id,
            serde_json::json!({"from": "stopped", "to": lp.state.to_string(), "reason": trigger.to_string()}),
        ))
        .await?;

    let resolved = spawn::resolve(spawn_owner);
    let result = dispatch_spawn(ctx, lp, resolved).await?;

    lp.set_metadata_field("runner_owner", serde_json::json!(result.owner.to_string()));
    lp.set_metadata_field("runner_instance_id", serde_json::json!(result.instance_id));
    ctx.store.update_loop(lp.clone()).await
}

struct SpawnOutcome {
    owner: forge_core::model::RunnerOwner,
    instance_id: String,
}

async fn dispatch_spawn(ctx: &Context, lp: &Loop, owner: SpawnOwner) -> Result<SpawnOutcome> {
    let binary_path = std::env::current_exe().map_err(ForgeError::Io)?;
    let log_path = std::path::Path::new(&lp.log_path);
    let config_path = ctx.config.config_dir.join("config.toml");

    match owner {
        SpawnOwner::Local => {
            let result = spawn::spawn_local(&binary_path, &lp.id, log_path)?;
            Ok(SpawnOutcome { owner: forge_core::model::RunnerOwner::Local, instance_id: result.instance_id })
        }
        SpawnOwner::Daemon => {
            let client = DaemonClient::new();
            let (instance_id, _state) = client
                .start_loop_runner(&lp.id, &config_path.to_string_lossy(), &binary_path.to_string_lossy())
                .await?;
            Ok(SpawnOutcome { owner: forge_core::model::RunnerOwner::Daemon, instance_id })
        }
        SpawnOwner::Auto => {
            let client = DaemonClient::new();
            match client.start_loop_runner(&lp.id, &config_path.to_string_lossy(), &binary_path.to_string_lossy()).await {
                Ok((instance_id, _state)) => Ok(SpawnOutcome { owner: forge_core::model::RunnerOwner::Daemon, instance_id }),
                Err(ForgeError::RunnerUnavailable(reason)) => {
                    if ctx.mode == crate::output::OutputMode::Text && !ctx.non_interactive {
                        eprintln!("warning: daemon unavailable ({reason}), falling back to local spawn");
                    }
                    let result = spawn::spawn_local(&binary_path, &lp.id, log_path)?;
                    Ok(SpawnOutcome { owner: forge_core::model::RunnerOwner::Local, instance_id: result.instance_id })
                }
                Err(other) => Err(other),
            }
        }
    }
}
