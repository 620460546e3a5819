//! `stop`, `kill`, `resume`, `run`, `rm`, `clean`, `scale`.

use crate::commands::spawn::{create_and_start, resume_and_start, NewLoopParams};
use crate::context::Context;
use crate::output;
use forge_core::error::{ForgeError, Result};
use forge_core::model::{LoopState, QueueItemPayload, QueueItemType};
use forge_core::state_machine;
use forge_core::store::LoopFilter;
use forge_runtime::driver;
use forge_supervisor::spawn::SpawnOwner;
use std::str::FromStr;

pub async fn stop(ctx: &Context, loop_ref: String) -> Result<()> {
    let lp = ctx.store.get_loop(&loop_ref).await?;
    ctx.store.enqueue(&lp.id, QueueItemType::ControlStopGraceful, QueueItemPayload::Control, true).await?;
    if ctx.mode == crate::output::OutputMode::Text {
        println!("stop requested for {}", lp.name);
    }
    Ok(())
}

pub async fn kill(ctx: &Context, loop_ref: String) -> Result<()> {
    let lp = ctx.store.get_loop(&loop_ref).await?;
    ctx.store.enqueue(&lp.id, QueueItemType::ControlKillNow, QueueItemPayload::Control, true).await?;
    if ctx.mode == crate::output::OutputMode::Text {
        println!("kill requested for {}", lp.name);
    }
    Ok(())
}

pub async fn resume(ctx: &Context, loop_ref: String, spawn_owner: Option<String>) -> Result<()> {
    let lp = ctx.store.get_loop(&loop_ref).await?;
    let owner = parse_spawn_owner(spawn_owner)?;
    let lp = resume_and_start(ctx, lp, owner).await?;
    output::print_one(ctx.mode, &lp, |lp| format!("{} resumed", lp.name));
    Ok(())
}

/// Runs the iteration driver for one loop in the foreground. This is what
/// the supervisor actually spawns for `local`/`daemon` owners.
pub async fn run_loop(ctx: &Context, loop_ref: String) -> Result<()> {
    let lp = ctx.store.get_loop(&loop_ref).await?;
    let profile = ctx.config.profile(lp.profile_id.as_deref())?;

    let (kill_tx, kill_rx) = tokio::sync::watch::channel(false);
    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let Ok(mut sigterm) = signal(SignalKind::terminate()) else { return };
            let Ok(mut sigint) = signal(SignalKind::interrupt()) else { return };
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = sigint.recv() => {}
            }
            let _ = kill_tx.send(true);
        });
    }

    driver::run(&ctx.store, &lp.id, &profile, kill_rx).await
}

pub async fn rm(ctx: &Context, loop_ref: Option<String>, force: bool, filter: LoopFilter) -> Result<()> {
    let targets = match loop_ref {
        Some(r) => vec![ctx.store.get_loop(&r).await?],
        None => ctx.store.list_loops(filter).await?,
    };

    let mut removed = Vec::new();
    for lp in targets {
        if !force && !matches!(lp.state, LoopState::Stopped | LoopState::Error) {
            return Err(ForgeError::InvalidState(format!("loop '{}' is {}, pass --force to remove anyway", lp.name, lp.state)));
        }
        ctx.store.delete_loop(&lp.id).await?;
        removed.push(lp);
    }
    output::print_list(ctx.mode, &removed, |lp| format!("removed {}", lp.name));
    Ok(())
}

pub async fn clean(ctx: &Context, filter: LoopFilter) -> Result<()> {
    let candidates = ctx.store.list_loops(filter).await?;
    let mut removed = Vec::new();
    for lp in candidates {
        if state_machine::require_cleanable(lp.state).is_ok() {
            ctx.store.delete_loop(&lp.id).await?;
            removed.push(lp);
        }
    }
    output::print_list(ctx.mode, &removed, |lp| format!("cleaned {}", lp.name));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn scale(
    ctx: &Context,
    count: u32,
    kill_surplus: bool,
    filter: LoopFilter,
    name_prefix: Option<String>,
    prompt: Option<String>,
    prompt_msg: Option<String>,
    interval: u64,
    initial_wait: Option<u64>,
    max_runtime: u64,
    max_iterations: u64,
    spawn_owner: Option<String>,
) -> Result<()> {
    let current = ctx.store.list_loops(filter.clone()).await?;
    let owner = parse_spawn_owner(spawn_owner)?;

    if current.len() < count as usize {
        if max_iterations == 0 && max_runtime == 0 {
            return Err(ForgeError::InvalidArgument("scale requires --max-iterations or --max-runtime when creating loops".into()));
        }
        let repo_path = filter.repo_path.clone().ok_or_else(|| ForgeError::InvalidArgument("--repo is required to create loops".into()))?;
        if prompt.is_none() && prompt_msg.is_none() {
            return Err(ForgeError::InvalidArgument("one of --prompt or --prompt-msg is required to create loops".into()));
        }
        let missing = count as usize - current.len();
        let mut created = Vec::with_capacity(missing);
        for i in 0..missing {
            let prefix = name_prefix.clone().unwrap_or_else(|| "loop".to_string());
            let params = NewLoopParams {
                name: format!("{prefix}-{}", current.len() + i + 1),
                repo_path: repo_path.clone(),
                pool_id: filter.pool_id.clone(),
                profile_id: filter.profile_id.clone(),
                prompt_path: prompt.clone(),
                prompt_msg: prompt_msg.clone(),
                interval_seconds: interval,
                initial_wait,
                max_runtime_seconds: max_runtime,
                max_iterations,
                tags: filter.tag.clone().into_iter().collect(),
            };
            created.push(create_and_start(ctx, params, owner).await?);
        }
        output::print_list(ctx.mode, &created, |lp| format!("{} created", lp.name));
    } else if current.len() > count as usize {
        let surplus = current.len() - count as usize;
        let mut stopped = Vec::with_capacity(surplus);
        for lp in current.into_iter().rev().take(surplus) {
            if kill_surplus {
                kill(ctx, lp.id.clone()).await?;
            } else {
                stop(ctx, lp.id.clone()).await?;
            }
            stopped.push(lp);
        }
        output::print_list(ctx.mode, &stopped, |lp| format!("{} stopped (scale down)", lp.name));
    } else if ctx.mode == crate::output::OutputMode::Text {
        println!("fleet already at target count ({count})");
    }

    Ok(())
}

fn parse_spawn_owner(raw: Option<String>) -> Result<Option<SpawnOwner>> {
    match raw {
        None => Ok(None),
        Some(s) => SpawnOwner::from_str(&s).map(Some).map_err(|_| ForgeError::InvalidArgument(format!("unknown --spawn-owner '{s}'"))),
    }
}
