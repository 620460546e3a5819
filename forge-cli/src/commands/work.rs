//! `work set|current|clear|ls`: the "what is this loop doing right now" pointer.

use crate::context::Context;
use crate::output;
use forge_core::error::Result;
use forge_core::model::WorkStatus;
use forge_core::store::LoopFilter;
use std::str::FromStr;

#[allow(clippy::too_many_arguments)]
pub async fn set(
    ctx: &Context,
    loop_ref: String,
    task_id: Option<String>,
    status: Option<String>,
    detail: Option<String>,
    agent: Option<String>,
) -> Result<()> {
    let lp = ctx.store.get_loop(&loop_ref).await?;
    let status = match status {
        Some(s) => WorkStatus::from_str(&s).map_err(forge_core::error::ForgeError::InvalidArgument)?,
        None => WorkStatus::None,
    };
    ctx.store.work_set(&lp.id, task_id, status, detail, agent).await?;
    let work = ctx.store.work_get(&lp.id).await?;
    output::print_one(ctx.mode, &work, |w| format!("{} -> {}", lp.name, w.status));
    Ok(())
}

pub async fn current(ctx: &Context, loop_ref: String) -> Result<()> {
    let lp = ctx.store.get_loop(&loop_ref).await?;
    let work = ctx.store.work_get(&lp.id).await?;
    output::print_one(ctx.mode, &work, |w| {
        format!("task={} status={} detail={}", w.task_id.as_deref().unwrap_or("-"), w.status, w.detail.as_deref().unwrap_or("-"))
    });
    Ok(())
}

pub async fn clear(ctx: &Context, loop_ref: String) -> Result<()> {
    let lp = ctx.store.get_loop(&loop_ref).await?;
    ctx.store.work_clear(&lp.id).await?;
    if ctx.mode == crate::output::OutputMode::Text {
        println!("cleared work context for {}", lp.name);
    }
    Ok(())
}

/// Lists the current work context across every loop in the fleet.
pub async fn ls(ctx: &Context) -> Result<()> {
    let loops = ctx.store.list_loops(LoopFilter::default()).await?;
    let mut contexts = Vec::with_capacity(loops.len());
    for lp in loops {
        let work = ctx.store.work_get(&lp.id).await?;
        contexts.push((lp.name, work));
    }
    output::print_list(ctx.mode, &contexts, |(name, w)| format!("{:<24} {:<12} {}", name, w.status, w.task_id.as_deref().unwrap_or("-")));
    Ok(())
}
