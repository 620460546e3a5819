//! `mem set|get|ls|rm`: per-loop key/value scratch storage.

use crate::context::Context;
use crate::output;
use forge_core::error::Result;

pub async fn set(ctx: &Context, loop_ref: String, key: String, value: String) -> Result<()> {
    let lp = ctx.store.get_loop(&loop_ref).await?;
    ctx.store.kv_set(&lp.id, &key, &value).await?;
    if ctx.mode == crate::output::OutputMode::Text {
        println!("{key}={value}");
    }
    Ok(())
}

pub async fn get(ctx: &Context, loop_ref: String, key: String) -> Result<()> {
    let lp = ctx.store.get_loop(&loop_ref).await?;
    let value = ctx.store.kv_get(&lp.id, &key).await?;
    output::print_one(ctx.mode, &value, |v| v.clone());
    Ok(())
}

pub async fn ls(ctx: &Context, loop_ref: String) -> Result<()> {
    let lp = ctx.store.get_loop(&loop_ref).await?;
    let entries = ctx.store.kv_list(&lp.id).await?;
    output::print_list(ctx.mode, &entries, |e| format!("{}={}", e.key, e.value));
    Ok(())
}

pub async fn rm(ctx: &Context, loop_ref: String, key: String) -> Result<()> {
    let lp = ctx.store.get_loop(&loop_ref).await?;
    ctx.store.kv_delete(&lp.id, &key).await?;
    if ctx.mode == crate::output::OutputMode::Text {
        println!("removed {key}");
    }
    Ok(())
}
