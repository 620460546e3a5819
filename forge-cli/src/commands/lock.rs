//! `lock claim|release|status`: advisory per-path file leases.

use crate::context::Context;
use crate::output;
use forge_core::error::Result;
use forge_mail::client::LockClient;

fn open() -> Result<LockClient> {
    LockClient::open(None)
}

pub async fn claim(ctx: &Context, project: String, path: String, agent: String, ttl_seconds: i64, reason: Option<String>, exclusive: bool) -> Result<()> {
    let client = open()?;
    let lock = client.acquire(&project, &agent, &path, ttl_seconds, reason.as_deref(), exclusive).await?;
    output::print_one(ctx.mode, &lock, |l| format!("{} holds {} until {}", l.holder_agent, l.path, l.expires_at));
    Ok(())
}

pub async fn release(ctx: &Context, project: String, path: String, agent: String) -> Result<()> {
    let client = open()?;
    client.release(&project, &agent, &path).await?;
    if ctx.mode == crate::output::OutputMode::Text {
        println!("released {path}");
    }
    Ok(())
}

pub async fn status(ctx: &Context, project: String, path: Option<String>) -> Result<()> {
    let client = open()?;
    let locks = client.list(&project, path.as_deref()).await?;
    output::print_list(ctx.mode, &locks, |l| format!("{:<40} {:<16} exclusive={} expires={}", l.path, l.holder_agent, l.exclusive, l.expires_at));
    Ok(())
}
