//! `mail send|inbox|read|ack`: the inter-agent mailbox surface.

use crate::context::Context;
use crate::output;
use forge_core::error::{ForgeError, Result};
use forge_mail::client::{MailClient, MailConfig};
use forge_mail::model::{Importance, InboxQuery};
use std::str::FromStr;

fn open(ctx: &Context) -> Result<MailClient> {
    MailClient::open(&MailConfig { remote_url: ctx.config.mail_remote_url.clone(), timeout: None, local_db_path: None })
}

#[allow(clippy::too_many_arguments)]
pub async fn send(
    ctx: &Context,
    project: String,
    to: Vec<String>,
    from: String,
    subject: String,
    body: String,
    importance: String,
    ack_required: bool,
    thread_id: Option<String>,
) -> Result<()> {
    let importance = Importance::from_str(&importance).map_err(ForgeError::InvalidArgument)?;
    let client = open(ctx)?;
    let ids = client.send(&project, &from, &to, &subject, &body, importance, ack_required, thread_id.as_deref()).await?;
    output::print_list(ctx.mode, &ids, |id| format!("sent message {id}"));
    Ok(())
}

pub async fn inbox(ctx: &Context, project: String, agent: String, since: Option<String>, unread_only: bool, limit: Option<u32>) -> Result<()> {
    let client = open(ctx)?;
    let query = InboxQuery { since, unread_only, limit, include_bodies: false };
    let messages = client.inbox(&project, &agent, &query).await?;
    output::print_list(ctx.mode, &messages, |m| format!("[{}] {} <{}>: {}", m.id, m.importance, m.sender, m.subject));
    Ok(())
}

pub async fn read(ctx: &Context, project: String, agent: String, message_id: i64) -> Result<()> {
    let client = open(ctx)?;
    let message = client.read(&project, &agent, message_id).await?;
    output::print_one(ctx.mode, &message, |m| format!("{}\nfrom: {}\n\n{}", m.subject, m.sender, m.body.as_deref().unwrap_or("")));
    Ok(())
}

pub async fn ack(ctx: &Context, project: String, agent: String, message_id: i64) -> Result<()> {
    let client = open(ctx)?;
    client.ack(&project, &agent, message_id).await?;
    if ctx.mode == crate::output::OutputMode::Text {
        println!("acked message {message_id}");
    }
    Ok(())
}
