//! `forge`: the control-plane CLI. Parses a subcommand, resolves config and
//! store, dispatches, and maps the result onto a process exit code.

mod cli;
mod commands;
mod config;
mod context;
mod output;

use clap::Parser;
use cli::{Cli, Command, LockCommand, MailCommand, MemCommand, WorkCommand};
use config::Config;
use context::Context;
use forge_core::error::ForgeError;
use forge_core::store::{LoopFilter, Store};
use output::OutputMode;
use std::str::FromStr;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).without_time().init();

    let cli = Cli::parse();
    let mode = OutputMode::from_flags(cli.json, cli.jsonl);

    let result = run(cli, mode).await;
    match result {
        Ok(()) => std::process::exit(0),
        Err(err) => std::process::exit(output::print_error(mode, &err)),
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<(), ForgeError> {
    let config = Config::load(cli.config.as_deref())?;
    std::fs::create_dir_all(&config.data_dir).map_err(ForgeError::Io)?;
    let store = Store::open(&config.store_path())?;
    let ctx = Context::new(store, config, mode, cli.yes, cli.non_interactive);

    match cli.command {
        Command::Up { name, name_prefix, count, repo, pool, profile, prompt, prompt_msg, interval, initial_wait, max_runtime, max_iterations, tags, spawn_owner } => {
            commands::up::run(&ctx, name, name_prefix, count, repo, pool, profile, prompt, prompt_msg, interval, initial_wait, max_runtime, max_iterations, tags, spawn_owner).await
        }
        Command::Ps { repo, pool, profile, state, tag } => commands::ps::run(&ctx, repo, pool, profile, state, tag).await,
        Command::Logs { loop_ref, follow, lines, since, all } => commands::logs::run(&ctx, loop_ref, follow, lines, since, all).await,
        Command::Msg { loop_ref, text, now, next_prompt } => commands::msg::run(&ctx, loop_ref, text, now, next_prompt).await,
        Command::Queue { command } => commands::queue::run(&ctx, command).await,
        Command::Stop { loop_ref } => commands::lifecycle::stop(&ctx, loop_ref).await,
        Command::Kill { loop_ref } => commands::lifecycle::kill(&ctx, loop_ref).await,
        Command::Resume { loop_ref, spawn_owner } => commands::lifecycle::resume(&ctx, loop_ref, spawn_owner).await,
        Command::Run { loop_ref } => commands::lifecycle::run_loop(&ctx, loop_ref).await,
        Command::Rm { loop_ref, force, repo, pool, profile, state, tag } => {
            let state = state
                .map(|s| forge_core::model::LoopState::from_str(&s))
                .transpose()
                .map_err(ForgeError::InvalidArgument)?;
            let filter = LoopFilter { repo_path: repo, pool_id: pool, profile_id: profile, state, tag };
            if loop_ref.is_none() && !force && !ctx.confirm("remove all matching loops?")? {
                return Ok(());
            }
            commands::lifecycle::rm(&ctx, loop_ref, force, filter).await
        }
        Command::Clean { repo, pool, profile, tag } => {
            let filter = LoopFilter { repo_path: repo, pool_id: pool, profile_id: profile, state: None, tag };
            commands::lifecycle::clean(&ctx, filter).await
        }
        Command::Scale { count, kill, repo, pool, profile, tag, name_prefix, prompt, prompt_msg, interval, initial_wait, max_runtime, max_iterations, spawn_owner } => {
            let filter = LoopFilter { repo_path: repo, pool_id: pool, profile_id: profile, state: None, tag };
            commands::lifecycle::scale(&ctx, count, kill, filter, name_prefix, prompt, prompt_msg, interval, initial_wait, max_runtime, max_iterations, spawn_owner).await
        }
        Command::Mem { command } => match command {
            MemCommand::Set { key, value, loop_ref } => commands::mem::set(&ctx, loop_ref, key, value).await,
            MemCommand::Get { key, loop_ref } => commands::mem::get(&ctx, loop_ref, key).await,
            MemCommand::Ls { loop_ref } => commands::mem::ls(&ctx, loop_ref).await,
            MemCommand::Rm { key, loop_ref } => commands::mem::rm(&ctx, loop_ref, key).await,
        },
        Command::Work { command } => match command {
            WorkCommand::Set { task_id, status, detail, agent, loop_ref } => commands::work::set(&ctx, loop_ref, task_id, status, detail, agent).await,
            WorkCommand::Current { loop_ref } => commands::work::current(&ctx, loop_ref).await,
            WorkCommand::Clear { loop_ref } => commands::work::clear(&ctx, loop_ref).await,
            WorkCommand::Ls => commands::work::ls(&ctx).await,
        },
        Command::Mail { command } => match command {
            MailCommand::Send { project, to, from, subject, body, importance, ack_required, thread_id } => {
                commands::mail::send(&ctx, project, to, from, subject, body, importance, ack_required, thread_id).await
            }
            MailCommand::Inbox { project, agent, since, unread_only, limit } => commands::mail::inbox(&ctx, project, agent, since, unread_only, limit).await,
            MailCommand::Read { project, agent, message_id } => commands::mail::read(&ctx, project, agent, message_id).await,
            MailCommand::Ack { project, agent, message_id } => commands::mail::ack(&ctx, project, agent, message_id).await,
        },
        Command::Lock { command } => match command {
            LockCommand::Claim { project, path, agent, ttl_seconds, reason, exclusive } => commands::lock::claim(&ctx, project, path, agent, ttl_seconds, reason, exclusive).await,
            LockCommand::Release { project, path, agent } => commands::lock::release(&ctx, project, path, agent).await,
            LockCommand::Status { project, path } => commands::lock::status(&ctx, project, path).await,
        },
    }
}
