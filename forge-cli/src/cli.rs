//! Argument parsing: the exact subcommand surface the operator sees,
//! mirroring the control plane's external interface one to one.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "forge", about = "Control plane for long-running AI coding agent loops", version)]
pub struct Cli {
    /// Path to config file, default ~/.config/forge/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit a single JSON object per command
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit one JSON object per line for list-shaped results
    #[arg(long, global = true)]
    pub jsonl: bool,

    /// Suppress non-essential human-readable output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Disable ANSI color codes
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Assume yes to any confirmation prompt
    #[arg(long, global = true)]
    pub yes: bool,

    /// Never prompt; fail instead of asking
    #[arg(long = "non-interactive", global = true)]
    pub non_interactive: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create and start one or more loops
    Up {
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "name-prefix")]
        name_prefix: Option<String>,
        #[arg(long, default_value_t = 1)]
        count: u32,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        pool: Option<String>,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long = "prompt-msg")]
        prompt_msg: Option<String>,
        #[arg(long, default_value_t = 0)]
        interval: u64,
        #[arg(long = "initial-wait")]
        initial_wait: Option<u64>,
        #[arg(long = "max-runtime", default_value_t = 0)]
        max_runtime: u64,
        #[arg(long = "max-iterations", default_value_t = 0)]
        max_iterations: u64,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        #[arg(long = "spawn-owner")]
        spawn_owner: Option<String>,
    },

    /// List loops, reconciling runner liveness first
    Ps {
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        pool: Option<String>,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },

    /// Tail a loop's log file
    Logs {
        #[arg(value_name = "LOOP")]
        loop_ref: String,
        #[arg(long)]
        follow: bool,
        #[arg(long)]
        lines: Option<usize>,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        all: bool,
    },

    /// Enqueue a message for a loop
    Msg {
        #[arg(value_name = "LOOP")]
        loop_ref: String,
        text: String,
        #[arg(long)]
        now: bool,
        #[arg(long = "next-prompt")]
        next_prompt: bool,
    },

    /// Per-loop queue operations
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },

    /// Request a graceful stop
    Stop {
        #[arg(value_name = "LOOP")]
        loop_ref: String,
    },

    /// Request an immediate kill
    Kill {
        #[arg(value_name = "LOOP")]
        loop_ref: String,
    },

    /// Resume a stopped or errored loop
    Resume {
        #[arg(value_name = "LOOP")]
        loop_ref: String,
        #[arg(long = "spawn-owner")]
        spawn_owner: Option<String>,
    },

    /// Run the iteration driver for a loop in the foreground
    Run {
        #[arg(value_name = "LOOP")]
        loop_ref: String,
    },

    /// Delete loop records
    Rm {
        #[arg(value_name = "LOOP")]
        loop_ref: Option<String>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        pool: Option<String>,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },

    /// Delete all stopped|error loops matching filters
    Clean {
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        pool: Option<String>,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },

    /// Adjust a fleet of loops to a target count
    Scale {
        #[arg(long)]
        count: u32,
        #[arg(long)]
        kill: bool,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        pool: Option<String>,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long = "name-prefix")]
        name_prefix: Option<String>,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long = "prompt-msg")]
        prompt_msg: Option<String>,
        #[arg(long, default_value_t = 0)]
        interval: u64,
        #[arg(long = "initial-wait")]
        initial_wait: Option<u64>,
        #[arg(long = "max-runtime", default_value_t = 0)]
        max_runtime: u64,
        #[arg(long = "max-iterations", default_value_t = 0)]
        max_iterations: u64,
        #[arg(long = "spawn-owner")]
        spawn_owner: Option<String>,
    },

    /// Per-loop key/value memory
    Mem {
        #[command(subcommand)]
        command: MemCommand,
    },

    /// Per-loop current-task pointer
    Work {
        #[command(subcommand)]
        command: WorkCommand,
    },

    /// Inter-loop mail
    Mail {
        #[command(subcommand)]
        command: MailCommand,
    },

    /// Advisory path locks
    Lock {
        #[command(subcommand)]
        command: LockCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    Ls {
        #[arg(value_name = "LOOP")]
        loop_ref: String,
        #[arg(long)]
        all: bool,
    },
    Move {
        #[arg(value_name = "LOOP")]
        loop_ref: String,
        item_id: String,
        #[arg(long)]
        to: String,
    },
    Rm {
        #[arg(value_name = "LOOP")]
        loop_ref: String,
        item_id: String,
    },
    Clear {
        #[arg(value_name = "LOOP")]
        loop_ref: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum MemCommand {
    Set {
        key: String,
        value: String,
        #[arg(long = "loop", env = "FORGE_LOOP_ID")]
        loop_ref: String,
    },
    Get {
        key: String,
        #[arg(long = "loop", env = "FORGE_LOOP_ID")]
        loop_ref: String,
    },
    Ls {
        #[arg(long = "loop", env = "FORGE_LOOP_ID")]
        loop_ref: String,
    },
    Rm {
        key: String,
        #[arg(long = "loop", env = "FORGE_LOOP_ID")]
        loop_ref: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum WorkCommand {
    Set {
        #[arg(long = "task")]
        task_id: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        detail: Option<String>,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long = "loop", env = "FORGE_LOOP_ID")]
        loop_ref: String,
    },
    Current {
        #[arg(long = "loop", env = "FORGE_LOOP_ID")]
        loop_ref: String,
    },
    Clear {
        #[arg(long = "loop", env = "FORGE_LOOP_ID")]
        loop_ref: String,
    },
    Ls,
}

#[derive(Debug, Subcommand)]
pub enum MailCommand {
    Send {
        #[arg(long, env = "FORGE_AGENT_MAIL_PROJECT")]
        project: String,
        #[arg(long = "to", value_delimiter = ',')]
        to: Vec<String>,
        #[arg(long, env = "FMAIL_AGENT")]
        from: String,
        subject: String,
        body: String,
        #[arg(long, default_value = "normal")]
        importance: String,
        #[arg(long = "ack-required")]
        ack_required: bool,
        #[arg(long = "thread")]
        thread_id: Option<String>,
    },
    Inbox {
        #[arg(long, env = "FORGE_AGENT_MAIL_PROJECT")]
        project: String,
        #[arg(long, env = "FMAIL_AGENT")]
        agent: String,
        #[arg(long)]
        since: Option<String>,
        #[arg(long = "unread-only")]
        unread_only: bool,
        #[arg(long, env = "FORGE_AGENT_MAIL_LIMIT")]
        limit: Option<u32>,
    },
    Read {
        #[arg(long, env = "FORGE_AGENT_MAIL_PROJECT")]
        project: String,
        #[arg(long, env = "FMAIL_AGENT")]
        agent: String,
        message_id: i64,
    },
    Ack {
        #[arg(long, env = "FORGE_AGENT_MAIL_PROJECT")]
        project: String,
        #[arg(long, env = "FMAIL_AGENT")]
        agent: String,
        message_id: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum LockCommand {
    Claim {
        #[arg(long, env = "FORGE_AGENT_MAIL_PROJECT")]
        project: String,
        path: String,
        #[arg(long, env = "FMAIL_AGENT")]
        agent: String,
        #[arg(long = "ttl", default_value_t = 3600)]
        ttl_seconds: i64,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long, default_value_t = true)]
        exclusive: bool,
    },
    Release {
        #[arg(long, env = "FORGE_AGENT_MAIL_PROJECT")]
        project: String,
        path: String,
        #[arg(long, env = "FMAIL_AGENT")]
        agent: String,
    },
    Status {
        #[arg(long, env = "FORGE_AGENT_MAIL_PROJECT")]
        project: String,
        path: Option<String>,
    },
}
