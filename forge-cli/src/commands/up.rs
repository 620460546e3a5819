use crate::commands::spawn::{create_and_start, NewLoopParams};
use crate::context::Context;
use crate::output;
use forge_core::error::{ForgeError, Result};
use forge_core::ids::{generate_loop_id, slugify};
use forge_supervisor::spawn::SpawnOwner;
use std::str::FromStr;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    ctx: &Context,
    name: Option<String>,
    name_prefix: Option<String>,
    count: u32,
    repo: Option<String>,
    pool: Option<String>,
    profile: Option<String>,
    prompt: Option<String>,
    prompt_msg: Option<String>,
    interval: u64,
    initial_wait: Option<u64>,
    max_runtime: u64,
    max_iterations: u64,
    tags: Vec<String>,
    spawn_owner: Option<String>,
) -> Result<()> {
    if prompt.is_none() && prompt_msg.is_none() {
        return Err(ForgeError::InvalidArgument("one of --prompt or --prompt-msg is required".into()));
    }
    let repo_path = repo.ok_or_else(|| ForgeError::InvalidArgument("--repo is required".into()))?;
    let owner = parse_spawn_owner(spawn_owner)?;

    let mut created = Vec::with_capacity(count as usize);
    for i in 0..count {
        let loop_name = if count == 1 {
            name.clone().unwrap_or_else(|| slugify(&generate_loop_id().1))
        } else {
            let prefix = name_prefix.clone().or_else(|| name.clone()).unwrap_or_else(|| "loop".to_string());
            format!("{prefix}-{}", i + 1)
        };

        let params = NewLoopParams {
            name: loop_name,
            repo_path: repo_path.clone(),
            pool_id: pool.clone(),
            profile_id: profile.clone(),
            prompt_path: prompt.clone(),
            prompt_msg: prompt_msg.clone(),
            interval_seconds: interval,
            initial_wait,
            max_runtime_seconds: max_runtime,
            max_iterations,
            tags: tags.clone(),
        };
        let lp = create_and_start(ctx, params, owner).await?;
        created.push(lp);
    }

    output::print_list(ctx.mode, &created, |lp| format!("{} ({}) created and started", lp.name, lp.short_id));
    Ok(())
}

fn parse_spawn_owner(raw: Option<String>) -> Result<Option<SpawnOwner>> {
    match raw {
        None => Ok(None),
        Some(s) => SpawnOwner::from_str(&s)
            .map(Some)
            .map_err(|_| ForgeError::InvalidArgument(format!("unknown --spawn-owner '{s}'"))),
    }
}
