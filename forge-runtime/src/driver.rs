//! The iteration driver: the deterministic, single-threaded loop body that
//! runs inside a loop's runner process. One call to `run_iteration` executes
//! exactly one pass; `run` drives iterations until a termination condition
//! is reached.

use crate::agent::{self, AgentOutcome};
use crate::env;
use crate::profile::Profile;
use crate::prompt::{self, PromptOverride};
use chrono::Utc;
use forge_core::error::Result;
use forge_core::model::{Event, Loop, LoopState, QueueItemPayload, QueueItemStatus, QueueItemType};
use forge_core::state_machine::{self, Trigger};
use forge_core::store::Store;
use forge_stopcheck::{quantitative, qualitative, StopConfig, When};
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Outcome of one `run_iteration` call, telling the caller whether to keep
/// looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Continue,
    Stopped,
    Exited,
}

fn stop_config(lp: &Loop) -> StopConfig {
    lp.metadata
        .get("stop_config")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

/// Drives iterations until a termination condition is reached:
/// `iteration_count >= max_iterations` (when nonzero), elapsed wall-clock
/// `>= max_runtime_seconds` (when nonzero), a stop item is consumed, or an
/// unrecoverable evaluator failure occurs.
pub async fn run(store: &Store, loop_id: &str, profile: &Profile, kill_rx: watch::Receiver<bool>) -> Result<()> {
    let start = std::time::Instant::now();
    let mut previous_ok: Option<bool> = None;

    loop {
        let lp = store.get_loop(loop_id).await?;
        if lp.max_iterations != 0 && lp.iteration_count >= lp.max_iterations {
            info!(loop_id, "max_iterations reached, exiting");
            return Ok(());
        }
        if lp.max_runtime_seconds != 0 && start.elapsed() >= Duration::from_secs(lp.max_runtime_seconds) {
            info!(loop_id, "max_runtime_seconds reached, exiting");
            return Ok(());
        }

        match run_iteration(store, loop_id, profile, kill_rx.clone(), &mut previous_ok).await? {
            IterationOutcome::Continue => continue,
            IterationOutcome::Stopped | IterationOutcome::Exited => return Ok(()),
        }
    }
}

pub async fn run_iteration(
    store: &Store,
    loop_id: &str,
    profile: &Profile,
    kill_rx: watch::Receiver<bool>,
    previous_ok: &mut Option<bool>,
) -> Result<IterationOutcome> {
    let started_at = Utc::now().to_rfc3339();
    let mut lp = store.get_loop(loop_id).await?;

    if !matches!(lp.state, LoopState::Running | LoopState::Starting | LoopState::Idle) {
        debug!(loop_id, state = %lp.state, "driver: state no longer runnable, exiting cleanly");
        return Ok(IterationOutcome::Exited);
    }

    // Step 2: consume a one-shot next-prompt-override from the queue head.
    let mut override_prompt = consume_override(store, loop_id).await?;

    // Steps 3-4: pause / kill_now via the gated queue head.
    let mut dispatched_message: Option<String> = None;
    if let Some(item) = store.peek_next(loop_id, lp.state, *previous_ok).await? {
        match item.item_type {
            QueueItemType::ControlKillNow => {
                store.mark_dispatched(&item.id).await?;
                store.mark_done(&item.id, QueueItemStatus::Done).await?;
                lp.state = state_machine::apply(lp.state, Trigger::StopRequested)?;
                lp.last_error = Some("killed".into());
                lp.touch();
                store.update_loop(lp.clone()).await?;
                store
                    .append_event(Event::new(
                        "loop.state_changed",
                        "loop",
                        &lp.id,
                        serde_json::json!({"from": "running", "to": "stopped", "reason": "kill_now"}),
                    ))
                    .await?;
                return Ok(IterationOutcome::Stopped);
            }
            QueueItemType::ControlStopGraceful => {
                store.mark_dispatched(&item.id).await?;
                store.mark_done(&item.id, QueueItemStatus::Done).await?;
                lp.state = state_machine::apply(lp.state, Trigger::StopRequested)?;
                lp.touch();
                store.update_loop(lp.clone()).await?;
                store
                    .append_event(Event::new(
                        "loop.state_changed",
                        "loop",
                        &lp.id,
                        serde_json::json!({"from": "running", "to": "stopped", "reason": "stop_graceful"}),
                    ))
                    .await?;
                return Ok(IterationOutcome::Stopped);
            }
            QueueItemType::Pause => {
                store.mark_dispatched(&item.id).await?;
                if let QueueItemPayload::Pause { duration_seconds } = item.payload {
                    sleep_cancellable(Duration::from_secs(duration_seconds), &kill_rx).await;
                }
                store.mark_done(&item.id, QueueItemStatus::Done).await?;
            }
            QueueItemType::Message | QueueItemType::Conditional => {
                store.mark_dispatched(&item.id).await?;
                dispatched_message = Some(match &item.payload {
                    QueueItemPayload::Message { text } => text.clone(),
                    QueueItemPayload::Conditional { message, .. } => message.clone(),
                    _ => String::new(),
                });
                store.mark_done(&item.id, QueueItemStatus::Done).await?;
            }
            QueueItemType::NextPromptOverride => {}
        }
    }

    if override_prompt.is_none() {
        if let Some(text) = dispatched_message.take() {
            override_prompt = Some(PromptOverride { prompt: text, is_path: false });
        }
    }

    let prompt_text = prompt::resolve(&lp, override_prompt.as_ref())?;

    // Step 6: transition to running, emit iteration.begin.
    let begin_trigger = match lp.state {
        LoopState::Starting => Trigger::IterationBegin,
        LoopState::Idle => Trigger::IterationEndBusyNext,
        _ => Trigger::IterationBegin,
    };
    lp.state = state_machine::apply(lp.state, begin_trigger)?;
    lp.touch();
    store.update_loop(lp.clone()).await?;
    store
        .append_event(Event::new("iteration.begin", "loop", &lp.id, serde_json::json!({})))
        .await?;

    let iteration_number = lp.iteration_count + 1;
    let cfg = stop_config(&lp);

    // Step 7: quantitative before-check.
    if let Some(quant) = &cfg.quantitative {
        if quantitative::is_due(quant, iteration_number, When::Before) {
            let outcome = quantitative::run(quant, Path::new(&lp.repo_path)).await?;
            store
                .append_event(Event::new(
                    "loop.quant_check",
                    "loop",
                    &lp.id,
                    serde_json::json!({"phase": "before", "matched": outcome.matched, "exit_code": outcome.exit_code}),
                ))
                .await?;
            if quantitative::should_stop(quant, &outcome) {
                append_ledger(&lp.ledger_path, iteration_number, &started_at, None, &["quant_stop_before"]);
                return finish_with_stop(store, &mut lp, "quant_stop").await;
            }
        }
    }

    // Step 8: execute the agent.
    let work = store.work_get(loop_id).await.ok();
    let env_vars = env::build(&lp, &prompt_text, work.as_ref(), None);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&lp.log_path)
        .map_err(forge_core::error::ForgeError::Io)?;
    let agent_outcome: AgentOutcome =
        agent::run(profile, &env_vars, &prompt_text, &lp.repo_path, log_file, kill_rx.clone()).await?;
    let iteration_ok = agent_outcome.exit_code == Some(0) && !agent_outcome.killed;
    *previous_ok = Some(iteration_ok);

    // Step 9: post-phase evaluators.
    if let Some(quant) = &cfg.quantitative {
        if quantitative::is_due(quant, iteration_number, When::After) {
            let outcome = quantitative::run(quant, Path::new(&lp.repo_path)).await?;
            store
                .append_event(Event::new(
                    "loop.quant_check",
                    "loop",
                    &lp.id,
                    serde_json::json!({"phase": "after", "matched": outcome.matched, "exit_code": outcome.exit_code}),
                ))
                .await?;
            if quantitative::should_stop(quant, &outcome) {
                append_ledger(&lp.ledger_path, iteration_number, &started_at, agent_outcome.exit_code, &["quant_stop_after"]);
                return finish_with_stop(store, &mut lp, "quant_stop").await;
            }
        }
    }

    if let Some(qual) = &cfg.qualitative {
        if qualitative::is_due(qual, iteration_number) {
            let judge_prompt = if qual.is_path {
                std::fs::read_to_string(&qual.prompt).map_err(forge_core::error::ForgeError::Io)?
            } else {
                qual.prompt.clone()
            };
            let judge_env = env::build(&lp, &judge_prompt, work.as_ref(), None);
            let (_, judge_stdout, judge_stderr) =
                agent::run_capturing(profile, &judge_env, &judge_prompt, &lp.repo_path).await?;
            append_to_log(&lp.log_path, &judge_stdout, &judge_stderr)?;

            let verdict = qualitative::interpret(qual, &judge_stdout)?;
            store
                .append_event(Event::new(
                    "loop.qual_check",
                    "loop",
                    &lp.id,
                    serde_json::json!({"verdict": format!("{verdict:?}"), "raw_stdout": judge_stdout.trim()}),
                ))
                .await?;
            if verdict == qualitative::Verdict::Stop {
                append_ledger(&lp.ledger_path, iteration_number, &started_at, agent_outcome.exit_code, &["qual_stop"]);
                return finish_with_stop(store, &mut lp, "qual_stop").await;
            }
        }
    }

    // Step 10: bookkeeping, transition to idle, emit iteration.end.
    lp.iteration_count += 1;
    lp.last_run_at = Some(Utc::now().to_rfc3339());
    let end_trigger = if iteration_ok { Trigger::IterationEndClean } else { Trigger::IterationFailed };
    match state_machine::apply(lp.state, end_trigger) {
        Ok(next) => lp.state = next,
        Err(_) => lp.state = LoopState::Idle,
    }
    if !iteration_ok {
        lp.last_error = Some(format!("agent exited with {:?}", agent_outcome.exit_code));
    }
    lp.touch();
    store.update_loop(lp.clone()).await?;
    store
        .append_event(Event::new(
            "iteration.end",
            "loop",
            &lp.id,
            serde_json::json!({"exit_code": agent_outcome.exit_code, "ok": iteration_ok}),
        ))
        .await?;
    let verdict_tag = if iteration_ok { "ok" } else { "failed" };
    append_ledger(&lp.ledger_path, iteration_number, &started_at, agent_outcome.exit_code, &[verdict_tag]);

    if lp.state == LoopState::Error {
        warn!(loop_id, "iteration failed, loop entered error state");
        return Ok(IterationOutcome::Stopped);
    }

    // Step 11: sleep for interval_seconds, interruptible by kill.
    if lp.interval_seconds > 0 {
        sleep_cancellable(Duration::from_secs(lp.interval_seconds), &kill_rx).await;
    }

    Ok(IterationOutcome::Continue)
}

async fn finish_with_stop(store: &Store, lp: &mut Loop, reason: &str) -> Result<IterationOutcome> {
    let from = lp.state;
    lp.state = state_machine::apply(lp.state, Trigger::StopRequested)?;
    lp.touch();
    store.update_loop(lp.clone()).await?;
    store
        .append_event(Event::new(
            "loop.state_changed",
            "loop",
            &lp.id,
            serde_json::json!({"from": from.to_string(), "to": "stopped", "reason": reason}),
        ))
        .await?;
    Ok(IterationOutcome::Stopped)
}

async fn consume_override(store: &Store, loop_id: &str) -> Result<Option<PromptOverride>> {
    let pending = store.list_queue(loop_id, false).await?;
    let head = pending.iter().min_by_key(|item| item.position);
    match head {
        Some(item) if item.item_type == QueueItemType::NextPromptOverride => {
            if let QueueItemPayload::NextPromptOverride { prompt, is_path } = &item.payload {
                let result = PromptOverride { prompt: prompt.clone(), is_path: *is_path };
                store.mark_dispatched(&item.id).await?;
                store.mark_done(&item.id, QueueItemStatus::Done).await?;
                Ok(Some(result))
            } else {
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}

/// Appends one JSON line to the loop's ledger file. Best-effort: a ledger
/// write failure shouldn't abort an iteration whose real outcome already
/// landed in the Store's event log.
fn append_ledger(ledger_path: &str, iteration_number: u64, started_at: &str, exit_code: Option<i32>, verdicts: &[&str]) {
    use std::io::Write;
    let entry = serde_json::json!({
        "iteration": iteration_number,
        "started_at": started_at,
        "ended_at": Utc::now().to_rfc3339(),
        "exit_code": exit_code,
        "verdicts": verdicts,
    });
    let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(ledger_path) else { return };
    let _ = writeln!(file, "{entry}");
}

fn append_to_log(log_path: &str, stdout: &str, stderr: &str) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(forge_core::error::ForgeError::Io)?;
    writeln!(file, "[{}] judge stdout: {}", Utc::now().to_rfc3339(), stdout.trim())
        .map_err(forge_core::error::ForgeError::Io)?;
    if !stderr.trim().is_empty() {
        writeln!(file, "[{}] judge stderr: {}", Utc::now().to_rfc3339(), stderr.trim())
            .map_err(forge_core::error::ForgeError::Io)?;
    }
    Ok(())
}

async fn sleep_cancellable(duration: Duration, kill_rx: &watch::Receiver<bool>) {
    let mut kill_rx = kill_rx.clone();
    if *kill_rx.borrow() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = async {
            while !*kill_rx.borrow() {
                if kill_rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        } => {}
    }
}
