use forge_core::model::{Loop, WorkContext, WorkStatus};

/// Builds the environment variables injected into every iteration's agent
/// process. `FMAIL_AGENT` defaults to the loop name when no override is given.
pub fn build(lp: &Loop, prompt_content: &str, work: Option<&WorkContext>, mail_agent_override: Option<&str>) -> Vec<(String, String)> {
    let mut vars = vec![
        ("FORGE_LOOP_ID".to_string(), lp.id.clone()),
        ("FORGE_LOOP_NAME".to_string(), lp.name.clone()),
        ("FORGE_PROMPT_CONTENT".to_string(), prompt_content.to_string()),
        (
            "FMAIL_AGENT".to_string(),
            mail_agent_override.unwrap_or(lp.name.as_str()).to_string(),
        ),
    ];

    if let Some(work) = work {
        if work.status != WorkStatus::None {
            if let Some(task_id) = &work.task_id {
                vars.push(("FORGE_WORK_TASK_ID".to_string(), task_id.clone()));
            }
            vars.push(("FORGE_WORK_STATUS".to_string(), work.status.to_string()));
            vars.push(("FORGE_WORK_DETAIL".to_string(), work.detail.clone().unwrap_or_default()));
        }
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_core::model::LoopState;

    fn sample_loop() -> Loop {
        let now = Utc::now().to_rfc3339();
        Loop {
            id: "id-1".into(),
            short_id: "abcd1234".into(),
            name: "oracle-main".into(),
            repo_path: "/repo".into(),
            base_prompt_path: None,
            base_prompt_msg: Some("do the thing".into()),
            interval_seconds: 0,
            max_iterations: 1,
            max_runtime_seconds: 60,
            pool_id: None,
            profile_id: None,
            tags: vec![],
            state: LoopState::Starting,
            last_error: None,
            log_path: "/tmp/oracle-main.log".into(),
            ledger_path: "/tmp/oracle-main.ledger".into(),
            metadata: serde_json::Value::Null,
            iteration_count: 0,
            created_at: now.clone(),
            updated_at: now.clone(),
            last_run_at: None,
        }
    }

    #[test]
    fn fmail_agent_defaults_to_loop_name() {
        let lp = sample_loop();
        let vars = build(&lp, "hi", None, None);
        assert!(vars.contains(&("FMAIL_AGENT".to_string(), "oracle-main".to_string())));
    }

    #[test]
    fn work_context_vars_are_omitted_when_status_is_none() {
        let lp = sample_loop();
        let work = WorkContext::empty("id-1");
        let vars = build(&lp, "hi", Some(&work), None);
        assert!(!vars.iter().any(|(k, _)| k == "FORGE_WORK_TASK_ID"));
    }

    #[test]
    fn work_context_vars_are_present_when_set() {
        let lp = sample_loop();
        let work = WorkContext {
            loop_id: "id-1".into(),
            task_id: Some("sv-1".into()),
            status: WorkStatus::InProgress,
            detail: Some("writing tests".into()),
            agent: None,
            updated_at: Utc::now().to_rfc3339(),
        };
        let vars = build(&lp, "hi", Some(&work), None);
        assert!(vars.contains(&("FORGE_WORK_TASK_ID".to_string(), "sv-1".to_string())));
        assert!(vars.contains(&("FORGE_WORK_STATUS".to_string(), "in_progress".to_string())));
    }
}
