use forge_core::error::{ForgeError, Result};
use forge_core::model::Loop;

/// A one-shot override consumed from the head of the queue, replacing the
/// base prompt for exactly one iteration.
#[derive(Debug, Clone)]
pub struct PromptOverride {
    pub prompt: String,
    pub is_path: bool,
}

/// Resolves the text sent to the agent for one iteration: an override (if
/// one was consumed this iteration) or the loop's base prompt, each either
/// inline text or a file to read.
pub fn resolve(lp: &Loop, overridden: Option<&PromptOverride>) -> Result<String> {
    if let Some(over) = overridden {
        return if over.is_path {
            read_prompt_file(&over.prompt)
        } else {
            Ok(over.prompt.clone())
        };
    }

    if let Some(msg) = &lp.base_prompt_msg {
        return Ok(msg.clone());
    }
    if let Some(path) = &lp.base_prompt_path {
        return read_prompt_file(path);
    }

    Err(ForgeError::InvalidArgument(format!(
        "loop {} has neither base_prompt_msg nor base_prompt_path",
        lp.name
    )))
}

fn read_prompt_file(path: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(ForgeError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_core::model::LoopState;

    fn sample_loop(msg: Option<&str>, path: Option<&str>) -> Loop {
        let now = Utc::now().to_rfc3339();
        Loop {
            id: "id".into(),
            short_id: "shortid1".into(),
            name: "l".into(),
            repo_path: "/tmp".into(),
            base_prompt_path: path.map(str::to_string),
            base_prompt_msg: msg.map(str::to_string),
            interval_seconds: 0,
            max_iterations: 1,
            max_runtime_seconds: 0,
            pool_id: None,
            profile_id: None,
            tags: vec![],
            state: LoopState::Starting,
            last_error: None,
            log_path: "/tmp/l.log".into(),
            ledger_path: "/tmp/l.ledger".into(),
            metadata: serde_json::Value::Null,
            iteration_count: 0,
            created_at: now.clone(),
            updated_at: now,
            last_run_at: None,
        }
    }

    #[test]
    fn falls_back_to_base_prompt_msg_when_no_override() {
        let lp = sample_loop(Some("do it"), None);
        assert_eq!(resolve(&lp, None).unwrap(), "do it");
    }

    #[test]
    fn override_inline_text_takes_priority_over_base_prompt() {
        let lp = sample_loop(Some("base"), None);
        let over = PromptOverride { prompt: "override".into(), is_path: false };
        assert_eq!(resolve(&lp, Some(&over)).unwrap(), "override");
    }

    #[test]
    fn override_path_reads_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("p.txt");
        std::fs::write(&file, "from file").unwrap();
        let lp = sample_loop(Some("base"), None);
        let over = PromptOverride { prompt: file.to_string_lossy().to_string(), is_path: true };
        assert_eq!(resolve(&lp, Some(&over)).unwrap(), "from file");
    }

    #[test]
    fn no_prompt_source_is_an_invalid_argument() {
        let lp = sample_loop(None, None);
        let err = resolve(&lp, None).unwrap_err();
        assert!(matches!(err, ForgeError::InvalidArgument(_)));
    }
}
