//! Domain entities: Loop, LoopQueueItem, LoopKV, WorkContext, Event.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Canonical loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Starting,
    Running,
    Idle,
    WaitingPermission,
    Cooldown,
    Error,
    Stopped,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoopState::Starting => "starting",
            LoopState::Running => "running",
            LoopState::Idle => "idle",
            LoopState::WaitingPermission => "waiting_permission",
            LoopState::Cooldown => "cooldown",
            LoopState::Error => "error",
            LoopState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LoopState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "starting" => LoopState::Starting,
            "running" => LoopState::Running,
            "idle" => LoopState::Idle,
            "waiting_permission" => LoopState::WaitingPermission,
            "cooldown" => LoopState::Cooldown,
            "error" => LoopState::Error,
            "stopped" => LoopState::Stopped,
            other => return Err(format!("unknown loop state: {other}")),
        })
    }
}

/// Which subsystem spawned a loop's runner process, recorded in `metadata.runner_owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerOwner {
    Local,
    Daemon,
}

impl std::fmt::Display for RunnerOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerOwner::Local => write!(f, "local"),
            RunnerOwner::Daemon => write!(f, "daemon"),
        }
    }
}

/// One automation instance: its identity, config, current state, and bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loop {
    pub id: String,
    pub short_id: String,
    pub name: String,
    pub repo_path: String,
    pub base_prompt_path: Option<String>,
    pub base_prompt_msg: Option<String>,
    pub interval_seconds: u64,
    pub max_iterations: u64,
    pub max_runtime_seconds: u64,
    pub pool_id: Option<String>,
    pub profile_id: Option<String>,
    pub tags: Vec<String>,
    pub state: LoopState,
    pub last_error: Option<String>,
    pub log_path: String,
    pub ledger_path: String,
    pub metadata: serde_json::Value,
    pub iteration_count: u64,
    pub created_at: String,
    pub updated_at: String,
    pub last_run_at: Option<String>,
}

impl Loop {
    pub fn metadata_map(&self) -> HashMap<String, serde_json::Value> {
        self.metadata
            .as_object()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    pub fn set_metadata_field(&mut self, key: &str, value: serde_json::Value) {
        if !self.metadata.is_object() {
            self.metadata = serde_json::json!({});
        }
        self.metadata
            .as_object_mut()
            .expect("just ensured object")
            .insert(key.to_string(), value);
        self.updated_at = now_rfc3339();
    }

    pub fn runner_owner(&self) -> Option<RunnerOwner> {
        self.metadata
            .get("runner_owner")
            .and_then(|v| v.as_str())
            .and_then(|s| match s {
                "local" => Some(RunnerOwner::Local),
                "daemon" => Some(RunnerOwner::Daemon),
                _ => None,
            })
    }

    pub fn touch(&mut self) {
        self.updated_at = now_rfc3339();
    }
}

/// A queue item's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemType {
    Message,
    Pause,
    Conditional,
    NextPromptOverride,
    ControlStopGraceful,
    ControlKillNow,
}

impl std::fmt::Display for QueueItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueItemType::Message => "message",
            QueueItemType::Pause => "pause",
            QueueItemType::Conditional => "conditional",
            QueueItemType::NextPromptOverride => "next-prompt-override",
            QueueItemType::ControlStopGraceful => "control:stop_graceful",
            QueueItemType::ControlKillNow => "control:kill_now",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for QueueItemType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "message" => QueueItemType::Message,
            "pause" => QueueItemType::Pause,
            "conditional" => QueueItemType::Conditional,
            "next-prompt-override" => QueueItemType::NextPromptOverride,
            "control:stop_graceful" => QueueItemType::ControlStopGraceful,
            "control:kill_now" => QueueItemType::ControlKillNow,
            other => return Err(format!("unknown queue item type: {other}")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    Dispatched,
    Done,
    Failed,
    Canceled,
}

impl std::fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueItemStatus::Pending => "pending",
            QueueItemStatus::Dispatched => "dispatched",
            QueueItemStatus::Done => "done",
            QueueItemStatus::Failed => "failed",
            QueueItemStatus::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for QueueItemStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => QueueItemStatus::Pending,
            "dispatched" => QueueItemStatus::Dispatched,
            "done" => QueueItemStatus::Done,
            "failed" => QueueItemStatus::Failed,
            "canceled" => QueueItemStatus::Canceled,
            other => return Err(format!("unknown queue item status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    WhenIdle,
    WhenCooldownOver,
    WhenPreviousOk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueItemPayload {
    Message { text: String },
    Pause { duration_seconds: u64 },
    Conditional {
        message: String,
        condition_type: ConditionType,
        condition_params: serde_json::Value,
    },
    NextPromptOverride { prompt: String, is_path: bool },
    Control,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopQueueItem {
    pub id: String,
    pub loop_id: String,
    pub item_type: QueueItemType,
    pub status: QueueItemStatus,
    pub position: i64,
    pub payload: QueueItemPayload,
    pub created_at: String,
    pub dispatched_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Per-loop KV entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopKvEntry {
    pub id: String,
    pub loop_id: String,
    pub key: String,
    pub value: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    #[default]
    None,
    Planned,
    InProgress,
    Blocked,
    Completed,
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkStatus::None => "none",
            WorkStatus::Planned => "planned",
            WorkStatus::InProgress => "in_progress",
            WorkStatus::Blocked => "blocked",
            WorkStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "none" => WorkStatus::None,
            "planned" => WorkStatus::Planned,
            "in_progress" => WorkStatus::InProgress,
            "blocked" => WorkStatus::Blocked,
            "completed" => WorkStatus::Completed,
            other => return Err(format!("unknown work status: {other}")),
        })
    }
}

/// Per-loop "current task" pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkContext {
    pub loop_id: String,
    pub task_id: Option<String>,
    pub status: WorkStatus,
    pub detail: Option<String>,
    pub agent: Option<String>,
    pub updated_at: String,
}

impl WorkContext {
    pub fn empty(loop_id: impl Into<String>) -> Self {
        Self {
            loop_id: loop_id.into(),
            task_id: None,
            status: WorkStatus::None,
            detail: None,
            agent: None,
            updated_at: now_rfc3339(),
        }
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp: String,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().simple().to_string(),
            timestamp: now_rfc3339(),
            event_type: event_type.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn loop_state_round_trips_through_display_and_from_str() {
        for s in [
            LoopState::Starting,
            LoopState::Running,
            LoopState::Idle,
            LoopState::WaitingPermission,
            LoopState::Cooldown,
            LoopState::Error,
            LoopState::Stopped,
        ] {
            let text = s.to_string();
            assert_eq!(LoopState::from_str(&text).unwrap(), s);
        }
    }

    #[test]
    fn set_metadata_field_creates_object_when_null() {
        let mut l = sample_loop();
        l.set_metadata_field("runner_owner", serde_json::json!("local"));
        assert_eq!(l.runner_owner(), Some(RunnerOwner::Local));
    }

    fn sample_loop() -> Loop {
        Loop {
            id: "id".into(),
            short_id: "shortid1".into(),
            name: "oracle-main".into(),
            repo_path: "/tmp".into(),
            base_prompt_path: None,
            base_prompt_msg: Some("hi".into()),
            interval_seconds: 0,
            max_iterations: 1,
            max_runtime_seconds: 60,
            pool_id: None,
            profile_id: None,
            tags: vec![],
            state: LoopState::Stopped,
            last_error: None,
            log_path: "/tmp/log".into(),
            ledger_path: "/tmp/ledger".into(),
            metadata: serde_json::Value::Null,
            iteration_count: 0,
            created_at: now_rfc3339(),
            updated_at: now_rfc3339(),
            last_run_at: None,
        }
    }
}
