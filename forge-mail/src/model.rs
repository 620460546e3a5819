use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Normal,
    Low,
}

impl Default for Importance {
    fn default() -> Self {
        Importance::Normal
    }
}

impl std::str::FromStr for Importance {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "high" => Importance::High,
            "normal" => Importance::Normal,
            "low" => Importance::Low,
            other => return Err(format!("unknown importance: {other}")),
        })
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Importance::High => "high",
            Importance::Normal => "normal",
            Importance::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// One piece of inter-agent mail, addressed to a single recipient within a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: i64,
    pub project: String,
    pub agent: String,
    pub sender: String,
    pub subject: String,
    pub body: Option<String>,
    pub importance: Importance,
    pub ack_required: bool,
    pub thread_id: Option<String>,
    pub created_at: String,
    pub read_at: Option<String>,
    pub acked_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InboxQuery {
    pub since: Option<String>,
    pub unread_only: bool,
    pub limit: Option<u32>,
    pub include_bodies: bool,
}

/// An advisory lease on a repository path. No filesystem enforcement backs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLock {
    pub project: String,
    pub path: String,
    pub holder_agent: String,
    pub exclusive: bool,
    pub reason: Option<String>,
    pub acquired_at: String,
    pub ttl_seconds: i64,
    pub expires_at: String,
}

/// Structured conflict surfaced when an exclusive lock overlaps an existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConflictInfo {
    pub holder: String,
    pub expires_at: String,
    pub reason: Option<String>,
}
