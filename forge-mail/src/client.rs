//! Backend-independent mail client: selects the local SQLite backend or the
//! remote JSON-RPC backend as a function of configuration, never of a type
//! the caller has to know about.

use crate::local::LocalMail;
use crate::model::{FileLock, Importance, InboxQuery, MailMessage};
use crate::remote::RemoteMail;
use forge_core::error::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Observable configuration that decides which mail backend is active.
/// Mirrors the `FORGE_AGENT_MAIL_*` environment contract.
#[derive(Debug, Clone, Default)]
pub struct MailConfig {
    pub remote_url: Option<String>,
    pub timeout: Option<Duration>,
    pub local_db_path: Option<PathBuf>,
}

#[derive(Clone)]
pub enum MailClient {
    Local(LocalMail),
    Remote(RemoteMail),
}

impl MailClient {
    /// Opens the backend indicated by `config`: remote when a URL is
    /// configured, local SQLite otherwise.
    pub fn open(config: &MailConfig) -> Result<Self> {
        if let Some(url) = &config.remote_url {
            let timeout = config.timeout.unwrap_or(Duration::from_secs(10));
            return Ok(MailClient::Remote(RemoteMail::new(url.clone(), timeout)?));
        }
        let path = config
            .local_db_path
            .clone()
            .unwrap_or_else(|| default_config_dir().join("mail.db"));
        Ok(MailClient::Local(LocalMail::open(&path)?))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn send(
        &self,
        project: &str,
        sender: &str,
        recipients: &[String],
        subject: &str,
        body: &str,
        importance: Importance,
        ack_required: bool,
        thread_id: Option<&str>,
    ) -> Result<Vec<i64>> {
        match self {
            MailClient::Local(local) => {
                let local = local.clone();
                let project = project.to_string();
                let sender = sender.to_string();
                let recipients = recipients.to_vec();
                let subject = subject.to_string();
                let body = body.to_string();
                let thread_id = thread_id.map(str::to_string);
                tokio::task::spawn_blocking(move || {
                    local.send(
                        &project,
                        &sender,
                        &recipients,
                        &subject,
                        &body,
                        importance,
                        ack_required,
                        thread_id.as_deref(),
                    )
                })
                .await
                .expect("blocking mail task panicked")
            }
            MailClient::Remote(remote) => {
                remote
                    .send(project, sender, recipients, subject, body, importance, ack_required, thread_id)
                    .await
            }
        }
    }

    pub async fn inbox(&self, project: &str, agent: &str, query: &InboxQuery) -> Result<Vec<MailMessage>> {
        match self {
            MailClient::Local(local) => {
                let local = local.clone();
                let project = project.to_string();
                let agent = agent.to_string();
                let query = query.clone();
                tokio::task::spawn_blocking(move || local.inbox(&project, &agent, &query))
                    .await
                    .expect("blocking mail task panicked")
            }
            MailClient::Remote(remote) => remote.inbox(project, agent, query).await,
        }
    }

    pub async fn read(&self, project: &str, agent: &str, message_id: i64) -> Result<MailMessage> {
        match self {
            MailClient::Local(local) => {
                let local = local.clone();
                let project = project.to_string();
                let agent = agent.to_string();
                tokio::task::spawn_blocking(move || local.read(&project, &agent, message_id))
                    .await
                    .expect("blocking mail task panicked")
            }
            MailClient::Remote(remote) => remote.read(project, agent, message_id).await,
        }
    }

    pub async fn ack(&self, project: &str, agent: &str, message_id: i64) -> Result<()> {
        match self {
            MailClient::Local(local) => {
                let local = local.clone();
                let project = project.to_string();
                let agent = agent.to_string();
                tokio::task::spawn_blocking(move || local.ack(&project, &agent, message_id))
                    .await
                    .expect("blocking mail task panicked")
            }
            MailClient::Remote(remote) => remote.ack(project, agent, message_id).await,
        }
    }
}

/// Advisory locks have no remote counterpart; they always live in the local
/// mailbox database.
#[derive(Clone)]
pub struct LockClient {
    local: LocalMail,
}

impl LockClient {
    pub fn open(local_db_path: Option<PathBuf>) -> Result<Self> {
        let path = local_db_path.unwrap_or_else(|| default_config_dir().join("mail.db"));
        Ok(Self { local: LocalMail::open(&path)? })
    }

    pub async fn acquire(
        &self,
        project: &str,
        agent: &str,
        path: &str,
        ttl_seconds: i64,
        reason: Option<&str>,
        exclusive: bool,
    ) -> Result<FileLock> {
        let local = self.local.clone();
        let project = project.to_string();
        let agent = agent.to_string();
        let path = path.to_string();
        let reason = reason.map(str::to_string);
        tokio::task::spawn_blocking(move || local.lock_acquire(&project, &agent, &path, ttl_seconds, reason.as_deref(), exclusive))
            .await
            .expect("blocking mail task panicked")
    }

    pub async fn release(&self, project: &str, agent: &str, path: &str) -> Result<()> {
        let local = self.local.clone();
        let project = project.to_string();
        let agent = agent.to_string();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || local.lock_release(&project, &agent, &path))
            .await
            .expect("blocking mail task panicked")
    }

    pub async fn renew(&self, project: &str, agent: &str, path: &str, ttl_seconds: i64) -> Result<FileLock> {
        let local = self.local.clone();
        let project = project.to_string();
        let agent = agent.to_string();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || local.lock_renew(&project, &agent, &path, ttl_seconds))
            .await
            .expect("blocking mail task panicked")
    }

    pub async fn list(&self, project: &str, path: Option<&str>) -> Result<Vec<FileLock>> {
        let local = self.local.clone();
        let project = project.to_string();
        let path = path.map(str::to_string);
        tokio::task::spawn_blocking(move || local.lock_list(&project, path.as_deref()))
            .await
            .expect("blocking mail task panicked")
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("forge")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_with_no_remote_url_selects_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = MailConfig {
            remote_url: None,
            timeout: None,
            local_db_path: Some(dir.path().join("mail.db")),
        };
        let client = MailClient::open(&config).unwrap();
        assert!(matches!(client, MailClient::Local(_)));
    }

    #[test]
    fn open_with_remote_url_selects_remote_backend() {
        let config = MailConfig {
            remote_url: Some("http://localhost:9/rpc".into()),
            timeout: None,
            local_db_path: None,
        };
        let client = MailClient::open(&config).unwrap();
        assert!(matches!(client, MailClient::Remote(_)));
    }
}
