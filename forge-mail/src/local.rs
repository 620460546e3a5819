//! Local SQLite-backed mail and advisory lock store, used when no remote
//! mail URL is configured. Lives in its own database file, separate from
//! the loop Store, so a project's mailbox survives independent of any
//! single loop's lifecycle.

use crate::model::{FileLock, Importance, InboxQuery, MailMessage};
use chrono::{Duration, Utc};
use forge_core::error::{ForgeError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS mail_messages (
    project      TEXT NOT NULL,
    id           INTEGER NOT NULL,
    agent        TEXT NOT NULL,
    sender       TEXT NOT NULL,
    subject      TEXT NOT NULL,
    body         TEXT,
    importance   TEXT NOT NULL,
    ack_required INTEGER NOT NULL,
    thread_id    TEXT,
    created_at   TEXT NOT NULL,
    PRIMARY KEY (project, id)
);
CREATE INDEX IF NOT EXISTS idx_mail_messages_inbox ON mail_messages(project, agent, created_at);

CREATE TABLE IF NOT EXISTS mail_status (
    project    TEXT NOT NULL,
    agent      TEXT NOT NULL,
    message_id INTEGER NOT NULL,
    read_at    TEXT,
    acked_at   TEXT,
    PRIMARY KEY (project, agent, message_id)
);

CREATE TABLE IF NOT EXISTS file_locks (
    project      TEXT NOT NULL,
    path         TEXT NOT NULL,
    holder_agent TEXT NOT NULL,
    exclusive    INTEGER NOT NULL,
    reason       TEXT,
    acquired_at  TEXT NOT NULL,
    ttl_seconds  INTEGER NOT NULL,
    expires_at   TEXT NOT NULL,
    PRIMARY KEY (project, path, holder_agent)
);
";

pub struct LocalMail {
    conn: Arc<Mutex<Connection>>,
}

impl Clone for LocalMail {
    fn clone(&self) -> Self {
        Self { conn: self.conn.clone() }
    }
}

impl LocalMail {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(ForgeError::Storage)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(ForgeError::Storage)?;
        conn.pragma_update(None, "busy_timeout", 5000).map_err(ForgeError::Storage)?;
        conn.execute_batch(SCHEMA).map_err(ForgeError::Storage)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(ForgeError::Storage)?;
        conn.execute_batch(SCHEMA).map_err(ForgeError::Storage)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn send(
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
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let mut ids = Vec::with_capacity(recipients.len());
        for agent in recipients {
            let next_id: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(id), 0) + 1 FROM mail_messages WHERE project = ?1",
                    params![project],
                    |row| row.get(0),
                )
                .map_err(ForgeError::Storage)?;
            conn.execute(
                "INSERT INTO mail_messages
                 (project, id, agent, sender, subject, body, importance, ack_required, thread_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    project,
                    next_id,
                    agent,
                    sender,
                    subject,
                    body,
                    importance.to_string(),
                    ack_required as i64,
                    thread_id,
                    now,
                ],
            )
            .map_err(ForgeError::Storage)?;
            ids.push(next_id);
        }
        Ok(ids)
    }

    pub fn inbox(&self, project: &str, agent: &str, query: &InboxQuery) -> Result<Vec<MailMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = String::from(
            "SELECT m.id, m.sender, m.subject, m.body, m.importance, m.ack_required, m.thread_id,
                    m.created_at, s.read_at, s.acked_at
             FROM mail_messages m
             LEFT JOIN mail_status s
               ON s.project = m.project AND s.agent = m.agent AND s.message_id = m.id
             WHERE m.project = ?1 AND m.agent = ?2",
        );
        if query.since.is_some() {
            sql.push_str(" AND m.created_at > ?3");
        }
        if query.unread_only {
            sql.push_str(" AND s.read_at IS NULL");
        }
        sql.push_str(" ORDER BY m.created_at DESC, m.id DESC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql).map_err(ForgeError::Storage)?;
        let mut bind_params: Vec<&dyn rusqlite::ToSql> = vec![&project, &agent];
        if let Some(since) = &query.since {
            bind_params.push(since);
        }
        let rows = stmt
            .query_map(bind_params.as_slice(), |row| row_to_message(row, project, agent))
            .map_err(ForgeError::Storage)?;

        let mut out = Vec::new();
        for row in rows {
            let mut msg = row.map_err(ForgeError::Storage)?;
            if !query.include_bodies {
                msg.body = None;
            }
            out.push(msg);
        }
        Ok(out)
    }

    pub fn read(&self, project: &str, agent: &str, message_id: i64) -> Result<MailMessage> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let msg = conn
            .query_row(
                "SELECT m.id, m.sender, m.subject, m.body, m.importance, m.ack_required, m.thread_id,
                        m.created_at, s.read_at, s.acked_at
                 FROM mail_messages m
                 LEFT JOIN mail_status s
                   ON s.project = m.project AND s.agent = m.agent AND s.message_id = m.id
                 WHERE m.project = ?1 AND m.agent = ?2 AND m.id = ?3",
                params![project, agent, message_id],
                |row| row_to_message(row, project, agent),
            )
            .optional()
            .map_err(ForgeError::Storage)?
            .ok_or_else(|| ForgeError::NotFound(format!("mail message {message_id} in project {project}")))?;

        conn.execute(
            "INSERT INTO mail_status (project, agent, message_id, read_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(project, agent, message_id) DO UPDATE SET read_at = excluded.read_at
             WHERE mail_status.read_at IS NULL",
            params![project, agent, message_id, now],
        )
        .map_err(ForgeError::Storage)?;

        Ok(msg)
    }

    pub fn ack(&self, project: &str, agent: &str, message_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM mail_messages WHERE project = ?1 AND agent = ?2 AND id = ?3",
                params![project, agent, message_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(ForgeError::Storage)?;
        if exists.is_none() {
            return Err(ForgeError::NotFound(format!("mail message {message_id} in project {project}")));
        }
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO mail_status (project, agent, message_id, acked_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(project, agent, message_id) DO UPDATE SET acked_at = excluded.acked_at",
            params![project, agent, message_id, now],
        )
        .map_err(ForgeError::Storage)?;
        Ok(())
    }

    pub fn lock_acquire(
        &self,
        project: &str,
        agent: &str,
        path: &str,
        ttl_seconds: i64,
        reason: Option<&str>,
        exclusive: bool,
    ) -> Result<FileLock> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        purge_expired(&conn, project, path, &now_str)?;

        let mut stmt = conn
            .prepare(
                "SELECT holder_agent, exclusive, reason, expires_at FROM file_locks
                 WHERE project = ?1 AND path = ?2 AND expires_at > ?3",
            )
            .map_err(ForgeError::Storage)?;
        let existing: Vec<(String, bool, Option<String>, String)> = stmt
            .query_map(params![project, path, now_str], |row| {
                Ok((row.get(0)?, row.get::<_, i64>(1)? != 0, row.get(2)?, row.get(3)?))
            })
            .map_err(ForgeError::Storage)?
            .collect::<rusqlite::Result<_>>()
            .map_err(ForgeError::Storage)?;

        let conflict = existing.iter().find(|(holder, other_exclusive, _, _)| {
            holder != agent && (exclusive || *other_exclusive)
        });
        if let Some((holder, _, reason, expires_at)) = conflict {
            return Err(ForgeError::LockConflict {
                holder: holder.clone(),
                expires_at: expires_at.clone(),
                reason: reason.clone().unwrap_or_default(),
            });
        }

        let expires_at = (now + Duration::seconds(ttl_seconds)).to_rfc3339();
        conn.execute(
            "INSERT INTO file_locks (project, path, holder_agent, exclusive, reason, acquired_at, ttl_seconds, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(project, path, holder_agent) DO UPDATE SET
                exclusive = excluded.exclusive,
                reason = excluded.reason,
                acquired_at = excluded.acquired_at,
                ttl_seconds = excluded.ttl_seconds,
                expires_at = excluded.expires_at",
            params![project, path, agent, exclusive as i64, reason, now_str, ttl_seconds, expires_at],
        )
        .map_err(ForgeError::Storage)?;

        Ok(FileLock {
            project: project.to_string(),
            path: path.to_string(),
            holder_agent: agent.to_string(),
            exclusive,
            reason: reason.map(str::to_string),
            acquired_at: now_str,
            ttl_seconds,
            expires_at,
        })
    }

    pub fn lock_release(&self, project: &str, agent: &str, path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "DELETE FROM file_locks WHERE project = ?1 AND path = ?2 AND holder_agent = ?3",
                params![project, path, agent],
            )
            .map_err(ForgeError::Storage)?;
        if changed == 0 {
            return Err(ForgeError::NotFound(format!("lock on {path} in project {project} held by {agent}")));
        }
        Ok(())
    }

    pub fn lock_renew(&self, project: &str, agent: &str, path: &str, ttl_seconds: i64) -> Result<FileLock> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        purge_expired(&conn, project, path, &now_str)?;

        let row = conn
            .query_row(
                "SELECT exclusive, reason FROM file_locks
                 WHERE project = ?1 AND path = ?2 AND holder_agent = ?3 AND expires_at > ?4",
                params![project, path, agent, now_str],
                |row| Ok((row.get::<_, i64>(0)? != 0, row.get::<_, Option<String>>(1)?)),
            )
            .optional()
            .map_err(ForgeError::Storage)?;
        let (exclusive, reason) = row.ok_or_else(|| {
            ForgeError::NotFound(format!("lock on {path} in project {project} held by {agent}"))
        })?;

        let expires_at = (now + Duration::seconds(ttl_seconds)).to_rfc3339();
        conn.execute(
            "UPDATE file_locks SET ttl_seconds = ?1, expires_at = ?2
             WHERE project = ?3 AND path = ?4 AND holder_agent = ?5",
            params![ttl_seconds, expires_at, project, path, agent],
        )
        .map_err(ForgeError::Storage)?;

        Ok(FileLock {
            project: project.to_string(),
            path: path.to_string(),
            holder_agent: agent.to_string(),
            exclusive,
            reason,
            acquired_at: now_str,
            ttl_seconds,
            expires_at,
        })
    }

    pub fn lock_list(&self, project: &str, path: Option<&str>) -> Result<Vec<FileLock>> {
        let conn = self.conn.lock().unwrap();
        let now_str = Utc::now().to_rfc3339();
        let mut sql = String::from(
            "SELECT path, holder_agent, exclusive, reason, acquired_at, ttl_seconds, expires_at
             FROM file_locks WHERE project = ?1 AND expires_at > ?2",
        );
        if path.is_some() {
            sql.push_str(" AND path = ?3");
        }
        sql.push_str(" ORDER BY path, holder_agent");

        let mut stmt = conn.prepare(&sql).map_err(ForgeError::Storage)?;
        let map_row = |row: &rusqlite::Row| -> rusqlite::Result<FileLock> {
            Ok(FileLock {
                project: project.to_string(),
                path: row.get(0)?,
                holder_agent: row.get(1)?,
                exclusive: row.get::<_, i64>(2)? != 0,
                reason: row.get(3)?,
                acquired_at: row.get(4)?,
                ttl_seconds: row.get(5)?,
                expires_at: row.get(6)?,
            })
        };
        let rows = if let Some(path) = path {
            stmt.query_map(params![project, now_str, path], map_row)
        } else {
            stmt.query_map(params![project, now_str], map_row)
        }
        .map_err(ForgeError::Storage)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(ForgeError::Storage)
    }
}

fn purge_expired(conn: &Connection, project: &str, path: &str, now: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM file_locks WHERE project = ?1 AND path = ?2 AND expires_at <= ?3",
        params![project, path, now],
    )
    .map_err(ForgeError::Storage)?;
    Ok(())
}

fn row_to_message(row: &rusqlite::Row, project: &str, agent: &str) -> rusqlite::Result<MailMessage> {
    let importance: String = row.get(4)?;
    Ok(MailMessage {
        id: row.get(0)?,
        project: project.to_string(),
        agent: agent.to_string(),
        sender: row.get(1)?,
        subject: row.get(2)?,
        body: row.get(3)?,
        importance: importance.parse().unwrap_or(Importance::Normal),
        ack_required: row.get::<_, i64>(5)? != 0,
        thread_id: row.get(6)?,
        created_at: row.get(7)?,
        read_at: row.get(8)?,
        acked_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_assigns_monotonic_per_project_ids() {
        let mail = LocalMail::open_in_memory().unwrap();
        let ids = mail
            .send("proj", "alice", &["bob".into(), "carol".into()], "hi", "body", Importance::Normal, false, None)
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn inbox_is_newest_first_and_joins_status() {
        let mail = LocalMail::open_in_memory().unwrap();
        mail.send("proj", "alice", &["bob".into()], "s1", "b1", Importance::Normal, false, None)
            .unwrap();
        mail.send("proj", "alice", &["bob".into()], "s2", "b2", Importance::Normal, false, None)
            .unwrap();
        let inbox = mail.inbox("proj", "bob", &InboxQuery { include_bodies: true, ..Default::default() }).unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].subject, "s2");
        assert!(inbox[0].read_at.is_none());
    }

    #[test]
    fn read_marks_read_at_and_returns_body() {
        let mail = LocalMail::open_in_memory().unwrap();
        let ids = mail
            .send("proj", "alice", &["bob".into()], "s1", "b1", Importance::Normal, false, None)
            .unwrap();
        let msg = mail.read("proj", "bob", ids[0]).unwrap();
        assert_eq!(msg.body.as_deref(), Some("b1"));

        let inbox = mail.inbox("proj", "bob", &InboxQuery { unread_only: true, ..Default::default() }).unwrap();
        assert!(inbox.is_empty());
    }

    #[test]
    fn ack_requires_existing_message() {
        let mail = LocalMail::open_in_memory().unwrap();
        let err = mail.ack("proj", "bob", 999).unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(_)));
    }

    #[test]
    fn exclusive_lock_conflicts_with_other_holder() {
        let mail = LocalMail::open_in_memory().unwrap();
        mail.lock_acquire("proj", "alice", "src/main.rs", 60, Some("refactor"), true).unwrap();
        let err = mail.lock_acquire("proj", "bob", "src/main.rs", 60, None, false).unwrap_err();
        assert!(matches!(err, ForgeError::LockConflict { .. }));
    }

    #[test]
    fn shared_locks_from_different_agents_do_not_conflict() {
        let mail = LocalMail::open_in_memory().unwrap();
        mail.lock_acquire("proj", "alice", "src/main.rs", 60, None, false).unwrap();
        mail.lock_acquire("proj", "bob", "src/main.rs", 60, None, false).unwrap();
        let locks = mail.lock_list("proj", Some("src/main.rs")).unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn renew_is_restricted_to_the_holder() {
        let mail = LocalMail::open_in_memory().unwrap();
        mail.lock_acquire("proj", "alice", "src/main.rs", 60, None, true).unwrap();
        let err = mail.lock_renew("proj", "bob", "src/main.rs", 120).unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(_)));
        mail.lock_renew("proj", "alice", "src/main.rs", 120).unwrap();
    }

    #[test]
    fn release_then_acquire_by_another_agent_succeeds() {
        let mail = LocalMail::open_in_memory().unwrap();
        mail.lock_acquire("proj", "alice", "src/main.rs", 60, None, true).unwrap();
        mail.lock_release("proj", "alice", "src/main.rs").unwrap();
        mail.lock_acquire("proj", "bob", "src/main.rs", 60, None, true).unwrap();
    }
}
