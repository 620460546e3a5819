//! Synchronous row-level operations. One call per SQL statement or
//! transaction; the actor in `engine.rs` is the only caller in production,
//! but every function here is independently testable against an
//! in-memory connection.

use crate::error::{ForgeError, Result};
use crate::ids::{resolve_loop_ref, LoopHandle, Resolution};
use crate::model::*;
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ---------------------------------------------------------------- Loops ---

pub fn create_loop(conn: &Connection, l: &Loop) -> Result<()> {
    conn.execute(
        "INSERT INTO loops (id, short_id, name, repo_path, base_prompt_path, base_prompt_msg,
            interval_seconds, max_iterations, max_runtime_seconds, pool_id, profile_id, tags,
            state, last_error, log_path, ledger_path, metadata, iteration_count,
            created_at, updated_at, last_run_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21)",
        params![
            l.id,
            l.short_id,
            l.name,
            l.repo_path,
            l.base_prompt_path,
            l.base_prompt_msg,
            l.interval_seconds as i64,
            l.max_iterations as i64,
            l.max_runtime_seconds as i64,
            l.pool_id,
            l.profile_id,
            serde_json::to_string(&l.tags).unwrap(),
            l.state.to_string(),
            l.last_error,
            l.log_path,
            l.ledger_path,
            l.metadata.to_string(),
            l.iteration_count as i64,
            l.created_at,
            l.updated_at,
            l.last_run_at,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref se, _)
            if se.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            ForgeError::InvalidArgument(format!("loop name '{}' already exists", l.name))
        }
        other => ForgeError::Storage(other),
    })?;
    Ok(())
}

fn row_to_loop(row: &rusqlite::Row) -> rusqlite::Result<Loop> {
    let tags_json: String = row.get("tags")?;
    let metadata_json: String = row.get("metadata")?;
    let state_str: String = row.get("state")?;
    Ok(Loop {
        id: row.get("id")?,
        short_id: row.get("short_id")?,
        name: row.get("name")?,
        repo_path: row.get("repo_path")?,
        base_prompt_path: row.get("base_prompt_path")?,
        base_prompt_msg: row.get("base_prompt_msg")?,
        interval_seconds: row.get::<_, i64>("interval_seconds")? as u64,
        max_iterations: row.get::<_, i64>("max_iterations")? as u64,
        max_runtime_seconds: row.get::<_, i64>("max_runtime_seconds")? as u64,
        pool_id: row.get("pool_id")?,
        profile_id: row.get("profile_id")?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        state: LoopState::from_str(&state_str).unwrap_or(LoopState::Error),
        last_error: row.get("last_error")?,
        log_path: row.get("log_path")?,
        ledger_path: row.get("ledger_path")?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
        iteration_count: row.get::<_, i64>("iteration_count")? as u64,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        last_run_at: row.get("last_run_at")?,
    })
}

/// Resolves `reference` against the live loop table: exact short_id
/// (case-insensitive), then exact id, then exact name, then a unique
/// short_id or id prefix.
pub fn get_loop(conn: &Connection, reference: &str) -> Result<Loop> {
    let mut stmt = conn.prepare("SELECT id, short_id, name FROM loops")?;
    let universe: Vec<LoopHandle> = stmt
        .query_map([], |row| {
            Ok(LoopHandle {
                id: row.get(0)?,
                short_id: row.get(1)?,
                name: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    let id = match resolve_loop_ref(&universe, reference) {
        Resolution::Found(id) => id,
        Resolution::NotFound => return Err(ForgeError::NotFound(format!("loop '{reference}'"))),
        Resolution::Ambiguous(candidates) => return Err(ForgeError::Ambiguous(candidates)),
    };

    conn.query_row(
        "SELECT * FROM loops WHERE id = ?1",
        params![id],
        row_to_loop,
    )
    .map_err(ForgeError::Storage)
}

#[derive(Debug, Default, Clone)]
pub struct LoopFilter {
    pub repo_path: Option<String>,
    pub pool_id: Option<String>,
    pub profile_id: Option<String>,
    pub state: Option<LoopState>,
    pub tag: Option<String>,
}

pub fn list_loops(conn: &Connection, filter: &LoopFilter) -> Result<Vec<Loop>> {
    let mut stmt = conn.prepare("SELECT * FROM loops ORDER BY created_at ASC")?;
    let rows: Vec<Loop> = stmt
        .query_map([], row_to_loop)?
        .collect::<rusqlite::Result<_>>()?;

    Ok(rows
        .into_iter()
        .filter(|l| filter.repo_path.as_deref().is_none_or(|v| l.repo_path == v))
        .filter(|l| filter.pool_id.as_deref() == l.pool_id.as_deref() || filter.pool_id.is_none())
        .filter(|l| {
            filter.profile_id.as_deref() == l.profile_id.as_deref() || filter.profile_id.is_none()
        })
        .filter(|l| filter.state.is_none_or(|s| l.state == s))
        .filter(|l| filter.tag.as_ref().is_none_or(|t| l.tags.contains(t)))
        .collect())
}

pub fn update_loop(conn: &Connection, l: &Loop) -> Result<()> {
    let changed = conn.execute(
        "UPDATE loops SET repo_path=?2, base_prompt_path=?3, base_prompt_msg=?4,
            interval_seconds=?5, max_iterations=?6, max_runtime_seconds=?7, pool_id=?8,
            profile_id=?9, tags=?10, state=?11, last_error=?12, log_path=?13, ledger_path=?14,
            metadata=?15, iteration_count=?16, updated_at=?17, last_run_at=?18
         WHERE id=?1",
        params![
            l.id,
            l.repo_path,
            l.base_prompt_path,
            l.base_prompt_msg,
            l.interval_seconds as i64,
            l.max_iterations as i64,
            l.max_runtime_seconds as i64,
            l.pool_id,
            l.profile_id,
            serde_json::to_string(&l.tags).unwrap(),
            l.state.to_string(),
            l.last_error,
            l.log_path,
            l.ledger_path,
            l.metadata.to_string(),
            l.iteration_count as i64,
            now(),
            l.last_run_at,
        ],
    )?;
    if changed == 0 {
        return Err(ForgeError::NotFound(format!("loop '{}'", l.id)));
    }
    Ok(())
}

pub fn delete_loop(conn: &Connection, id: &str) -> Result<()> {
    let changed = conn.execute("DELETE FROM loops WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(ForgeError::NotFound(format!("loop '{id}'")));
    }
    Ok(())
}

// ---------------------------------------------------------- Queue items ---

pub fn enqueue(
    conn: &Connection,
    loop_id: &str,
    item_type: QueueItemType,
    payload: QueueItemPayload,
    front: bool,
) -> Result<LoopQueueItem> {
    let position: i64 = if front {
        let min: Option<i64> = conn
            .query_row(
                "SELECT MIN(position) FROM loop_queue_items WHERE loop_id = ?1 AND status = 'pending'",
                params![loop_id],
                |r| r.get(0),
            )
            .optional()?
            .flatten();
        min.unwrap_or(0) - 1
    } else {
        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(position) FROM loop_queue_items WHERE loop_id = ?1",
                params![loop_id],
                |r| r.get(0),
            )
            .optional()?
            .flatten();
        max.unwrap_or(0) + 1
    };

    let item = LoopQueueItem {
        id: uuid::Uuid::now_v7().simple().to_string(),
        loop_id: loop_id.to_string(),
        item_type,
        status: QueueItemStatus::Pending,
        position,
        payload,
        created_at: now(),
        dispatched_at: None,
        completed_at: None,
    };

    conn.execute(
        "INSERT INTO loop_queue_items (id, loop_id, item_type, status, position, payload, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7)",
        params![
            item.id,
            item.loop_id,
            item.item_type.to_string(),
            item.status.to_string(),
            item.position,
            serde_json::to_string(&item.payload).unwrap(),
            item.created_at,
        ],
    )?;
    Ok(item)
}

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<LoopQueueItem> {
    let item_type_str: String = row.get("item_type")?;
    let status_str: String = row.get("status")?;
    let payload_json: String = row.get("payload")?;
    Ok(LoopQueueItem {
        id: row.get("id")?,
        loop_id: row.get("loop_id")?,
        item_type: QueueItemType::from_str(&item_type_str).unwrap(),
        status: QueueItemStatus::from_str(&status_str).unwrap(),
        position: row.get("position")?,
        payload: serde_json::from_str(&payload_json).unwrap(),
        created_at: row.get("created_at")?,
        dispatched_at: row.get("dispatched_at")?,
        completed_at: row.get("completed_at")?,
    })
}

/// Lists a loop's queue items. Terminal (done/failed/canceled) items are
/// hidden unless `include_all` is set.
pub fn list_items(conn: &Connection, loop_id: &str, include_all: bool) -> Result<Vec<LoopQueueItem>> {
    let sql = if include_all {
        "SELECT * FROM loop_queue_items WHERE loop_id = ?1 ORDER BY position ASC, created_at ASC"
    } else {
        "SELECT * FROM loop_queue_items WHERE loop_id = ?1 AND status IN ('pending','dispatched')
         ORDER BY position ASC, created_at ASC"
    };
    let mut stmt = conn.prepare(sql)?;
    Ok(stmt
        .query_map(params![loop_id], row_to_item)?
        .collect::<rusqlite::Result<_>>()?)
}

pub enum MoveTo {
    Front,
    Back,
}

pub fn move_item(conn: &Connection, loop_id: &str, item_id: &str, to: MoveTo) -> Result<()> {
    let new_position = match to {
        MoveTo::Front => {
            let min: Option<i64> = conn
                .query_row(
                    "SELECT MIN(position) FROM loop_queue_items WHERE loop_id = ?1",
                    params![loop_id],
                    |r| r.get(0),
                )
                .optional()?
                .flatten();
            min.unwrap_or(0) - 1
        }
        MoveTo::Back => {
            let max: Option<i64> = conn
                .query_row(
                    "SELECT MAX(position) FROM loop_queue_items WHERE loop_id = ?1",
                    params![loop_id],
                    |r| r.get(0),
                )
                .optional()?
                .flatten();
            max.unwrap_or(0) + 1
        }
    };
    let changed = conn.execute(
        "UPDATE loop_queue_items SET position = ?1 WHERE id = ?2 AND loop_id = ?3",
        params![new_position, item_id, loop_id],
    )?;
    if changed == 0 {
        return Err(ForgeError::NotFound(format!("queue item '{item_id}'")));
    }
    Ok(())
}

pub fn remove_item(conn: &Connection, loop_id: &str, item_id: &str) -> Result<()> {
    let changed = conn.execute(
        "DELETE FROM loop_queue_items WHERE id = ?1 AND loop_id = ?2 AND status = 'pending'",
        params![item_id, loop_id],
    )?;
    if changed == 0 {
        return Err(ForgeError::InvalidState(format!(
            "queue item '{item_id}' is not pending or does not exist"
        )));
    }
    Ok(())
}

pub fn clear_queue(conn: &Connection, loop_id: &str) -> Result<usize> {
    let n = conn.execute(
        "DELETE FROM loop_queue_items WHERE loop_id = ?1 AND status = 'pending'",
        params![loop_id],
    )?;
    Ok(n)
}

/// Returns the next dispatchable item honoring `kill_now` preemption; the
/// caller (Queue Engine) is responsible for conditional gating since that
/// needs live loop state that this row-level function does not have.
pub fn peek_next_candidates(conn: &Connection, loop_id: &str) -> Result<Vec<LoopQueueItem>> {
    list_items(conn, loop_id, false).map(|mut items| {
        items.retain(|i| i.status == QueueItemStatus::Pending);
        items
    })
}

pub fn mark_dispatched(conn: &Connection, item_id: &str) -> Result<()> {
    let changed = conn.execute(
        "UPDATE loop_queue_items SET status = 'dispatched', dispatched_at = ?2
         WHERE id = ?1 AND status = 'pending'",
        params![item_id, now()],
    )?;
    if changed == 0 {
        return Err(ForgeError::InvalidState(format!(
            "queue item '{item_id}' is not pending"
        )));
    }
    Ok(())
}

pub fn mark_done(conn: &Connection, item_id: &str, outcome: QueueItemStatus) -> Result<()> {
    let changed = conn.execute(
        "UPDATE loop_queue_items SET status = ?2, completed_at = ?3
         WHERE id = ?1 AND status = 'dispatched'",
        params![item_id, outcome.to_string(), now()],
    )?;
    if changed == 0 {
        return Err(ForgeError::InvalidState(format!(
            "queue item '{item_id}' is not dispatched"
        )));
    }
    Ok(())
}

// --------------------------------------------------------------- LoopKV ---

pub fn kv_set(conn: &Connection, loop_id: &str, key: &str, value: &str) -> Result<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM loop_kv WHERE loop_id = ?1 AND key = ?2",
            params![loop_id, key],
            |r| r.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE loop_kv SET value = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, value, now()],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO loop_kv (id, loop_id, key, value, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?5)",
                params![
                    uuid::Uuid::now_v7().simple().to_string(),
                    loop_id,
                    key,
                    value,
                    now(),
                ],
            )?;
        }
    }
    Ok(())
}

pub fn kv_get(conn: &Connection, loop_id: &str, key: &str) -> Result<String> {
    conn.query_row(
        "SELECT value FROM loop_kv WHERE loop_id = ?1 AND key = ?2",
        params![loop_id, key],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| ForgeError::NotFound(format!("kv key '{key}'")))
}

pub fn kv_list(conn: &Connection, loop_id: &str) -> Result<Vec<LoopKvEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, loop_id, key, value, created_at, updated_at FROM loop_kv WHERE loop_id = ?1 ORDER BY key ASC",
    )?;
    Ok(stmt
        .query_map(params![loop_id], |row| {
            Ok(LoopKvEntry {
                id: row.get(0)?,
                loop_id: row.get(1)?,
                key: row.get(2)?,
                value: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?)
}

pub fn kv_delete(conn: &Connection, loop_id: &str, key: &str) -> Result<()> {
    let changed = conn.execute(
        "DELETE FROM loop_kv WHERE loop_id = ?1 AND key = ?2",
        params![loop_id, key],
    )?;
    if changed == 0 {
        return Err(ForgeError::NotFound(format!("kv key '{key}'")));
    }
    Ok(())
}

// ---------------------------------------------------------- WorkContext ---

pub fn work_set(
    conn: &Connection,
    loop_id: &str,
    task_id: Option<&str>,
    status: WorkStatus,
    detail: Option<&str>,
    agent: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO work_context (loop_id, task_id, status, detail, agent, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6)
         ON CONFLICT(loop_id) DO UPDATE SET
            task_id = excluded.task_id,
            status = excluded.status,
            detail = excluded.detail,
            agent = excluded.agent,
            updated_at = excluded.updated_at",
        params![loop_id, task_id, status.to_string(), detail, agent, now()],
    )?;
    Ok(())
}

pub fn work_get(conn: &Connection, loop_id: &str) -> Result<WorkContext> {
    conn.query_row(
        "SELECT loop_id, task_id, status, detail, agent, updated_at FROM work_context WHERE loop_id = ?1",
        params![loop_id],
        |row| {
            let status_str: String = row.get(2)?;
            Ok(WorkContext {
                loop_id: row.get(0)?,
                task_id: row.get(1)?,
                status: WorkStatus::from_str(&status_str).unwrap_or_default(),
                detail: row.get(3)?,
                agent: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
    .optional()?
    .map(Ok)
    .unwrap_or_else(|| Ok(WorkContext::empty(loop_id)))
}

pub fn work_clear(conn: &Connection, loop_id: &str) -> Result<()> {
    work_set(conn, loop_id, None, WorkStatus::None, None, None)
}

// ------------------------------------------------------------- Events ----

pub fn append_event(conn: &Connection, event: &Event) -> Result<()> {
    conn.execute(
        "INSERT INTO events (id, timestamp, event_type, entity_type, entity_id, payload)
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![
            event.id,
            event.timestamp,
            event.event_type,
            event.entity_type,
            event.entity_id,
            event.payload.to_string(),
        ],
    )?;
    Ok(())
}

pub fn list_events_for_entity(conn: &Connection, entity_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, event_type, entity_type, entity_id, payload FROM events
         WHERE entity_id = ?1 ORDER BY timestamp ASC, id ASC",
    )?;
    Ok(stmt
        .query_map(params![entity_id], |row| {
            let payload_json: String = row.get(5)?;
            Ok(Event {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                payload: serde_json::from_str(&payload_json).unwrap_or(serde_json::Value::Null),
            })
        })?
        .collect::<rusqlite::Result<_>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::connection::open_in_memory;

    fn fresh_loop(name: &str) -> Loop {
        let (id, short_id) = crate::ids::generate_loop_id();
        Loop {
            id,
            short_id,
            name: name.to_string(),
            repo_path: "/repo".into(),
            base_prompt_path: None,
            base_prompt_msg: Some("go".into()),
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
            metadata: serde_json::json!({}),
            iteration_count: 0,
            created_at: now(),
            updated_at: now(),
            last_run_at: None,
        }
    }

    #[test]
    fn create_and_get_loop_by_name() {
        let conn = open_in_memory().unwrap();
        let l = fresh_loop("oracle-main");
        create_loop(&conn, &l).unwrap();
        let fetched = get_loop(&conn, "oracle-main").unwrap();
        assert_eq!(fetched.id, l.id);
    }

    #[test]
    fn duplicate_name_is_invalid_argument() {
        let conn = open_in_memory().unwrap();
        create_loop(&conn, &fresh_loop("dup")).unwrap();
        let err = create_loop(&conn, &fresh_loop("dup")).unwrap_err();
        assert!(matches!(err, ForgeError::InvalidArgument(_)));
    }

    #[test]
    fn get_loop_not_found_on_empty_store() {
        let conn = open_in_memory().unwrap();
        assert!(matches!(
            get_loop(&conn, "nope").unwrap_err(),
            ForgeError::NotFound(_)
        ));
    }

    #[test]
    fn enqueue_front_precedes_existing_pending() {
        let conn = open_in_memory().unwrap();
        let l = fresh_loop("q1");
        create_loop(&conn, &l).unwrap();
        enqueue(
            &conn,
            &l.id,
            QueueItemType::Message,
            QueueItemPayload::Message { text: "first".into() },
            false,
        )
        .unwrap();
        enqueue(
            &conn,
            &l.id,
            QueueItemType::Message,
            QueueItemPayload::Message { text: "front".into() },
            true,
        )
        .unwrap();
        let items = list_items(&conn, &l.id, false).unwrap();
        assert_eq!(items.len(), 2);
        match &items[0].payload {
            QueueItemPayload::Message { text } => assert_eq!(text, "front"),
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn remove_only_allowed_while_pending() {
        let conn = open_in_memory().unwrap();
        let l = fresh_loop("q2");
        create_loop(&conn, &l).unwrap();
        let item = enqueue(
            &conn,
            &l.id,
            QueueItemType::Message,
            QueueItemPayload::Message { text: "x".into() },
            false,
        )
        .unwrap();
        mark_dispatched(&conn, &item.id).unwrap();
        assert!(remove_item(&conn, &l.id, &item.id).is_err());
    }

    #[test]
    fn clear_queue_leaves_dispatched_items() {
        let conn = open_in_memory().unwrap();
        let l = fresh_loop("q3");
        create_loop(&conn, &l).unwrap();
        let a = enqueue(
            &conn,
            &l.id,
            QueueItemType::Message,
            QueueItemPayload::Message { text: "a".into() },
            false,
        )
        .unwrap();
        enqueue(
            &conn,
            &l.id,
            QueueItemType::Message,
            QueueItemPayload::Message { text: "b".into() },
            false,
        )
        .unwrap();
        mark_dispatched(&conn, &a.id).unwrap();
        let n = clear_queue(&conn, &l.id).unwrap();
        assert_eq!(n, 1);
        assert_eq!(list_items(&conn, &l.id, true).unwrap().len(), 1);
    }

    #[test]
    fn kv_set_get_delete_round_trip() {
        let conn = open_in_memory().unwrap();
        let l = fresh_loop("kv1");
        create_loop(&conn, &l).unwrap();
        kv_set(&conn, &l.id, "k", "v1").unwrap();
        assert_eq!(kv_get(&conn, &l.id, "k").unwrap(), "v1");
        kv_set(&conn, &l.id, "k", "v2").unwrap();
        assert_eq!(kv_get(&conn, &l.id, "k").unwrap(), "v2");
        kv_delete(&conn, &l.id, "k").unwrap();
        assert!(matches!(
            kv_get(&conn, &l.id, "k").unwrap_err(),
            ForgeError::NotFound(_)
        ));
    }

    #[test]
    fn work_context_defaults_to_none_status() {
        let conn = open_in_memory().unwrap();
        let l = fresh_loop("wc1");
        create_loop(&conn, &l).unwrap();
        let wc = work_get(&conn, &l.id).unwrap();
        assert_eq!(wc.status, WorkStatus::None);
    }

    #[test]
    fn work_set_then_clear_resets_to_none() {
        let conn = open_in_memory().unwrap();
        let l = fresh_loop("wc2");
        create_loop(&conn, &l).unwrap();
        work_set(&conn, &l.id, Some("task-1"), WorkStatus::InProgress, None, None).unwrap();
        assert_eq!(work_get(&conn, &l.id).unwrap().status, WorkStatus::InProgress);
        work_clear(&conn, &l.id).unwrap();
        assert_eq!(work_get(&conn, &l.id).unwrap().status, WorkStatus::None);
    }

    #[test]
    fn events_ordered_by_timestamp() {
        let conn = open_in_memory().unwrap();
        append_event(
            &conn,
            &Event::new("loop.state_changed", "loop", "l1", serde_json::json!({"from":"a"})),
        )
        .unwrap();
        append_event(
            &conn,
            &Event::new("loop.state_changed", "loop", "l1", serde_json::json!({"from":"b"})),
        )
        .unwrap();
        let events = list_events_for_entity(&conn, "l1").unwrap();
        assert_eq!(events.len(), 2);
    }
}
