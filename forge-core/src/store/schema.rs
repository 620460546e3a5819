//! Forward-only, idempotent schema migrations.

use rusqlite::Connection;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_loops",
        "CREATE TABLE IF NOT EXISTS loops (
            id TEXT PRIMARY KEY,
            short_id TEXT NOT NULL,
            name TEXT NOT NULL UNIQUE,
            repo_path TEXT NOT NULL,
            base_prompt_path TEXT,
            base_prompt_msg TEXT,
            interval_seconds INTEGER NOT NULL DEFAULT 0,
            max_iterations INTEGER NOT NULL DEFAULT 0,
            max_runtime_seconds INTEGER NOT NULL DEFAULT 0,
            pool_id TEXT,
            profile_id TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            state TEXT NOT NULL,
            last_error TEXT,
            log_path TEXT NOT NULL,
            ledger_path TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            iteration_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_run_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_loops_short_id ON loops(short_id);
        CREATE INDEX IF NOT EXISTS idx_loops_state ON loops(state);",
    ),
    (
        "0002_loop_queue_items",
        "CREATE TABLE IF NOT EXISTS loop_queue_items (
            id TEXT PRIMARY KEY,
            loop_id TEXT NOT NULL REFERENCES loops(id),
            item_type TEXT NOT NULL,
            status TEXT NOT NULL,
            position INTEGER NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            dispatched_at TEXT,
            completed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_queue_loop_position
            ON loop_queue_items(loop_id, position);",
    ),
    (
        "0003_loop_kv",
        "CREATE TABLE IF NOT EXISTS loop_kv (
            id TEXT PRIMARY KEY,
            loop_id TEXT NOT NULL REFERENCES loops(id),
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(loop_id, key)
        );",
    ),
    (
        "0004_work_context",
        "CREATE TABLE IF NOT EXISTS work_context (
            loop_id TEXT PRIMARY KEY REFERENCES loops(id),
            task_id TEXT,
            status TEXT NOT NULL,
            detail TEXT,
            agent TEXT,
            updated_at TEXT NOT NULL
        );",
    ),
    (
        "0005_events",
        "CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);",
    ),
];

pub fn apply(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE name = ?1)",
            [name],
            |row| row.get(0),
        )?;
        if already {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, ?2)",
            rusqlite::params![name, chrono::Utc::now().to_rfc3339()],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn).unwrap();
        apply(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count as usize, MIGRATIONS.len());
    }
}
