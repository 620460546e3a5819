//! Single-writer actor around the Store, generalizing the state-manager
//! pattern: one `tokio::spawn`-ed task owns the `rusqlite::Connection` and
//! every public method sends a command over an `mpsc` channel, awaiting
//! the reply on a `oneshot` channel. This serializes every mutation
//! through one task the same way a single SQLite writer would, while
//! letting many async callers (CLI commands, daemon RPC handlers,
//! liveness sweeps) share one connection without locking.

use crate::error::{ForgeError, Result};
use crate::model::*;
use crate::queue;
use crate::store::repo::{self, LoopFilter, MoveTo};
use rusqlite::Connection;
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    CreateLoop(Loop, Reply<()>),
    GetLoop(String, Reply<Loop>),
    ListLoops(LoopFilter, Reply<Vec<Loop>>),
    UpdateLoop(Loop, Reply<()>),
    DeleteLoop(String, Reply<()>),

    Enqueue(String, QueueItemType, QueueItemPayload, bool, Reply<LoopQueueItem>),
    ListQueue(String, bool, Reply<Vec<LoopQueueItem>>),
    MoveQueueItem(String, String, MoveToWire, Reply<()>),
    RemoveQueueItem(String, String, Reply<()>),
    ClearQueue(String, Reply<usize>),
    PeekNext(String, LoopState, Option<bool>, Reply<Option<LoopQueueItem>>),
    MarkDispatched(String, Reply<()>),
    MarkDone(String, QueueItemStatus, Reply<()>),

    KvSet(String, String, String, Reply<()>),
    KvGet(String, String, Reply<String>),
    KvList(String, Reply<Vec<LoopKvEntry>>),
    KvDelete(String, String, Reply<()>),

    WorkSet(String, Option<String>, WorkStatus, Option<String>, Option<String>, Reply<()>),
    WorkGet(String, Reply<WorkContext>),
    WorkClear(String, Reply<()>),

    AppendEvent(Event, Reply<()>),
    ListEvents(String, Reply<Vec<Event>>),

    Shutdown,
}

#[derive(Clone, Copy)]
pub enum MoveToWire {
    Front,
    Back,
}

impl From<MoveToWire> for MoveTo {
    fn from(v: MoveToWire) -> Self {
        match v {
            MoveToWire::Front => MoveTo::Front,
            MoveToWire::Back => MoveTo::Back,
        }
    }
}

/// Handle shared across every async caller. Cloning is cheap (one `mpsc::Sender`).
#[derive(Clone)]
pub struct Store {
    tx: mpsc::Sender<Command>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = crate::store::connection::open(path)?;
        Ok(Self::spawn(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = crate::store::connection::open_in_memory()?;
        Ok(Self::spawn(conn))
    }

    fn spawn(conn: Connection) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(conn, rx));
        Self { tx }
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| ForgeError::ChannelClosed("store actor gone".into()))?;
        reply_rx
            .await
            .map_err(|_| ForgeError::ChannelClosed("store actor dropped reply".into()))?
    }

    pub async fn create_loop(&self, l: Loop) -> Result<()> {
        self.call(|r| Command::CreateLoop(l, r)).await
    }

    pub async fn get_loop(&self, reference: &str) -> Result<Loop> {
        self.call(|r| Command::GetLoop(reference.to_string(), r)).await
    }

    pub async fn list_loops(&self, filter: LoopFilter) -> Result<Vec<Loop>> {
        self.call(|r| Command::ListLoops(filter, r)).await
    }

    pub async fn update_loop(&self, l: Loop) -> Result<()> {
        self.call(|r| Command::UpdateLoop(l, r)).await
    }

    pub async fn delete_loop(&self, id: &str) -> Result<()> {
        self.call(|r| Command::DeleteLoop(id.to_string(), r)).await
    }

    pub async fn enqueue(
        &self,
        loop_id: &str,
        item_type: QueueItemType,
        payload: QueueItemPayload,
        front: bool,
    ) -> Result<LoopQueueItem> {
        let loop_id = loop_id.to_string();
        self.call(|r| Command::Enqueue(loop_id, item_type, payload, front, r)).await
    }

    pub async fn list_queue(&self, loop_id: &str, include_all: bool) -> Result<Vec<LoopQueueItem>> {
        let loop_id = loop_id.to_string();
        self.call(|r| Command::ListQueue(loop_id, include_all, r)).await
    }

    pub async fn move_queue_item(&self, loop_id: &str, item_id: &str, to: MoveToWire) -> Result<()> {
        let loop_id = loop_id.to_string();
        let item_id = item_id.to_string();
        self.call(|r| Command::MoveQueueItem(loop_id, item_id, to, r)).await
    }

    pub async fn remove_queue_item(&self, loop_id: &str, item_id: &str) -> Result<()> {
        let loop_id = loop_id.to_string();
        let item_id = item_id.to_string();
        self.call(|r| Command::RemoveQueueItem(loop_id, item_id, r)).await
    }

    pub async fn clear_queue(&self, loop_id: &str) -> Result<usize> {
        let loop_id = loop_id.to_string();
        self.call(|r| Command::ClearQueue(loop_id, r)).await
    }

    /// `previous_ok` is `None` when no iteration has run yet.
    pub async fn peek_next(
        &self,
        loop_id: &str,
        state: LoopState,
        previous_ok: Option<bool>,
    ) -> Result<Option<LoopQueueItem>> {
        let loop_id = loop_id.to_string();
        self.call(|r| Command::PeekNext(loop_id, state, previous_ok, r)).await
    }

    pub async fn mark_dispatched(&self, item_id: &str) -> Result<()> {
        let item_id = item_id.to_string();
        self.call(|r| Command::MarkDispatched(item_id, r)).await
    }

    pub async fn mark_done(&self, item_id: &str, outcome: QueueItemStatus) -> Result<()> {
        let item_id = item_id.to_string();
        self.call(|r| Command::MarkDone(item_id, outcome, r)).await
    }

    pub async fn kv_set(&self, loop_id: &str, key: &str, value: &str) -> Result<()> {
        let (loop_id, key, value) = (loop_id.to_string(), key.to_string(), value.to_string());
        self.call(|r| Command::KvSet(loop_id, key, value, r)).await
    }

    pub async fn kv_get(&self, loop_id: &str, key: &str) -> Result<String> {
        let (loop_id, key) = (loop_id.to_string(), key.to_string());
        self.call(|r| Command::KvGet(loop_id, key, r)).await
    }

    pub async fn kv_list(&self, loop_id: &str) -> Result<Vec<LoopKvEntry>> {
        let loop_id = loop_id.to_string();
        self.call(|r| Command::KvList(loop_id, r)).await
    }

    pub async fn kv_delete(&self, loop_id: &str, key: &str) -> Result<()> {
        let (loop_id, key) = (loop_id.to_string(), key.to_string());
        self.call(|r| Command::KvDelete(loop_id, key, r)).await
    }

    pub async fn work_set(
        &self,
        loop_id: &str,
        task_id: Option<String>,
        status: WorkStatus,
        detail: Option<String>,
        agent: Option<String>,
    ) -> Result<()> {
        let loop_id = loop_id.to_string();
        self.call(|r| Command::WorkSet(loop_id, task_id, status, detail, agent, r)).await
    }

    pub async fn work_get(&self, loop_id: &str) -> Result<WorkContext> {
        let loop_id = loop_id.to_string();
        self.call(|r| Command::WorkGet(loop_id, r)).await
    }

    pub async fn work_clear(&self, loop_id: &str) -> Result<()> {
        let loop_id = loop_id.to_string();
        self.call(|r| Command::WorkClear(loop_id, r)).await
    }

    pub async fn append_event(&self, event: Event) -> Result<()> {
        self.call(|r| Command::AppendEvent(event, r)).await
    }

    pub async fn list_events(&self, entity_id: &str) -> Result<Vec<Event>> {
        let entity_id = entity_id.to_string();
        self.call(|r| Command::ListEvents(entity_id, r)).await
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }
}

async fn actor_loop(conn: Connection, mut rx: mpsc::Receiver<Command>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::CreateLoop(l, reply) => {
                debug!(loop_id = %l.id, "store: create_loop");
                let _ = reply.send(repo::create_loop(&conn, &l));
            }
            Command::GetLoop(reference, reply) => {
                let _ = reply.send(repo::get_loop(&conn, &reference));
            }
            Command::ListLoops(filter, reply) => {
                let _ = reply.send(repo::list_loops(&conn, &filter));
            }
            Command::UpdateLoop(l, reply) => {
                debug!(loop_id = %l.id, state = %l.state, "store: update_loop");
                let _ = reply.send(repo::update_loop(&conn, &l));
            }
            Command::DeleteLoop(id, reply) => {
                debug!(loop_id = %id, "store: delete_loop");
                let _ = reply.send(repo::delete_loop(&conn, &id));
            }
            Command::Enqueue(loop_id, item_type, payload, front, reply) => {
                let _ = reply.send(repo::enqueue(&conn, &loop_id, item_type, payload, front));
            }
            Command::ListQueue(loop_id, include_all, reply) => {
                let _ = reply.send(repo::list_items(&conn, &loop_id, include_all));
            }
            Command::MoveQueueItem(loop_id, item_id, to, reply) => {
                let _ = reply.send(repo::move_item(&conn, &loop_id, &item_id, to.into()));
            }
            Command::RemoveQueueItem(loop_id, item_id, reply) => {
                let _ = reply.send(repo::remove_item(&conn, &loop_id, &item_id));
            }
            Command::ClearQueue(loop_id, reply) => {
                let _ = reply.send(repo::clear_queue(&conn, &loop_id));
            }
            Command::PeekNext(loop_id, state, previous_ok, reply) => {
                let result = repo::peek_next_candidates(&conn, &loop_id)
                    .map(|candidates| queue::peek_next(&candidates, state, previous_ok));
                let _ = reply.send(result);
            }
            Command::MarkDispatched(item_id, reply) => {
                let _ = reply.send(repo::mark_dispatched(&conn, &item_id));
            }
            Command::MarkDone(item_id, outcome, reply) => {
                let _ = reply.send(repo::mark_done(&conn, &item_id, outcome));
            }
            Command::KvSet(loop_id, key, value, reply) => {
                let _ = reply.send(repo::kv_set(&conn, &loop_id, &key, &value));
            }
            Command::KvGet(loop_id, key, reply) => {
                let _ = reply.send(repo::kv_get(&conn, &loop_id, &key));
            }
            Command::KvList(loop_id, reply) => {
                let _ = reply.send(repo::kv_list(&conn, &loop_id));
            }
            Command::KvDelete(loop_id, key, reply) => {
                let _ = reply.send(repo::kv_delete(&conn, &loop_id, &key));
            }
            Command::WorkSet(loop_id, task_id, status, detail, agent, reply) => {
                let _ = reply.send(repo::work_set(
                    &conn,
                    &loop_id,
                    task_id.as_deref(),
                    status,
                    detail.as_deref(),
                    agent.as_deref(),
                ));
            }
            Command::WorkGet(loop_id, reply) => {
                let _ = reply.send(repo::work_get(&conn, &loop_id));
            }
            Command::WorkClear(loop_id, reply) => {
                let _ = reply.send(repo::work_clear(&conn, &loop_id));
            }
            Command::AppendEvent(event, reply) => {
                let _ = reply.send(repo::append_event(&conn, &event));
            }
            Command::ListEvents(entity_id, reply) => {
                let _ = reply.send(repo::list_events_for_entity(&conn, &entity_id));
            }
            Command::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_loop(name: &str) -> Loop {
        let (id, short_id) = crate::ids::generate_loop_id();
        let now = chrono::Utc::now().to_rfc3339();
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
            created_at: now.clone(),
            updated_at: now,
            last_run_at: None,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_through_the_actor() {
        let store = Store::open_in_memory().unwrap();
        let l = fresh_loop("actor-1");
        store.create_loop(l.clone()).await.unwrap();
        let fetched = store.get_loop(&l.name).await.unwrap();
        assert_eq!(fetched.id, l.id);
    }

    #[tokio::test]
    async fn delete_missing_loop_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store.delete_loop("missing").await.unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn kv_round_trip_through_the_actor() {
        let store = Store::open_in_memory().unwrap();
        let l = fresh_loop("actor-kv");
        store.create_loop(l.clone()).await.unwrap();
        store.kv_set(&l.id, "k", "v").await.unwrap();
        assert_eq!(store.kv_get(&l.id, "k").await.unwrap(), "v");
    }
}
