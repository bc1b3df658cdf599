//! In-process remote task collection.
//!
//! # Responsibility
//! - Provide a `RemoteTaskStore` without any backend, for tests and the CLI.
//! - Offer failure injection and paused delivery so round-trip latency and
//!   write failures can be exercised deterministically.
//!
//! # Invariants
//! - Documents keep insertion order per owner; overwrite keeps position.
//! - While delivery is enabled every write publishes a fresh snapshot to all
//!   listeners of the written owner.

use super::{
    RemoteDocument, RemoteError, RemoteResult, RemoteTaskStore, SnapshotSink, SubscriptionHandle,
};
use crate::model::task::DocumentFields;
use log::debug;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Write operation observed by the in-process store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedWrite {
    Create { id: String },
    Set { id: String },
    Update { id: String, keys: Vec<String> },
    Delete { id: String },
    Batch { ids: Vec<String> },
}

struct Listener {
    handle: u64,
    owner_id: String,
    sink: SnapshotSink,
}

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<String, Vec<RemoteDocument>>,
    listeners: Vec<Listener>,
    next_handle: u64,
    write_failure: Option<RemoteError>,
    subscribe_failure: Option<RemoteError>,
    delivery_paused: bool,
    writes: Vec<RecordedWrite>,
}

impl MemoryState {
    fn collection(&mut self, owner_id: &str) -> &mut Vec<RemoteDocument> {
        self.collections.entry(owner_id.to_string()).or_default()
    }

    fn check_writable(&self) -> RemoteResult<()> {
        match &self.write_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn upsert(&mut self, owner_id: &str, id: &str, fields: DocumentFields) {
        let collection = self.collection(owner_id);
        match collection.iter_mut().find(|doc| doc.id == id) {
            Some(existing) => existing.fields = fields,
            None => collection.push(RemoteDocument::new(id, fields)),
        }
    }

    fn publish(&mut self, owner_id: &str) {
        if self.delivery_paused {
            return;
        }
        let snapshot = self
            .collections
            .get(owner_id)
            .cloned()
            .unwrap_or_default();
        self.listeners.retain(|listener| {
            if listener.owner_id != owner_id {
                return true;
            }
            listener.sink.deliver_snapshot(snapshot.clone())
        });
    }
}

/// Mutex-guarded in-memory keyed-document collection.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    state: Mutex<MemoryState>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every following write fail with `error` until cleared with `None`.
    pub fn set_write_failure(&self, error: Option<RemoteError>) {
        self.lock().write_failure = error;
    }

    /// Makes every following subscribe fail with `error` until cleared.
    pub fn set_subscribe_failure(&self, error: Option<RemoteError>) {
        self.lock().subscribe_failure = error;
    }

    /// Stops snapshot delivery; writes still apply.
    pub fn pause_delivery(&self) {
        self.lock().delivery_paused = true;
    }

    /// Re-enables delivery and publishes every owner with listeners.
    pub fn resume_delivery(&self) {
        let mut state = self.lock();
        state.delivery_paused = false;
        let mut owners = state
            .listeners
            .iter()
            .map(|listener| listener.owner_id.clone())
            .collect::<Vec<_>>();
        owners.sort();
        owners.dedup();
        for owner_id in owners {
            state.publish(&owner_id);
        }
    }

    /// Pushes a listener failure to every listener of `owner_id`.
    pub fn emit_listener_error(&self, owner_id: &str, error: RemoteError) {
        let mut state = self.lock();
        state.listeners.retain(|listener| {
            if listener.owner_id != owner_id {
                return true;
            }
            listener.sink.deliver_error(error.clone())
        });
    }

    /// Inserts a raw document bypassing failure injection, then publishes.
    pub fn insert_document(&self, owner_id: &str, document: RemoteDocument) {
        let mut state = self.lock();
        state.upsert(owner_id, &document.id, document.fields);
        state.publish(owner_id);
    }

    pub fn documents(&self, owner_id: &str) -> Vec<RemoteDocument> {
        self.lock()
            .collections
            .get(owner_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn document(&self, owner_id: &str, id: &str) -> Option<RemoteDocument> {
        self.lock()
            .collections
            .get(owner_id)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id).cloned())
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Successful writes in call order.
    pub fn recorded_writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }
}

impl RemoteTaskStore for InMemoryRemoteStore {
    fn subscribe_tasks(
        &self,
        owner_id: &str,
        sink: SnapshotSink,
    ) -> RemoteResult<SubscriptionHandle> {
        let mut state = self.lock();
        if let Some(err) = state.subscribe_failure.clone() {
            return Err(err);
        }
        state.next_handle += 1;
        let handle = state.next_handle;
        if !state.delivery_paused {
            let snapshot = state
                .collections
                .get(owner_id)
                .cloned()
                .unwrap_or_default();
            sink.deliver_snapshot(snapshot);
        }
        state.listeners.push(Listener {
            handle,
            owner_id: owner_id.to_string(),
            sink,
        });
        debug!("event=remote_subscribe module=remote.memory status=ok handle={handle}");
        Ok(SubscriptionHandle(handle))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.lock()
            .listeners
            .retain(|listener| listener.handle != handle.0);
    }

    fn create_task(&self, owner_id: &str, fields: DocumentFields) -> RemoteResult<String> {
        let mut state = self.lock();
        state.check_writable()?;
        let id = Uuid::new_v4().to_string();
        state.collection(owner_id).push(RemoteDocument::new(&id, fields));
        state.writes.push(RecordedWrite::Create { id: id.clone() });
        state.publish(owner_id);
        Ok(id)
    }

    fn set_task(&self, owner_id: &str, task_id: &str, fields: DocumentFields) -> RemoteResult<()> {
        let mut state = self.lock();
        state.check_writable()?;
        state.upsert(owner_id, task_id, fields);
        state.writes.push(RecordedWrite::Set {
            id: task_id.to_string(),
        });
        state.publish(owner_id);
        Ok(())
    }

    fn update_task_fields(
        &self,
        owner_id: &str,
        task_id: &str,
        partial: DocumentFields,
    ) -> RemoteResult<()> {
        let mut state = self.lock();
        state.check_writable()?;
        let keys = partial.keys().cloned().collect::<Vec<_>>();
        let document = state
            .collection(owner_id)
            .iter_mut()
            .find(|doc| doc.id == task_id)
            .ok_or_else(|| RemoteError::NotFound(task_id.to_string()))?;
        document.fields.extend(partial);
        state.writes.push(RecordedWrite::Update {
            id: task_id.to_string(),
            keys,
        });
        state.publish(owner_id);
        Ok(())
    }

    fn delete_task(&self, owner_id: &str, task_id: &str) -> RemoteResult<()> {
        let mut state = self.lock();
        state.check_writable()?;
        state.collection(owner_id).retain(|doc| doc.id != task_id);
        state.writes.push(RecordedWrite::Delete {
            id: task_id.to_string(),
        });
        state.publish(owner_id);
        Ok(())
    }

    fn batch_set_tasks(
        &self,
        owner_id: &str,
        writes: Vec<(String, DocumentFields)>,
    ) -> RemoteResult<()> {
        let mut state = self.lock();
        state.check_writable()?;
        let ids = writes.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>();
        for (id, fields) in writes {
            state.upsert(owner_id, &id, fields);
        }
        state.writes.push(RecordedWrite::Batch { ids });
        state.publish(owner_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryRemoteStore, RecordedWrite};
    use crate::model::task::{single_field, Task};
    use crate::remote::{RemoteError, RemoteEventKind, RemoteTaskStore, SnapshotSink};
    use std::sync::mpsc;

    fn snapshot_ids(kind: RemoteEventKind) -> Vec<String> {
        match kind {
            RemoteEventKind::Snapshot(docs) => docs.into_iter().map(|doc| doc.id).collect(),
            RemoteEventKind::Failed(err) => panic!("unexpected failure: {err}"),
        }
    }

    #[test]
    fn subscribe_delivers_initial_and_follow_up_snapshots() {
        let store = InMemoryRemoteStore::new();
        store
            .set_task("u1", "a", Task::new("a", "A", 1).to_document())
            .expect("seed write");

        let (tx, rx) = mpsc::channel();
        store
            .subscribe_tasks("u1", SnapshotSink::new(1, tx))
            .expect("subscribe");
        assert_eq!(snapshot_ids(rx.recv().expect("initial").kind), vec!["a"]);

        let created = store
            .create_task("u1", Task::new("", "B", 2).to_document())
            .expect("create");
        assert_eq!(
            snapshot_ids(rx.recv().expect("after create").kind),
            vec!["a".to_string(), created]
        );
    }

    #[test]
    fn owners_are_isolated() {
        let store = InMemoryRemoteStore::new();
        let (tx, rx) = mpsc::channel();
        store
            .subscribe_tasks("u1", SnapshotSink::new(1, tx))
            .expect("subscribe");
        rx.recv().expect("initial");

        store
            .set_task("u2", "x", Task::new("x", "X", 1).to_document())
            .expect("write other owner");
        assert!(rx.try_recv().is_err());
        assert!(store.documents("u1").is_empty());
    }

    #[test]
    fn update_merges_and_reports_missing_document() {
        let store = InMemoryRemoteStore::new();
        store
            .set_task("u1", "a", Task::new("a", "A", 1).to_document())
            .expect("seed");
        store
            .update_task_fields("u1", "a", single_field("isStarred", true))
            .expect("update");
        let doc = store.document("u1", "a").expect("document");
        assert_eq!(doc.fields.get("isStarred"), Some(&serde_json::json!(true)));
        assert_eq!(doc.fields.get("title"), Some(&serde_json::json!("A")));

        let err = store
            .update_task_fields("u1", "missing", single_field("isStarred", true))
            .expect_err("missing document");
        assert_eq!(err, RemoteError::NotFound("missing".to_string()));
    }

    #[test]
    fn injected_failure_blocks_writes_until_cleared() {
        let store = InMemoryRemoteStore::new();
        store.set_write_failure(Some(RemoteError::Unavailable("offline".to_string())));
        assert!(store.delete_task("u1", "a").is_err());
        assert!(store.recorded_writes().is_empty());

        store.set_write_failure(None);
        store.delete_task("u1", "a").expect("delete after clearing failure");
        assert_eq!(
            store.recorded_writes(),
            vec![RecordedWrite::Delete { id: "a".to_string() }]
        );
    }

    #[test]
    fn paused_delivery_holds_snapshots_until_resumed() {
        let store = InMemoryRemoteStore::new();
        let (tx, rx) = mpsc::channel();
        store
            .subscribe_tasks("u1", SnapshotSink::new(1, tx))
            .expect("subscribe");
        rx.recv().expect("initial");

        store.pause_delivery();
        store
            .set_task("u1", "a", Task::new("a", "A", 1).to_document())
            .expect("write");
        assert!(rx.try_recv().is_err());

        store.resume_delivery();
        assert_eq!(snapshot_ids(rx.recv().expect("resumed").kind), vec!["a"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let store = InMemoryRemoteStore::new();
        let (tx, rx) = mpsc::channel();
        let handle = store
            .subscribe_tasks("u1", SnapshotSink::new(1, tx))
            .expect("subscribe");
        rx.recv().expect("initial");
        store.unsubscribe(handle);
        assert_eq!(store.listener_count(), 0);

        store
            .set_task("u1", "a", Task::new("a", "A", 1).to_document())
            .expect("write");
        assert!(rx.try_recv().is_err());
    }
}
