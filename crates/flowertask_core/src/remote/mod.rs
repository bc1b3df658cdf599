//! Remote task collection contract.
//!
//! # Responsibility
//! - Define the adapter interface over a per-owner keyed-document
//!   collection (subscribe, create, set, update, delete, batch set).
//! - Carry snapshot and error events from adapters to the collection store.
//!
//! # Invariants
//! - Adapters never call back into the store; they only push events into
//!   the store-owned channel through a `SnapshotSink`.
//! - A snapshot always lists every document of the owner collection.

pub mod memory;
pub mod sqlite;

use crate::model::task::DocumentFields;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::Sender;

pub use memory::InMemoryRemoteStore;
pub use sqlite::SqliteRemoteStore;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Adapter-level failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Backend cannot be reached.
    Unavailable(String),
    /// Target document does not exist.
    NotFound(String),
    /// Backend refused the request (permissions, quota, validation).
    Rejected { code: String, message: String },
    /// Local storage failure inside the adapter.
    Storage(String),
    /// Document fields could not be encoded or decoded.
    Encoding(String),
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(details) => write!(f, "remote store unavailable: {details}"),
            Self::NotFound(id) => write!(f, "remote document not found: {id}"),
            Self::Rejected { code, message } => {
                write!(f, "remote store rejected request ({code}): {message}")
            }
            Self::Storage(details) => write!(f, "remote storage failure: {details}"),
            Self::Encoding(details) => write!(f, "document encoding failure: {details}"),
        }
    }
}

impl Error for RemoteError {}

/// One keyed document as delivered in a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub fields: DocumentFields,
}

impl RemoteDocument {
    pub fn new(id: impl Into<String>, fields: DocumentFields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Payload of one subscription event.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEventKind {
    Snapshot(Vec<RemoteDocument>),
    Failed(RemoteError),
}

/// Subscription event tagged with the subscription that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEvent {
    pub subscription_id: u64,
    pub kind: RemoteEventKind,
}

/// Store-side delivery endpoint handed to an adapter on subscribe.
#[derive(Debug, Clone)]
pub struct SnapshotSink {
    subscription_id: u64,
    sender: Sender<RemoteEvent>,
}

impl SnapshotSink {
    pub fn new(subscription_id: u64, sender: Sender<RemoteEvent>) -> Self {
        Self {
            subscription_id,
            sender,
        }
    }

    pub fn subscription_id(&self) -> u64 {
        self.subscription_id
    }

    /// Queues a full snapshot. Returns `false` once the store is gone.
    pub fn deliver_snapshot(&self, documents: Vec<RemoteDocument>) -> bool {
        self.send(RemoteEventKind::Snapshot(documents))
    }

    /// Queues a listener failure. Returns `false` once the store is gone.
    pub fn deliver_error(&self, error: RemoteError) -> bool {
        self.send(RemoteEventKind::Failed(error))
    }

    fn send(&self, kind: RemoteEventKind) -> bool {
        self.sender
            .send(RemoteEvent {
                subscription_id: self.subscription_id,
                kind,
            })
            .is_ok()
    }
}

/// Adapter-issued key used to cancel a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Remote per-owner task collection.
///
/// Write methods are called fire-and-forget by the store: their result is
/// logged, and the next snapshot is authoritative either way. Adapters are
/// shareable across threads so a host may move the store off its UI thread.
pub trait RemoteTaskStore: Send + Sync {
    /// Registers a live listener; adapters deliver an initial snapshot and
    /// one more after every change to the owner collection.
    fn subscribe_tasks(&self, owner_id: &str, sink: SnapshotSink)
        -> RemoteResult<SubscriptionHandle>;
    /// Cancels a listener. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
    /// Creates a document and returns its generated id.
    fn create_task(&self, owner_id: &str, fields: DocumentFields) -> RemoteResult<String>;
    /// Overwrites (or recreates) one document.
    fn set_task(&self, owner_id: &str, task_id: &str, fields: DocumentFields) -> RemoteResult<()>;
    /// Merges fields into an existing document.
    fn update_task_fields(
        &self,
        owner_id: &str,
        task_id: &str,
        partial: DocumentFields,
    ) -> RemoteResult<()>;
    /// Deletes one document. Deleting a missing document succeeds.
    fn delete_task(&self, owner_id: &str, task_id: &str) -> RemoteResult<()>;
    /// Overwrites many documents in one write.
    fn batch_set_tasks(
        &self,
        owner_id: &str,
        writes: Vec<(String, DocumentFields)>,
    ) -> RemoteResult<()>;
}

#[cfg(test)]
mod tests {
    use super::{RemoteError, RemoteEventKind, SnapshotSink};
    use std::sync::mpsc;

    #[test]
    fn sink_tags_events_with_subscription_id() {
        let (tx, rx) = mpsc::channel();
        let sink = SnapshotSink::new(7, tx);
        assert!(sink.deliver_snapshot(vec![]));
        assert!(sink.deliver_error(RemoteError::Unavailable("offline".to_string())));

        let first = rx.recv().expect("snapshot event");
        assert_eq!(first.subscription_id, 7);
        assert_eq!(first.kind, RemoteEventKind::Snapshot(vec![]));
        let second = rx.recv().expect("error event");
        assert!(matches!(second.kind, RemoteEventKind::Failed(_)));
    }

    #[test]
    fn sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel();
        let sink = SnapshotSink::new(1, tx);
        drop(rx);
        assert!(!sink.deliver_snapshot(vec![]));
    }
}
