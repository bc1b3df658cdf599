//! SQLite-backed remote task collection.
//!
//! # Responsibility
//! - Persist per-owner task documents as JSON field maps.
//! - Notify in-process listeners with a full snapshot after each write.
//!
//! # Invariants
//! - Snapshot order is document insertion order; overwrites keep position.
//! - Batch writes are applied in one transaction.
//! - The connection lock is never held while listeners are notified.

mod schema;

pub use schema::latest_schema_version;

use super::{
    RemoteDocument, RemoteError, RemoteResult, RemoteTaskStore, SnapshotSink, SubscriptionHandle,
};
use crate::model::task::DocumentFields;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const UPSERT_SQL: &str = "INSERT INTO task_documents (owner_id, doc_id, fields_json)
     VALUES (?1, ?2, ?3)
     ON CONFLICT (owner_id, doc_id) DO UPDATE SET
        fields_json = excluded.fields_json,
        updated_at = (strftime('%s', 'now') * 1000);";

struct Listener {
    handle: u64,
    owner_id: String,
    sink: SnapshotSink,
}

#[derive(Default)]
struct Listeners {
    entries: Vec<Listener>,
    next_handle: u64,
}

/// Durable keyed-document collection on one SQLite connection.
pub struct SqliteRemoteStore {
    conn: Mutex<Connection>,
    listeners: Mutex<Listeners>,
}

impl SqliteRemoteStore {
    /// Opens a document store file, creating or upgrading its schema.
    ///
    /// # Errors
    /// - `RemoteError::Storage` when the file cannot be opened, was written
    ///   by a newer schema, or holds an incompatible `task_documents` table.
    pub fn open(path: impl AsRef<Path>) -> RemoteResult<Self> {
        let path = path.as_ref();
        schema::prepare("file", || Connection::open(path)).map(Self::with_connection)
    }

    /// Opens an empty in-memory document store.
    pub fn open_in_memory() -> RemoteResult<Self> {
        schema::prepare("memory", Connection::open_in_memory).map(Self::with_connection)
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            listeners: Mutex::new(Listeners::default()),
        }
    }

    /// Schema version recorded in the open file.
    pub fn schema_version(&self) -> RemoteResult<u32> {
        schema::schema_version(&self.conn())
    }

    /// Loads every document of one owner in snapshot order.
    pub fn documents(&self, owner_id: &str) -> RemoteResult<Vec<RemoteDocument>> {
        load_documents(&self.conn(), owner_id)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, owner_id: &str) {
        let event = self.documents(owner_id);
        self.listeners().entries.retain(|listener| {
            if listener.owner_id != owner_id {
                return true;
            }
            match &event {
                Ok(documents) => listener.sink.deliver_snapshot(documents.clone()),
                Err(err) => listener.sink.deliver_error(err.clone()),
            }
        });
    }
}

impl RemoteTaskStore for SqliteRemoteStore {
    fn subscribe_tasks(
        &self,
        owner_id: &str,
        sink: SnapshotSink,
    ) -> RemoteResult<SubscriptionHandle> {
        let documents = self.documents(owner_id)?;
        sink.deliver_snapshot(documents);

        let mut listeners = self.listeners();
        listeners.next_handle += 1;
        let handle = listeners.next_handle;
        listeners.entries.push(Listener {
            handle,
            owner_id: owner_id.to_string(),
            sink,
        });
        debug!("event=remote_subscribe module=remote.sqlite status=ok handle={handle}");
        Ok(SubscriptionHandle(handle))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.listeners()
            .entries
            .retain(|listener| listener.handle != handle.0);
    }

    fn create_task(&self, owner_id: &str, fields: DocumentFields) -> RemoteResult<String> {
        let id = Uuid::new_v4().to_string();
        let encoded = encode_fields(&fields)?;
        self.conn()
            .execute(
                "INSERT INTO task_documents (owner_id, doc_id, fields_json) VALUES (?1, ?2, ?3);",
                params![owner_id, id, encoded],
            )
            .map_err(storage_error)?;
        self.publish(owner_id);
        Ok(id)
    }

    fn set_task(&self, owner_id: &str, task_id: &str, fields: DocumentFields) -> RemoteResult<()> {
        let encoded = encode_fields(&fields)?;
        self.conn()
            .execute(UPSERT_SQL, params![owner_id, task_id, encoded])
            .map_err(storage_error)?;
        self.publish(owner_id);
        Ok(())
    }

    fn update_task_fields(
        &self,
        owner_id: &str,
        task_id: &str,
        partial: DocumentFields,
    ) -> RemoteResult<()> {
        {
            let mut conn = self.conn();
            let tx = conn.transaction().map_err(storage_error)?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT fields_json FROM task_documents WHERE owner_id = ?1 AND doc_id = ?2;",
                    params![owner_id, task_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_error)?;
            let existing = existing.ok_or_else(|| RemoteError::NotFound(task_id.to_string()))?;

            let mut fields = decode_fields(&existing)?;
            fields.extend(partial);
            tx.execute(UPSERT_SQL, params![owner_id, task_id, encode_fields(&fields)?])
                .map_err(storage_error)?;
            tx.commit().map_err(storage_error)?;
        }
        self.publish(owner_id);
        Ok(())
    }

    fn delete_task(&self, owner_id: &str, task_id: &str) -> RemoteResult<()> {
        self.conn()
            .execute(
                "DELETE FROM task_documents WHERE owner_id = ?1 AND doc_id = ?2;",
                params![owner_id, task_id],
            )
            .map_err(storage_error)?;
        self.publish(owner_id);
        Ok(())
    }

    fn batch_set_tasks(
        &self,
        owner_id: &str,
        writes: Vec<(String, DocumentFields)>,
    ) -> RemoteResult<()> {
        {
            let mut conn = self.conn();
            let tx = conn.transaction().map_err(storage_error)?;
            for (task_id, fields) in &writes {
                tx.execute(UPSERT_SQL, params![owner_id, task_id, encode_fields(fields)?])
                    .map_err(storage_error)?;
            }
            tx.commit().map_err(storage_error)?;
        }
        self.publish(owner_id);
        Ok(())
    }
}

fn load_documents(conn: &Connection, owner_id: &str) -> RemoteResult<Vec<RemoteDocument>> {
    let mut stmt = conn
        .prepare(
            "SELECT doc_id, fields_json
             FROM task_documents
             WHERE owner_id = ?1
             ORDER BY rowid ASC;",
        )
        .map_err(storage_error)?;
    let mut rows = stmt.query([owner_id]).map_err(storage_error)?;

    let mut documents = Vec::new();
    while let Some(row) = rows.next().map_err(storage_error)? {
        let doc_id: String = row.get(0).map_err(storage_error)?;
        let raw: String = row.get(1).map_err(storage_error)?;
        match decode_fields(&raw) {
            Ok(fields) => documents.push(RemoteDocument::new(doc_id, fields)),
            Err(err) => warn!(
                "event=remote_load module=remote.sqlite status=skip doc_id={doc_id} error={err}"
            ),
        }
    }
    Ok(documents)
}

fn encode_fields(fields: &DocumentFields) -> RemoteResult<String> {
    serde_json::to_string(fields).map_err(|err| RemoteError::Encoding(err.to_string()))
}

fn decode_fields(raw: &str) -> RemoteResult<DocumentFields> {
    serde_json::from_str(raw).map_err(|err| RemoteError::Encoding(err.to_string()))
}

fn storage_error(err: rusqlite::Error) -> RemoteError {
    RemoteError::Storage(err.to_string())
}
