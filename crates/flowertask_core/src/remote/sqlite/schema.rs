//! Document table bootstrap for `SqliteRemoteStore`.
//!
//! # Invariants
//! - The applied step count is mirrored to `PRAGMA user_version`.
//! - A connection is handed out only after the document table passed the
//!   column check.
//! - Every bootstrap failure surfaces as `RemoteError::Storage`.

use super::storage_error;
use crate::remote::{RemoteError, RemoteResult};
use log::{error, info};
use rusqlite::Connection;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DOCUMENT_TABLE: &str = "task_documents";
const REQUIRED_COLUMNS: &[&str] = &["owner_id", "doc_id", "fields_json", "updated_at"];

/// Schema steps in apply order; step `n` brings a file to version `n + 1`.
const SCHEMA_STEPS: &[&str] = &[include_str!("migrations/0001_task_documents.sql")];

/// Schema version written by this build.
pub fn latest_schema_version() -> u32 {
    SCHEMA_STEPS.len() as u32
}

/// Opens a connection and brings its document table up to date.
pub(super) fn prepare(
    mode: &'static str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> RemoteResult<Connection> {
    let started_at = Instant::now();
    let result = connect().map_err(storage_error).and_then(|mut conn| {
        bootstrap(&mut conn)?;
        Ok(conn)
    });

    match &result {
        Ok(_) => info!(
            "event=doc_store_open module=remote.sqlite status=ok mode={mode} schema_version={} duration_ms={}",
            latest_schema_version(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=doc_store_open module=remote.sqlite status=error mode={mode} duration_ms={} error={err}",
            started_at.elapsed().as_millis()
        ),
    }
    result
}

pub(super) fn schema_version(conn: &Connection) -> RemoteResult<u32> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))
        .map_err(storage_error)
}

fn bootstrap(conn: &mut Connection) -> RemoteResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT).map_err(storage_error)?;
    upgrade(conn)?;
    verify_document_table(conn)
}

fn upgrade(conn: &mut Connection) -> RemoteResult<()> {
    let current = schema_version(conn)?;
    let latest = latest_schema_version();
    if current > latest {
        return Err(RemoteError::Storage(format!(
            "document store schema version {current} is newer than supported {latest}"
        )));
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction().map_err(storage_error)?;
    for (step, sql) in SCHEMA_STEPS.iter().enumerate().skip(current as usize) {
        tx.execute_batch(sql).map_err(storage_error)?;
        tx.pragma_update(None, "user_version", step as u32 + 1)
            .map_err(storage_error)?;
    }
    tx.commit().map_err(storage_error)?;

    info!(
        "event=doc_store_upgrade module=remote.sqlite status=ok from_version={current} to_version={latest}"
    );
    Ok(())
}

/// Rejects files whose `task_documents` table lacks a column the adapter
/// reads or writes, e.g. a foreign database that happens to share the name.
fn verify_document_table(conn: &Connection) -> RemoteResult<()> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1);")
        .map_err(storage_error)?;
    let columns = stmt
        .query_map([DOCUMENT_TABLE], |row| row.get::<_, String>(0))
        .map_err(storage_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage_error)?;

    let missing = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !columns.iter().any(|column| column == *required))
        .copied()
        .collect::<Vec<_>>();
    if missing.is_empty() {
        return Ok(());
    }
    Err(RemoteError::Storage(format!(
        "table `{DOCUMENT_TABLE}` is missing columns: {}",
        missing.join(", ")
    )))
}
