//! Collection store error taxonomy.
//!
//! None of these are fatal: every failure leaves the collection at its last
//! known good state.

use crate::model::task::TaskId;
use crate::remote::RemoteError;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStoreError {
    /// Live listener could not be opened or reported a failure.
    SubscriptionFailure(RemoteError),
    /// Snapshot document skipped during parsing.
    MalformedDocument { document_id: String, reason: String },
    /// Mutation attempted without an owner identity.
    NoActiveSession,
    /// Remote write rejected; no retry is attempted.
    WriteFailure {
        operation: &'static str,
        source: RemoteError,
    },
    /// Hierarchy change that would break the one-level parent/subtask shape.
    InvalidHierarchy { task_id: TaskId, reason: &'static str },
}

impl Display for TaskStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubscriptionFailure(err) => write!(f, "task subscription failed: {err}"),
            Self::MalformedDocument {
                document_id,
                reason,
            } => write!(f, "malformed task document {document_id}: {reason}"),
            Self::NoActiveSession => write!(f, "no active session"),
            Self::WriteFailure { operation, source } => {
                write!(f, "{operation} write failed: {source}")
            }
            Self::InvalidHierarchy { task_id, reason } => {
                write!(f, "invalid hierarchy change for task {task_id}: {reason}")
            }
        }
    }
}

impl Error for TaskStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SubscriptionFailure(err) => Some(err),
            Self::WriteFailure { source, .. } => Some(source),
            Self::MalformedDocument { .. } | Self::NoActiveSession | Self::InvalidHierarchy { .. } => {
                None
            }
        }
    }
}
