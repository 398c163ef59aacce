//! Crate-level error type.

use crate::event::{EntityKind, ExpectedVersion};
use uuid::Uuid;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a command, query or store operation can report.
///
/// Business-rule failures are stable variants callers can match on; store
/// failures wrap the underlying I/O or serialization error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Input rejected before any event was built.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The record is absent from the read model.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    /// The stream did not hold the expected number of events.
    ///
    /// Always recoverable: refetch the record and retry with its version.
    #[error("concurrency conflict: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        expected: ExpectedVersion,
        actual: u64,
    },

    /// The aggregate has no history at all.
    #[error("aggregate {0} has no events")]
    NoEvents(Uuid),

    /// A caller-supplied version outside the valid range.
    #[error("invalid version {0}: versions start at 1")]
    InvalidVersion(u64),

    #[error("cannot roll back to version {target}: valid range is 1..{current}")]
    RollbackInvalidVersion { target: u64, current: u64 },

    /// The aggregate's most recent event deleted it.
    #[error("cannot roll back deleted entity {0}")]
    RollbackDeletedEntity(Uuid),

    /// The target state equals the current state.
    #[error("rolling back to version {target} would change nothing")]
    RollbackNoChanges { target: u64 },

    #[error("cannot merge a person with itself")]
    SamePersonMerge,

    #[error("cannot merge {ancestor} with descendant {descendant}")]
    CircularMerge { ancestor: Uuid, descendant: Uuid },

    /// Both persons are children of different families.
    #[error("persons are children of different families ({survivor_family} and {merged_family})")]
    ChildFamilyConflict {
        survivor_family: Uuid,
        merged_family: Uuid,
    },

    /// Disk I/O failure in a durable store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An event or snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn not_found(kind: EntityKind, id: Uuid) -> Self {
        Error::NotFound { kind, id }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Whether retrying with a freshly read version may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::ConcurrencyConflict { .. })
    }
}
