//! Append-only event storage with per-stream compare-and-swap.

mod file;
mod memory;

pub use file::{FileEventStore, LockMode, LogTail, line_hash};
pub use memory::MemoryEventStore;

use crate::error::Result;
use crate::event::{EntityKind, Event, ExpectedVersion, PendingEvent};
use uuid::Uuid;

/// Storage for aggregate event streams.
///
/// Implementations must make [`append`](EventStore::append) atomic per
/// aggregate: the version check and the write happen as one step, and a
/// failed append leaves no trace. Appends to different aggregates may run
/// concurrently.
pub trait EventStore: Send + Sync {
    /// Append a batch to one stream if it currently matches `expected`.
    ///
    /// Returns the stream version after the append.
    ///
    /// # Errors
    ///
    /// * [`Error::ConcurrencyConflict`](crate::Error::ConcurrencyConflict) if
    ///   the stream length differs from `expected`.
    /// * [`Error::Validation`](crate::Error::Validation) for an empty batch or
    ///   a stream of another aggregate type.
    /// * I/O errors from durable implementations.
    fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: EntityKind,
        events: Vec<PendingEvent>,
        expected: ExpectedVersion,
    ) -> Result<u64>;

    /// Every event of one stream in version order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEvents`](crate::Error::NoEvents) if the aggregate
    /// has no history.
    fn load(&self, aggregate_id: Uuid) -> Result<Vec<Event>>;

    /// Every event in the store in global position order.
    fn load_all(&self) -> Result<Vec<Event>>;

    /// Current stream length; 0 when the stream does not exist.
    fn version(&self, aggregate_id: Uuid) -> Result<u64>;
}

impl<S: EventStore + ?Sized> EventStore for std::sync::Arc<S> {
    fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: EntityKind,
        events: Vec<PendingEvent>,
        expected: ExpectedVersion,
    ) -> Result<u64> {
        (**self).append(aggregate_id, aggregate_type, events, expected)
    }

    fn load(&self, aggregate_id: Uuid) -> Result<Vec<Event>> {
        (**self).load(aggregate_id)
    }

    fn load_all(&self) -> Result<Vec<Event>> {
        (**self).load_all()
    }

    fn version(&self, aggregate_id: Uuid) -> Result<u64> {
        (**self).version(aggregate_id)
    }
}
