use super::EventStore;
use crate::error::{Error, Result};
use crate::event::{EntityKind, Event, ExpectedVersion, PendingEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

type Stream = Arc<Mutex<Vec<Event>>>;

/// Per-aggregate streams, each behind its own lock.
///
/// The map lock is only held to look up or create a stream; the version
/// check and the push happen under the stream's own mutex, so appends to
/// different aggregates never wait on each other.
#[derive(Default)]
pub(crate) struct StreamIndex {
    streams: RwLock<HashMap<Uuid, Stream>>,
}

impl StreamIndex {
    fn stream(&self, aggregate_id: Uuid) -> Stream {
        if let Some(stream) = self
            .streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&aggregate_id)
        {
            return Arc::clone(stream);
        }
        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(streams.entry(aggregate_id).or_default())
    }

    fn existing(&self, aggregate_id: Uuid) -> Option<Stream> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&aggregate_id)
            .cloned()
    }

    /// Compare-and-swap append.
    ///
    /// `commit` receives the stamped batch (positions still unset) while the
    /// stream is locked; it assigns global positions and persists the batch.
    /// Only if it succeeds are the events made visible.
    pub(crate) fn append_with<F>(
        &self,
        aggregate_id: Uuid,
        aggregate_type: EntityKind,
        events: Vec<PendingEvent>,
        expected: ExpectedVersion,
        commit: F,
    ) -> Result<u64>
    where
        F: FnOnce(&mut [Event]) -> Result<()>,
    {
        if events.is_empty() {
            return Err(Error::validation("cannot append an empty batch"));
        }

        let stream = self.stream(aggregate_id);
        let mut stream = stream.lock().unwrap_or_else(PoisonError::into_inner);

        let current = stream.len() as u64;
        if !expected.matches(current) {
            return Err(Error::ConcurrencyConflict {
                expected,
                actual: current,
            });
        }
        if let Some(first) = stream.first()
            && first.aggregate_type != aggregate_type
        {
            return Err(Error::validation(format!(
                "stream {aggregate_id} holds {} events, not {aggregate_type}",
                first.aggregate_type
            )));
        }

        let mut stamped: Vec<Event> = events
            .into_iter()
            .enumerate()
            .map(|(i, pending)| {
                pending.into_event(aggregate_id, aggregate_type, current + 1 + i as u64, 0)
            })
            .collect();
        commit(&mut stamped)?;

        stream.extend(stamped);
        Ok(stream.len() as u64)
    }

    /// Insert an already stamped event read back from durable storage.
    pub(crate) fn restore(&self, event: Event) -> Result<()> {
        let stream = self.stream(event.aggregate_id);
        let mut stream = stream.lock().unwrap_or_else(PoisonError::into_inner);
        let expected = stream.len() as u64 + 1;
        if event.version != expected {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "stream {} is not gapless: expected version {expected}, found {}",
                    event.aggregate_id, event.version
                ),
            )));
        }
        stream.push(event);
        Ok(())
    }

    pub(crate) fn load(&self, aggregate_id: Uuid) -> Result<Vec<Event>> {
        let events = self
            .existing(aggregate_id)
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .unwrap_or_default();
        if events.is_empty() {
            return Err(Error::NoEvents(aggregate_id));
        }
        Ok(events)
    }

    pub(crate) fn load_all(&self) -> Vec<Event> {
        let streams: Vec<Stream> = self
            .streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut events: Vec<Event> = streams
            .iter()
            .flat_map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        events.sort_by_key(|e| e.position);
        events
    }

    pub(crate) fn version(&self, aggregate_id: Uuid) -> u64 {
        self.existing(aggregate_id)
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len() as u64)
            .unwrap_or(0)
    }
}

/// In-memory event store.
///
/// Streams live in a hash map keyed by aggregate id; a global counter orders
/// events across streams. Nothing survives the process, which makes it the
/// store of choice for tests and scratch replays.
///
/// # Examples
///
/// ```
/// use kinfold::{EntityKind, EventStore, ExpectedVersion, MemoryEventStore, PendingEvent};
/// use serde_json::json;
/// use uuid::Uuid;
///
/// let store = MemoryEventStore::new();
/// let id = Uuid::new_v4();
/// let version = store
///     .append(
///         id,
///         EntityKind::Source,
///         vec![PendingEvent::new("SourceDeleted", json!(null))],
///         ExpectedVersion::NoStream,
///     )
///     .unwrap();
/// assert_eq!(version, 1);
/// assert_eq!(store.load(id).unwrap().len(), 1);
/// ```
pub struct MemoryEventStore {
    index: StreamIndex,
    next_position: AtomicU64,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        MemoryEventStore {
            index: StreamIndex::default(),
            next_position: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEventStore")
            .field("next_position", &self.next_position)
            .finish_non_exhaustive()
    }
}

impl EventStore for MemoryEventStore {
    fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: EntityKind,
        events: Vec<PendingEvent>,
        expected: ExpectedVersion,
    ) -> Result<u64> {
        let version =
            self.index
                .append_with(aggregate_id, aggregate_type, events, expected, |batch| {
                    let first = self
                        .next_position
                        .fetch_add(batch.len() as u64, Ordering::SeqCst);
                    for (i, event) in batch.iter_mut().enumerate() {
                        event.position = first + i as u64;
                    }
                    Ok(())
                })?;
        log::debug!("appended to {aggregate_type} {aggregate_id}, now at version {version}");
        Ok(version)
    }

    fn load(&self, aggregate_id: Uuid) -> Result<Vec<Event>> {
        self.index.load(aggregate_id)
    }

    fn load_all(&self) -> Result<Vec<Event>> {
        Ok(self.index.load_all())
    }

    fn version(&self, aggregate_id: Uuid) -> Result<u64> {
        Ok(self.index.version(aggregate_id))
    }
}
