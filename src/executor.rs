//! The single path by which events enter the store.

use crate::changes::FieldChanges;
use crate::commands::{CommandContext, CommandResult};
use crate::domain::{Aggregate, DomainEvent};
use crate::error::{Error, Result};
use crate::event::{EntityKind, ExpectedVersion};
use crate::locks::{AggregateLocks, LockSet};
use crate::model::{Entity, Tables};
use crate::read_model::ReadModelStore;
use crate::store::EventStore;
use uuid::Uuid;

/// Appends domain events and projects them, one aggregate at a time.
///
/// The per-aggregate lock is held across append and projection, so events of
/// one aggregate reach the read model in version order. The event store's
/// compare-and-swap is what rejects stale writers; the lock only orders
/// successful ones.
pub(crate) struct Executor<E, R> {
    pub(crate) events: E,
    pub(crate) read_model: R,
    locks: AggregateLocks,
}

impl<E: EventStore, R: ReadModelStore> Executor<E, R> {
    pub(crate) fn new(events: E, read_model: R) -> Self {
        Executor {
            events,
            read_model,
            locks: AggregateLocks::new(),
        }
    }

    pub(crate) fn lock(&self, id: Uuid) -> LockSet<'_> {
        self.locks.lock(id)
    }

    pub(crate) fn lock_many(&self, ids: &[Uuid]) -> LockSet<'_> {
        self.locks.lock_many(ids)
    }

    pub(crate) fn lock_all(&self) -> LockSet<'_> {
        self.locks.lock_all()
    }

    /// Lock the aggregate, then [`commit`](Self::commit).
    pub(crate) fn execute(
        &self,
        ctx: &CommandContext,
        aggregate_id: Uuid,
        kind: EntityKind,
        events: Vec<DomainEvent>,
        expected: ExpectedVersion,
    ) -> Result<u64> {
        let _lock = self.locks.lock(aggregate_id);
        self.commit(ctx, aggregate_id, kind, events, expected)
    }

    /// Append and project. The caller must hold the aggregate's lock.
    ///
    /// A failed append leaves the read model untouched.
    pub(crate) fn commit(
        &self,
        ctx: &CommandContext,
        aggregate_id: Uuid,
        kind: EntityKind,
        events: Vec<DomainEvent>,
        expected: ExpectedVersion,
    ) -> Result<u64> {
        let pending = events
            .iter()
            .map(|event| event.encode(ctx))
            .collect::<Result<Vec<_>>>()?;
        let version = self.events.append(aggregate_id, kind, pending, expected)?;

        let stream = self.events.load(aggregate_id)?;
        let from = (expected.as_len() as usize).min(stream.len());
        if let Err(e) = self.read_model.project(&stream[from..]) {
            log::error!(
                "kinfold: {kind} {aggregate_id} committed at version {version} but projection failed: {e}"
            );
            return Err(e);
        }
        Ok(version)
    }

    /// Fetch a record and check the caller's version token against it.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidVersion`] for version 0, [`Error::NotFound`] when the
    /// record is absent and [`Error::ConcurrencyConflict`] on mismatch.
    pub(crate) fn fetch<A: Entity>(&self, id: Uuid, version: u64) -> Result<A> {
        if version == 0 {
            return Err(Error::InvalidVersion(version));
        }
        let record: A = self.read_model.get(id)?;
        if record.version() != version {
            return Err(Error::ConcurrencyConflict {
                expected: ExpectedVersion::Exact(version),
                actual: record.version(),
            });
        }
        Ok(record)
    }

    /// Run a check against a consistent view of the read model.
    pub(crate) fn check(&self, f: impl FnOnce(&Tables) -> Result<()>) -> Result<()> {
        self.read_model.query(f)
    }

    pub(crate) fn create<A: Aggregate>(
        &self,
        ctx: &CommandContext,
        record: A,
    ) -> Result<CommandResult> {
        let id = record.id();
        self.check(|tables| record.validate(tables))?;
        let version = self.execute(
            ctx,
            id,
            A::KIND,
            vec![record.created()],
            ExpectedVersion::NoStream,
        )?;
        Ok(CommandResult { id, version })
    }

    /// Apply the caller's changes to the current record and commit only
    /// the fields that actually differ. A no-op returns the current version.
    pub(crate) fn update<A: Aggregate>(
        &self,
        ctx: &CommandContext,
        id: Uuid,
        version: u64,
        changes: &A::Changes,
    ) -> Result<CommandResult> {
        let current: A = self.fetch(id, version)?;
        let mut desired = current.clone();
        changes.apply_to(&mut desired);
        self.check(|tables| desired.validate(tables))?;

        let changes = A::Changes::between(&current, &desired);
        if changes.is_empty() {
            log::debug!("{} {id}: update changes nothing", A::KIND);
            return Ok(CommandResult { id, version });
        }
        let version = self.execute(
            ctx,
            id,
            A::KIND,
            vec![A::updated(changes)],
            ExpectedVersion::Exact(version),
        )?;
        Ok(CommandResult { id, version })
    }

    pub(crate) fn delete<A: Aggregate>(
        &self,
        ctx: &CommandContext,
        id: Uuid,
        version: u64,
    ) -> Result<CommandResult> {
        self.fetch::<A>(id, version)?;
        let version = self.execute(
            ctx,
            id,
            A::KIND,
            vec![A::deleted()],
            ExpectedVersion::Exact(version),
        )?;
        Ok(CommandResult { id, version })
    }
}
