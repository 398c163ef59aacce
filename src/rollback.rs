//! Forward-only rollback: restore an earlier state by appending an event.

use crate::changes::FieldChanges;
use crate::commands::{CommandContext, CommandResult};
use crate::domain::{Aggregate, DomainEvent};
use crate::error::{Error, Result};
use crate::event::{EntityKind, ExpectedVersion};
use crate::genealogy::Genealogy;
use crate::model::{
    Citation, Family, LdsOrdinance, LifeEvent, Media, Person, PersonChanges, PersonName, Source,
    Tables,
};
use crate::projector;
use crate::read_model::ReadModelStore;
use crate::store::EventStore;
use uuid::Uuid;

impl<E: EventStore, R: ReadModelStore> Genealogy<E, R> {
    /// Restore an aggregate's fields to what they were at `target_version`.
    ///
    /// The log is never rewritten: one `*RolledBack` event carrying the
    /// difference is appended, so the version becomes `current + 1`.
    ///
    /// # Errors
    ///
    /// * [`Error::NoEvents`] if the aggregate has no stream.
    /// * [`Error::RollbackInvalidVersion`] unless `1 <= target_version <= current`.
    /// * [`Error::RollbackNoChanges`] if the target is the current version or
    ///   restores nothing.
    /// * [`Error::RollbackDeletedEntity`] if the aggregate has been deleted.
    /// * Validation errors when the restored record references records that
    ///   no longer exist.
    pub fn rollback(
        &self,
        ctx: &CommandContext,
        kind: EntityKind,
        id: Uuid,
        target_version: u64,
    ) -> Result<CommandResult> {
        let _lock = self.executor.lock(id);

        let stream = self.stream_of(kind, id)?;
        let current = stream.len() as u64;
        if target_version < 1 || target_version > current {
            return Err(Error::RollbackInvalidVersion {
                target: target_version,
                current,
            });
        }
        if target_version == current {
            return Err(Error::RollbackNoChanges {
                target: target_version,
            });
        }
        if stream
            .last()
            .is_some_and(|last| DomainEvent::decode(last).is_ok_and(|d| d.is_delete()))
        {
            return Err(Error::RollbackDeletedEntity(id));
        }

        // Replay everything up to the target event so re-pointing done by
        // merges in between is reproduced too.
        let until = stream[(target_version - 1) as usize].position;
        let all = self.executor.events.load_all()?;
        let mut then = Tables::default();
        projector::replay(&mut then, all.iter().take_while(|e| e.position <= until));

        let event = match kind {
            EntityKind::Person => self.person_rollback(&then, id, target_version)?,
            EntityKind::Family => self.record_rollback::<Family>(&then, id, target_version)?,
            EntityKind::Source => self.record_rollback::<Source>(&then, id, target_version)?,
            EntityKind::Citation => self.record_rollback::<Citation>(&then, id, target_version)?,
            EntityKind::Media => self.record_rollback::<Media>(&then, id, target_version)?,
            EntityKind::LifeEvent => {
                self.record_rollback::<LifeEvent>(&then, id, target_version)?
            }
            EntityKind::LdsOrdinance => {
                self.record_rollback::<LdsOrdinance>(&then, id, target_version)?
            }
            EntityKind::Name => return Err(Error::not_found(kind, id)),
        };

        let version =
            self.executor
                .commit(ctx, id, kind, vec![event], ExpectedVersion::Exact(current))?;
        log::info!("rolled back {kind} {id} to version {target_version}, now at {version}");
        Ok(CommandResult { id, version })
    }

    fn live<A: Aggregate>(&self, id: Uuid) -> Result<A> {
        match self.executor.read_model.get(id) {
            Err(Error::NotFound { .. }) => Err(Error::RollbackDeletedEntity(id)),
            other => other,
        }
    }

    fn record_rollback<A: Aggregate>(
        &self,
        then: &Tables,
        id: Uuid,
        target_version: u64,
    ) -> Result<DomainEvent> {
        let live: A = self.live(id)?;
        let historical = A::table(then)
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(A::KIND, id))?;
        self.executor.check(|tables| historical.validate(tables))?;

        let changes = A::Changes::between(&live, &historical);
        if changes.is_empty() {
            return Err(Error::RollbackNoChanges {
                target: target_version,
            });
        }
        Ok(A::rolled_back(target_version, changes))
    }

    /// Person rollback also restores the name set when it differs.
    fn person_rollback(&self, then: &Tables, id: Uuid, target_version: u64) -> Result<DomainEvent> {
        let live: Person = self.live(id)?;
        let historical = then
            .persons
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(EntityKind::Person, id))?;
        historical.validate()?;

        let changes = PersonChanges::between(&live, &historical);
        let names_then: Vec<PersonName> = then.names_of(id).into_iter().cloned().collect();
        let names_now: Vec<PersonName> = self
            .executor
            .read_model
            .query(|tables| tables.names_of(id).into_iter().cloned().collect());
        let names = (names_then != names_now).then_some(names_then);

        if changes.is_empty() && names.is_none() {
            return Err(Error::RollbackNoChanges {
                target: target_version,
            });
        }
        Ok(DomainEvent::PersonRolledBack {
            target_version,
            changes,
            names,
        })
    }
}
