use super::{CommandContext, CommandResult};
use crate::domain::DomainEvent;
use crate::error::{Error, Result};
use crate::event::{EntityKind, ExpectedVersion};
use crate::genealogy::Genealogy;
use crate::model::{
    Gender, NameChanges, NameType, Person, PersonChanges, PersonName, ResearchStatus,
};
use crate::read_model::ReadModelStore;
use crate::store::EventStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input of [`Genealogy::create_person`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPerson {
    /// Caller-chosen id; a fresh v4 UUID when absent.
    pub id: Option<Uuid>,
    pub given_name: String,
    pub surname: String,
    pub gender: Option<Gender>,
    pub birth_date: Option<String>,
    pub birth_place: Option<String>,
    pub death_date: Option<String>,
    pub death_place: Option<String>,
    pub notes: Option<String>,
    pub research_status: Option<ResearchStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePerson {
    pub id: Uuid,
    /// Version the caller last read.
    pub version: u64,
    pub changes: PersonChanges,
}

/// Input of [`Genealogy::add_name`]. Names live on the person's stream, so
/// the person's version is the lock token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddName {
    pub person_id: Uuid,
    pub version: u64,
    pub id: Option<Uuid>,
    pub given_name: String,
    pub surname: String,
    pub name_type: NameType,
    pub nickname: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateName {
    pub person_id: Uuid,
    pub version: u64,
    pub name_id: Uuid,
    pub changes: NameChanges,
}

impl<E: EventStore, R: ReadModelStore> Genealogy<E, R> {
    pub fn create_person(&self, ctx: &CommandContext, input: NewPerson) -> Result<CommandResult> {
        let person = Person {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            given_name: input.given_name,
            surname: input.surname,
            gender: input.gender,
            birth_date: input.birth_date,
            birth_place: input.birth_place,
            death_date: input.death_date,
            death_place: input.death_place,
            notes: input.notes,
            research_status: input.research_status,
            version: 1,
            updated_at: Utc::now(),
        };
        self.executor.create(ctx, person)
    }

    pub fn update_person(&self, ctx: &CommandContext, input: UpdatePerson) -> Result<CommandResult> {
        self.executor
            .update::<Person>(ctx, input.id, input.version, &input.changes)
    }

    /// Logically delete a person and their names. The event stream stays.
    pub fn delete_person(
        &self,
        ctx: &CommandContext,
        id: Uuid,
        version: u64,
    ) -> Result<CommandResult> {
        self.executor.delete::<Person>(ctx, id, version)
    }

    /// Record another name for a person. A new primary name demotes the
    /// previous one.
    pub fn add_name(&self, ctx: &CommandContext, input: AddName) -> Result<CommandResult> {
        let person: Person = self.executor.fetch(input.person_id, input.version)?;
        let name = PersonName {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            person_id: person.id,
            given_name: input.given_name,
            surname: input.surname,
            name_type: input.name_type,
            nickname: input.nickname,
            is_primary: input.is_primary,
        };
        name.validate()?;
        self.executor.check(|tables| {
            if tables.names.contains_key(&name.id) {
                return Err(Error::validation(format!("name {} already exists", name.id)));
            }
            Ok(())
        })?;

        let version = self.executor.execute(
            ctx,
            person.id,
            EntityKind::Person,
            vec![DomainEvent::NameAdded { name }],
            ExpectedVersion::Exact(input.version),
        )?;
        Ok(CommandResult {
            id: person.id,
            version,
        })
    }

    pub fn update_name(&self, ctx: &CommandContext, input: UpdateName) -> Result<CommandResult> {
        let person: Person = self.executor.fetch(input.person_id, input.version)?;
        let current = self.owned_name(person.id, input.name_id)?;

        let mut desired = current.clone();
        input.changes.apply_to(&mut desired);
        desired.validate()?;
        let changes = NameChanges::between(&current, &desired);
        if changes.is_empty() {
            return Ok(CommandResult {
                id: person.id,
                version: person.version,
            });
        }

        let version = self.executor.execute(
            ctx,
            person.id,
            EntityKind::Person,
            vec![DomainEvent::NameUpdated {
                name_id: input.name_id,
                changes,
            }],
            ExpectedVersion::Exact(input.version),
        )?;
        Ok(CommandResult {
            id: person.id,
            version,
        })
    }

    pub fn remove_name(
        &self,
        ctx: &CommandContext,
        person_id: Uuid,
        version: u64,
        name_id: Uuid,
    ) -> Result<CommandResult> {
        let person: Person = self.executor.fetch(person_id, version)?;
        self.owned_name(person.id, name_id)?;
        let version = self.executor.execute(
            ctx,
            person.id,
            EntityKind::Person,
            vec![DomainEvent::NameRemoved { name_id }],
            ExpectedVersion::Exact(version),
        )?;
        Ok(CommandResult {
            id: person.id,
            version,
        })
    }

    /// The name, provided it belongs to `person_id`.
    fn owned_name(&self, person_id: Uuid, name_id: Uuid) -> Result<PersonName> {
        let name: PersonName = self.executor.read_model.get(name_id)?;
        if name.person_id != person_id {
            return Err(Error::not_found(EntityKind::Name, name_id));
        }
        Ok(name)
    }
}
