use super::{CommandContext, CommandResult};
use crate::domain::DomainEvent;
use crate::error::{Error, Result};
use crate::event::{EntityKind, ExpectedVersion};
use crate::genealogy::Genealogy;
use crate::model::{ChildRelationship, Family, FamilyChanges, FamilyChild, RelationshipType};
use crate::read_model::ReadModelStore;
use crate::store::EventStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewFamily {
    pub id: Option<Uuid>,
    pub partner1_id: Option<Uuid>,
    pub partner2_id: Option<Uuid>,
    pub relationship_type: Option<RelationshipType>,
    pub marriage_date: Option<String>,
    pub marriage_place: Option<String>,
}

/// Input of [`Genealogy::update_family`]. Children cannot be changed here;
/// use [`Genealogy::link_child`] and [`Genealogy::unlink_child`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFamily {
    pub id: Uuid,
    pub version: u64,
    pub changes: FamilyChanges,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkChild {
    pub family_id: Uuid,
    pub version: u64,
    pub person_id: Uuid,
    #[serde(default)]
    pub relationship: ChildRelationship,
    /// Birth order; appended after the existing children when absent.
    #[serde(default)]
    pub sequence: Option<u32>,
}

impl<E: EventStore, R: ReadModelStore> Genealogy<E, R> {
    pub fn create_family(&self, ctx: &CommandContext, input: NewFamily) -> Result<CommandResult> {
        let family = Family {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            partner1_id: input.partner1_id,
            partner2_id: input.partner2_id,
            relationship_type: input.relationship_type,
            marriage_date: input.marriage_date,
            marriage_place: input.marriage_place,
            children: Vec::new(),
            version: 1,
            updated_at: Utc::now(),
        };
        self.executor.create(ctx, family)
    }

    pub fn update_family(&self, ctx: &CommandContext, input: UpdateFamily) -> Result<CommandResult> {
        if input.changes.children.is_some() {
            return Err(Error::validation(
                "children are changed with link_child and unlink_child",
            ));
        }
        self.executor
            .update::<Family>(ctx, input.id, input.version, &input.changes)
    }

    pub fn delete_family(
        &self,
        ctx: &CommandContext,
        id: Uuid,
        version: u64,
    ) -> Result<CommandResult> {
        self.executor.delete::<Family>(ctx, id, version)
    }

    /// Add a person to a family's children.
    ///
    /// A person has at most one child family, cannot be a child of their
    /// own family, and cannot become a descendant of one of their
    /// descendants.
    pub fn link_child(&self, ctx: &CommandContext, input: LinkChild) -> Result<CommandResult> {
        // The child's lock serializes links of the same person into
        // different families.
        let _locks = self
            .executor
            .lock_many(&[input.family_id, input.person_id]);
        let family: Family = self.executor.fetch(input.family_id, input.version)?;
        let child = input.person_id;

        self.executor.check(|tables| {
            if !tables.persons.contains_key(&child) {
                return Err(Error::not_found(EntityKind::Person, child));
            }
            if family.has_partner(child) {
                return Err(Error::validation(
                    "a partner cannot also be a child of the same family",
                ));
            }
            if family.has_child(child) {
                return Err(Error::validation(format!(
                    "person {child} is already a child of this family"
                )));
            }
            if let Some(other) = tables.child_families_of(child).first() {
                return Err(Error::validation(format!(
                    "person {child} is already a child of family {}",
                    other.id
                )));
            }
            if family.partners().any(|p| tables.is_ancestor(child, p)) {
                return Err(Error::validation(format!(
                    "person {child} is an ancestor of a partner of this family"
                )));
            }
            Ok(())
        })?;

        let sequence = input
            .sequence
            .unwrap_or_else(|| family.children.len() as u32 + 1);
        let version = self.executor.commit(
            ctx,
            family.id,
            EntityKind::Family,
            vec![DomainEvent::ChildLinked {
                child: FamilyChild {
                    person_id: child,
                    relationship: input.relationship,
                    sequence,
                },
            }],
            ExpectedVersion::Exact(input.version),
        )?;
        Ok(CommandResult {
            id: family.id,
            version,
        })
    }

    pub fn unlink_child(
        &self,
        ctx: &CommandContext,
        family_id: Uuid,
        version: u64,
        person_id: Uuid,
    ) -> Result<CommandResult> {
        let family: Family = self.executor.fetch(family_id, version)?;
        if !family.has_child(person_id) {
            return Err(Error::validation(format!(
                "person {person_id} is not a child of this family"
            )));
        }
        let version = self.executor.execute(
            ctx,
            family.id,
            EntityKind::Family,
            vec![DomainEvent::ChildUnlinked { person_id }],
            ExpectedVersion::Exact(version),
        )?;
        Ok(CommandResult {
            id: family.id,
            version,
        })
    }
}
