use super::{Entity, Record, Tables};
use crate::event::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Marriage,
    Partnership,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildRelationship {
    #[default]
    Biological,
    Adopted,
    Foster,
    Step,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyChild {
    pub person_id: Uuid,
    pub relationship: ChildRelationship,
    /// Birth order within the family, 1-based.
    pub sequence: u32,
}

/// Current projection of a family aggregate: a couple and their children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Family {
    pub id: Uuid,
    pub partner1_id: Option<Uuid>,
    pub partner2_id: Option<Uuid>,
    pub relationship_type: Option<RelationshipType>,
    pub marriage_date: Option<String>,
    pub marriage_place: Option<String>,
    pub children: Vec<FamilyChild>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Family {
    pub fn partners(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.partner1_id.into_iter().chain(self.partner2_id)
    }

    pub fn has_partner(&self, person_id: Uuid) -> bool {
        self.partners().any(|p| p == person_id)
    }

    pub fn has_child(&self, person_id: Uuid) -> bool {
        self.children.iter().any(|c| c.person_id == person_id)
    }

    pub fn references(&self, person_id: Uuid) -> bool {
        self.has_partner(person_id) || self.has_child(person_id)
    }

    /// Point every reference to `from` at `to`.
    ///
    /// A child entry that would duplicate an existing one is dropped.
    pub(crate) fn replace_person(&mut self, from: Uuid, to: Uuid) {
        if self.partner1_id == Some(from) {
            self.partner1_id = Some(to);
        }
        if self.partner2_id == Some(from) {
            self.partner2_id = Some(to);
        }
        if self.has_child(from) {
            if self.has_child(to) {
                self.children.retain(|c| c.person_id != from);
            } else {
                for child in self.children.iter_mut().filter(|c| c.person_id == from) {
                    child.person_id = to;
                }
            }
        }
    }

    /// Checks the family as it would stand in `tables`, in place of any
    /// stored family with the same id.
    pub(crate) fn validate(&self, tables: &Tables) -> crate::Result<()> {
        if self.partner1_id.is_none() && self.partner2_id.is_none() {
            return Err(crate::Error::validation("a family needs at least one partner"));
        }
        if self.partner1_id.is_some() && self.partner1_id == self.partner2_id {
            return Err(crate::Error::validation("family partners must differ"));
        }
        for partner in self.partners() {
            if !tables.persons.contains_key(&partner) {
                return Err(crate::Error::not_found(EntityKind::Person, partner));
            }
            if self.has_child(partner) {
                return Err(crate::Error::validation(
                    "a partner cannot also be a child of the same family",
                ));
            }
        }
        for child in &self.children {
            let child = child.person_id;
            let elsewhere = tables
                .child_families_of(child)
                .into_iter()
                .find(|f| f.id != self.id);
            if let Some(other) = elsewhere {
                return Err(crate::Error::validation(format!(
                    "person {child} is already a child of family {}",
                    other.id
                )));
            }
            if self.partners().any(|p| tables.is_ancestor_with(child, p, self)) {
                return Err(crate::Error::validation(format!(
                    "person {child} is an ancestor of a partner of this family"
                )));
            }
        }
        Ok(())
    }
}

field_changes! {
    /// Changed family fields.
    ///
    /// `children` is only written by rollbacks; day-to-day child changes use
    /// their own link/unlink events.
    pub struct FamilyChanges for Family {
        partner1_id: Option<Uuid>,
        partner2_id: Option<Uuid>,
        relationship_type: Option<RelationshipType>,
        marriage_date: Option<String>,
        marriage_place: Option<String>,
        children: Vec<FamilyChild>,
    }
}

impl Record for Family {
    const KIND: EntityKind = EntityKind::Family;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(tables: &Tables) -> &BTreeMap<Uuid, Self> {
        &tables.families
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Uuid, Self> {
        &mut tables.families
    }

    fn display_name(&self, tables: &Tables) -> String {
        let names: Vec<String> = self
            .partners()
            .map(|p| tables.person_label(p).unwrap_or_else(|| "unknown".to_string()))
            .collect();
        if names.is_empty() {
            "Family".to_string()
        } else {
            format!("Family of {}", names.join(" & "))
        }
    }
}

impl Entity for Family {
    fn version(&self) -> u64 {
        self.version
    }

    fn stamp(&mut self, version: u64, at: DateTime<Utc>) {
        self.version = version;
        self.updated_at = at;
    }
}
