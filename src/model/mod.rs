//! Read-model records: the denormalized current state of every aggregate.

mod citation;
mod family;
mod life_event;
mod media;
mod ordinance;
mod person;
mod source;

pub use citation::{Citation, CitationChanges, CitationQuality};
pub use family::{ChildRelationship, Family, FamilyChanges, FamilyChild, RelationshipType};
pub use life_event::{FactType, LifeEvent, LifeEventChanges};
pub use media::{Media, MediaChanges};
pub use ordinance::{LdsOrdinance, LdsOrdinanceChanges, OrdinanceType};
pub use person::{Gender, NameChanges, NameType, Person, PersonChanges, PersonName, ResearchStatus};
pub use source::{Source, SourceChanges};

use crate::event::EntityKind;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// A row in one of the read-model tables.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> Uuid;

    fn table(tables: &Tables) -> &BTreeMap<Uuid, Self>;

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Uuid, Self>;

    /// Human-readable label, resolved against the other tables where the
    /// record only holds references (e.g. a family's partners).
    fn display_name(&self, tables: &Tables) -> String;
}

/// A record governed by its own event stream.
pub trait Entity: Record {
    /// Stream length after the last applied event.
    fn version(&self) -> u64;

    /// Record that the event at `version` was applied at `at`.
    fn stamp(&mut self, version: u64, at: DateTime<Utc>);
}

/// Every read-model table.
///
/// Cloneable so history and rollback can replay into a scratch copy, and
/// serializable so the whole read model can be snapshotted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    pub persons: BTreeMap<Uuid, Person>,
    pub names: BTreeMap<Uuid, PersonName>,
    pub families: BTreeMap<Uuid, Family>,
    pub sources: BTreeMap<Uuid, Source>,
    pub citations: BTreeMap<Uuid, Citation>,
    pub media: BTreeMap<Uuid, Media>,
    pub life_events: BTreeMap<Uuid, LifeEvent>,
    pub ordinances: BTreeMap<Uuid, LdsOrdinance>,
}

impl Tables {
    /// Whether a live record of `kind` exists under `id`.
    pub fn contains(&self, kind: EntityKind, id: Uuid) -> bool {
        match kind {
            EntityKind::Person => self.persons.contains_key(&id),
            EntityKind::Name => self.names.contains_key(&id),
            EntityKind::Family => self.families.contains_key(&id),
            EntityKind::Source => self.sources.contains_key(&id),
            EntityKind::Citation => self.citations.contains_key(&id),
            EntityKind::Media => self.media.contains_key(&id),
            EntityKind::LifeEvent => self.life_events.contains_key(&id),
            EntityKind::LdsOrdinance => self.ordinances.contains_key(&id),
        }
    }

    /// Names recorded for a person, primary name first.
    pub fn names_of(&self, person_id: Uuid) -> Vec<&PersonName> {
        let mut names: Vec<_> = self
            .names
            .values()
            .filter(|n| n.person_id == person_id)
            .collect();
        names.sort_by_key(|n| (!n.is_primary, n.id));
        names
    }

    /// Families that list the person as a child.
    pub fn child_families_of(&self, person_id: Uuid) -> Vec<&Family> {
        self.families
            .values()
            .filter(|f| f.has_child(person_id))
            .collect()
    }

    /// Partners of every family that lists the person as a child.
    pub fn parents_of(&self, person_id: Uuid) -> Vec<Uuid> {
        self.child_families_of(person_id)
            .into_iter()
            .flat_map(|f| f.partners())
            .collect()
    }

    /// Whether `ancestor` appears anywhere above `person` in the tree.
    pub fn is_ancestor(&self, ancestor: Uuid, person: Uuid) -> bool {
        self.ancestor_walk(ancestor, person, None)
    }

    /// Like [`is_ancestor`](Self::is_ancestor), with `family` standing in
    /// for the stored family of the same id.
    pub(crate) fn is_ancestor_with(&self, ancestor: Uuid, person: Uuid, family: &Family) -> bool {
        self.ancestor_walk(ancestor, person, Some(family))
    }

    /// Walks parent links with an explicit work list; the visited set keeps
    /// malformed (cyclic) data from looping.
    fn ancestor_walk(&self, ancestor: Uuid, person: Uuid, replacing: Option<&Family>) -> bool {
        let families: Vec<&Family> = match replacing {
            Some(family) => self
                .families
                .values()
                .filter(|f| f.id != family.id)
                .chain(std::iter::once(family))
                .collect(),
            None => self.families.values().collect(),
        };

        let mut work = vec![person];
        let mut visited = HashSet::new();
        while let Some(current) = work.pop() {
            if !visited.insert(current) {
                continue;
            }
            let parents = families
                .iter()
                .filter(|f| f.has_child(current))
                .flat_map(|f| f.partners());
            for parent in parents {
                if parent == ancestor {
                    return true;
                }
                work.push(parent);
            }
        }
        false
    }

    pub(crate) fn person_label(&self, person_id: Uuid) -> Option<String> {
        self.persons.get(&person_id).map(|p| p.full_name())
    }
}

/// Join non-empty parts with a single space.
pub(crate) fn join_name(given: &str, surname: &str) -> String {
    let name = format!("{} {}", given.trim(), surname.trim());
    let name = name.trim();
    if name.is_empty() {
        "(unnamed)".to_string()
    } else {
        name.to_string()
    }
}

/// Fail with `NotFound` unless the owning record exists.
pub(crate) fn require_owner(tables: &Tables, kind: EntityKind, id: Uuid) -> crate::Result<()> {
    if kind == EntityKind::Name {
        return Err(crate::Error::validation("a name cannot own other records"));
    }
    if !tables.contains(kind, id) {
        return Err(crate::Error::not_found(kind, id));
    }
    Ok(())
}

/// Fail with a validation error when a required text field is blank.
pub(crate) fn require(field: &str, value: &str) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::Error::validation(format!("{field} is required")));
    }
    Ok(())
}
