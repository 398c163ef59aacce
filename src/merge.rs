//! Merging two person records that turned out to be the same individual.

use crate::commands::CommandContext;
use crate::domain::{DomainEvent, PersonMerge};
use crate::error::{Error, Result};
use crate::event::{EntityKind, ExpectedVersion};
use crate::genealogy::Genealogy;
use crate::model::{Person, PersonChanges, Tables};
use crate::read_model::ReadModelStore;
use crate::store::EventStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Which record a merged field takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Survivor,
    Merged,
}

/// Input of [`Genealogy::merge_persons`].
///
/// `field_resolution` maps person field names to the record whose value
/// wins. Unlisted fields keep the survivor's value, except that an empty
/// survivor field is filled from a non-empty merged one. List a field as
/// [`FieldSource::Survivor`] to keep it empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePersons {
    pub survivor_id: Uuid,
    pub merged_id: Uuid,
    pub survivor_version: u64,
    pub merged_version: u64,
    #[serde(default)]
    pub field_resolution: BTreeMap<String, FieldSource>,
}

/// Number of records re-pointed from the merged person, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transferred {
    pub families: usize,
    pub citations: usize,
    pub names: usize,
    pub life_events: usize,
    pub media: usize,
    pub ordinances: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub survivor_id: Uuid,
    /// Survivor version after the merge.
    pub version: u64,
    /// Person fields that took the merged record's value.
    pub merged_fields: Vec<String>,
    pub transferred: Transferred,
}

impl<E: EventStore, R: ReadModelStore> Genealogy<E, R> {
    /// Fold `merged_id` into `survivor_id`.
    ///
    /// Commits a `PersonMerged` event on the survivor's stream, carrying
    /// the merged record, the resolved field changes and every re-pointed
    /// record id, then logically deletes the merged person. Both streams
    /// survive.
    ///
    /// # Errors
    ///
    /// * [`Error::SamePersonMerge`] when both ids are equal.
    /// * [`Error::NotFound`] / [`Error::ConcurrencyConflict`] unless both
    ///   persons exist at the given versions.
    /// * [`Error::CircularMerge`] when one is an ancestor of the other.
    /// * [`Error::ChildFamilyConflict`] when they are children of different
    ///   families.
    pub fn merge_persons(&self, ctx: &CommandContext, input: MergePersons) -> Result<MergeResult> {
        let (survivor_id, merged_id) = (input.survivor_id, input.merged_id);
        if survivor_id == merged_id {
            return Err(Error::SamePersonMerge);
        }
        for field in input.field_resolution.keys() {
            if !PersonChanges::FIELDS.contains(&field.as_str()) {
                return Err(Error::validation(format!("{field} is not a mergeable field")));
            }
        }

        let _locks = self.executor.lock_many(&[survivor_id, merged_id]);
        let survivor: Person = self.executor.fetch(survivor_id, input.survivor_version)?;
        let merged: Person = self.executor.fetch(merged_id, input.merged_version)?;

        let merge = self.executor.read_model.query(|tables| {
            check_graph(tables, survivor_id, merged_id)?;
            let changes = resolve_fields(&survivor, &merged, &input.field_resolution)?;
            Ok::<_, Error>(collect_references(tables, &merged, changes))
        })?;

        let merged_fields: Vec<String> = merge
            .changes
            .field_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let transferred = Transferred {
            families: merge.families.len(),
            citations: merge.citations.len(),
            names: merge.names.len(),
            life_events: merge.life_events.len(),
            media: merge.media.len(),
            ordinances: merge.ordinances.len(),
        };

        let version = self.executor.commit(
            ctx,
            survivor_id,
            EntityKind::Person,
            vec![DomainEvent::PersonMerged(Box::new(merge))],
            ExpectedVersion::Exact(input.survivor_version),
        )?;
        self.executor.commit(
            ctx,
            merged_id,
            EntityKind::Person,
            vec![DomainEvent::PersonDeleted {
                merged_into: Some(survivor_id),
            }],
            ExpectedVersion::Exact(input.merged_version),
        )?;

        log::info!(
            "merged person {merged_id} into {survivor_id} ({} field(s), {} name(s))",
            merged_fields.len(),
            transferred.names
        );
        Ok(MergeResult {
            survivor_id,
            version,
            merged_fields,
            transferred,
        })
    }
}

/// Reject merges that would break the family graph.
fn check_graph(tables: &Tables, survivor: Uuid, merged: Uuid) -> Result<()> {
    for (ancestor, descendant) in [(survivor, merged), (merged, survivor)] {
        if tables.is_ancestor(ancestor, descendant) {
            return Err(Error::CircularMerge {
                ancestor,
                descendant,
            });
        }
    }

    let survivor_family = tables.child_families_of(survivor).first().map(|f| f.id);
    let merged_family = tables.child_families_of(merged).first().map(|f| f.id);
    if let (Some(survivor_family), Some(merged_family)) = (survivor_family, merged_family)
        && survivor_family != merged_family
    {
        return Err(Error::ChildFamilyConflict {
            survivor_family,
            merged_family,
        });
    }

    if let Some(family) = tables
        .families
        .values()
        .find(|f| f.has_partner(survivor) && f.has_partner(merged))
    {
        return Err(Error::validation(format!(
            "both persons are partners in family {}",
            family.id
        )));
    }
    Ok(())
}

/// Survivor wins per field, unless the caller picked the merged value or
/// the survivor's value is empty and the merged one is not.
fn resolve_fields(
    survivor: &Person,
    merged: &Person,
    resolution: &BTreeMap<String, FieldSource>,
) -> Result<PersonChanges> {
    let survivor_value = serde_json::to_value(survivor)?;
    let merged_value = serde_json::to_value(merged)?;

    let mut desired = survivor_value.clone();
    for field in PersonChanges::FIELDS {
        let ours = survivor_value.get(*field);
        let theirs = merged_value.get(*field);
        let take_merged = match resolution.get(*field) {
            Some(FieldSource::Merged) => true,
            Some(FieldSource::Survivor) => false,
            None => is_blank(ours) && !is_blank(theirs),
        };
        if take_merged {
            desired[*field] = theirs.cloned().unwrap_or(Value::Null);
        }
    }

    let desired: Person = serde_json::from_value(desired)?;
    desired.validate()?;
    Ok(PersonChanges::between(survivor, &desired))
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Everything that points at the merged person.
fn collect_references(tables: &Tables, merged: &Person, changes: PersonChanges) -> PersonMerge {
    let id = merged.id;
    let owned_by = |kind: EntityKind, owner: Uuid| kind == EntityKind::Person && owner == id;
    PersonMerge {
        merged_id: id,
        merged: merged.clone(),
        merged_names: tables.names_of(id).into_iter().cloned().collect(),
        changes,
        families: tables
            .families
            .values()
            .filter(|f| f.references(id))
            .map(|f| f.id)
            .collect(),
        citations: tables
            .citations
            .values()
            .filter(|c| owned_by(c.owner_type, c.owner_id))
            .map(|c| c.id)
            .collect(),
        names: tables
            .names
            .values()
            .filter(|n| n.person_id == id)
            .map(|n| n.id)
            .collect(),
        life_events: tables
            .life_events
            .values()
            .filter(|e| owned_by(e.owner_type, e.owner_id))
            .map(|e| e.id)
            .collect(),
        media: tables
            .media
            .values()
            .filter(|m| owned_by(m.owner_type, m.owner_id))
            .map(|m| m.id)
            .collect(),
        ordinances: tables
            .ordinances
            .values()
            .filter(|o| o.person_id == Some(id))
            .map(|o| o.id)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn person(given: &str, surname: &str) -> Person {
        Person {
            id: Uuid::new_v4(),
            given_name: given.into(),
            surname: surname.into(),
            gender: None,
            birth_date: None,
            birth_place: None,
            death_date: None,
            death_place: None,
            notes: None,
            research_status: None,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn survivor_wins_by_default() {
        let survivor = person("John", "Smith");
        let merged = person("Jon", "Smyth");
        let changes = resolve_fields(&survivor, &merged, &BTreeMap::new()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn empty_survivor_fields_are_backfilled() {
        let survivor = person("John", "Smith");
        let mut merged = person("Jon", "Smyth");
        merged.birth_date = Some("ABT 1850".into());
        merged.surname = String::new();

        let changes = resolve_fields(&survivor, &merged, &BTreeMap::new()).unwrap();
        assert_eq!(changes.birth_date, Some(Some("ABT 1850".into())));
        assert_eq!(changes.surname, None);
        assert_eq!(changes.field_names(), vec!["birth_date"]);
    }

    #[test]
    fn explicit_resolution_overrides_both_defaults() {
        let survivor = person("John", "Smith");
        let mut merged = person("Johann", "Schmidt");
        merged.notes = Some("from the parish register".into());

        let resolution = BTreeMap::from([
            ("given_name".to_string(), FieldSource::Merged),
            ("notes".to_string(), FieldSource::Survivor),
        ]);
        let changes = resolve_fields(&survivor, &merged, &resolution).unwrap();
        assert_eq!(changes.given_name.as_deref(), Some("Johann"));
        assert_eq!(changes.notes, None);
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&json!(null))));
        assert!(is_blank(Some(&json!("  "))));
        assert!(is_blank(Some(&json!([]))));
        assert!(!is_blank(Some(&json!("x"))));
        assert!(!is_blank(Some(&json!(0))));
    }
}
