//! Change history and restore points, derived from the event streams.
//!
//! Nothing here is stored: every entry is computed by replaying events into
//! scratch tables and diffing an aggregate's view before and after each
//! event that touched it.

use crate::domain::DomainEvent;
use crate::error::{Error, Result};
use crate::event::{EntityKind, Event};
use crate::genealogy::Genealogy;
use crate::model::{
    Citation, Family, LdsOrdinance, LifeEvent, Media, Person, PersonName, Record, Source, Tables,
    join_name,
};
use crate::projector;
use crate::read_model::{Page, ReadModelStore, decode_batch};
use crate::store::EventStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Bookkeeping fields left out of field-level diffs.
const UNTRACKED: &[&str] = &["version", "updated_at"];

/// Old and new value of one field. `null` stands for "absent".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// One human-readable change to one aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// `"<aggregate_id>:<version>"` of the event that made the change.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub entity_name: String,
    pub action: String,
    pub field_changes: BTreeMap<String, FieldChange>,
    pub user_id: Option<String>,
}

/// A version an aggregate can be rolled back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorePoint {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorePoints {
    pub restore_points: Vec<RestorePoint>,
    pub total_count: usize,
    pub has_more: bool,
}

/// Filter and pagination for [`Genealogy::global_history`].
///
/// Both time bounds are inclusive. An empty `entity_types` matches every
/// kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub entity_types: Vec<EntityKind>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        HistoryQuery {
            from: None,
            to: None,
            entity_types: Vec::new(),
            limit: 50,
            offset: 0,
        }
    }
}

impl HistoryQuery {
    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn entity_type(mut self, kind: EntityKind) -> Self {
        self.entity_types.push(kind);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Event types selected by `entity_types`; `None` selects all.
    fn event_types(&self) -> Option<BTreeSet<&'static str>> {
        if self.entity_types.is_empty() {
            return None;
        }
        Some(
            self.entity_types
                .iter()
                .flat_map(|kind| kind.event_types().iter().copied())
                .collect(),
        )
    }

    fn accepts(&self, event: &Event, types: Option<&BTreeSet<&'static str>>) -> bool {
        self.from.is_none_or(|from| event.ts >= from)
            && self.to.is_none_or(|to| event.ts <= to)
            && types.is_none_or(|types| types.contains(event.event_type.as_str()))
    }
}

/// One event that touched the traced aggregate and what it changed there.
struct Step<'a> {
    event: &'a Event,
    domain: DomainEvent,
    field_changes: BTreeMap<String, FieldChange>,
    name: String,
    summary: String,
}

impl<E: EventStore, R: ReadModelStore> Genealogy<E, R> {
    /// Changes to one aggregate, newest first.
    ///
    /// Covers the aggregate's own events and merges that re-pointed it.
    ///
    /// # Errors
    ///
    /// [`Error::NoEvents`] when the aggregate has no history;
    /// [`Error::NotFound`] when its stream holds another kind.
    pub fn entity_history(
        &self,
        kind: EntityKind,
        id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Page<ChangeEntry>> {
        self.stream_of(kind, id)?;
        let all = self.executor.events.load_all()?;
        let mut entries: Vec<ChangeEntry> = trace(&all, kind, id)?
            .into_iter()
            .map(|step| step.into_entry(kind, id))
            .collect();
        entries.reverse();
        Ok(Page::paginate(entries, self.settings.clamp(limit), offset))
    }

    /// Changes across every aggregate, newest first.
    pub fn global_history(&self, query: &HistoryQuery) -> Result<Page<ChangeEntry>> {
        let all = self.executor.events.load_all()?;
        let types = query.event_types();

        let mut tables = Tables::default();
        let mut entries = Vec::new();
        for (event, domain) in decode_batch(&all) {
            if !query.accepts(event, types.as_ref()) {
                projector::apply(&mut tables, event, &domain);
                continue;
            }
            let (kind, id) = (event.aggregate_type, event.aggregate_id);
            let step = capture(&mut tables, event, domain, kind, id)?;
            entries.push((event.position, step.into_entry(kind, id)));
        }

        entries.sort_by(|(pa, a), (pb, b)| b.timestamp.cmp(&a.timestamp).then(pb.cmp(pa)));
        let entries = entries.into_iter().map(|(_, entry)| entry).collect();
        Ok(Page::paginate(
            entries,
            self.settings.clamp(query.limit),
            query.offset,
        ))
    }

    /// One restore point per event of the aggregate's stream, newest first.
    ///
    /// Deleted aggregates keep their restore points.
    ///
    /// # Errors
    ///
    /// [`Error::NoEvents`] when the aggregate has no stream at all.
    pub fn restore_points(
        &self,
        kind: EntityKind,
        id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<RestorePoints> {
        self.stream_of(kind, id)?;
        let all = self.executor.events.load_all()?;
        let mut points: Vec<RestorePoint> = trace(&all, kind, id)?
            .into_iter()
            .filter(|step| step.event.aggregate_id == id)
            .map(|step| RestorePoint {
                version: step.event.version,
                timestamp: step.event.ts,
                action: step.domain.action().to_string(),
                summary: step.summary,
            })
            .collect();
        points.reverse();

        let page = Page::paginate(points, self.settings.clamp(limit), offset);
        Ok(RestorePoints {
            restore_points: page.items,
            total_count: page.total,
            has_more: page.has_more,
        })
    }

    /// The aggregate's stream, checked to hold `kind`.
    pub(crate) fn stream_of(&self, kind: EntityKind, id: Uuid) -> Result<Vec<Event>> {
        let stream = self.executor.events.load(id)?;
        if stream.first().is_some_and(|e| e.aggregate_type != kind) {
            return Err(Error::not_found(kind, id));
        }
        Ok(stream)
    }
}

/// Replay `all` and record every event that touches `id`.
fn trace(all: &[Event], kind: EntityKind, id: Uuid) -> Result<Vec<Step<'_>>> {
    let mut tables = Tables::default();
    let mut steps = Vec::new();
    for (event, domain) in decode_batch(all) {
        let touches = event.aggregate_id == id
            || matches!(&domain, DomainEvent::PersonMerged(merge) if merge.references(id));
        if touches {
            steps.push(capture(&mut tables, event, domain, kind, id)?);
        } else {
            projector::apply(&mut tables, event, &domain);
        }
    }
    Ok(steps)
}

/// Apply one event while capturing the view of `(kind, id)` around it.
fn capture<'a>(
    tables: &mut Tables,
    event: &'a Event,
    domain: DomainEvent,
    kind: EntityKind,
    id: Uuid,
) -> Result<Step<'a>> {
    let before = view(tables, kind, id)?;
    let name_before = display_name(tables, kind, id);
    projector::apply(tables, event, &domain);
    let after = view(tables, kind, id)?;
    let name = display_name(tables, kind, id)
        .or(name_before)
        .unwrap_or_else(|| id.to_string());

    let field_changes = diff(before.as_ref(), after.as_ref());
    let summary = summarize(tables, kind, &name, &domain, &field_changes);
    Ok(Step {
        event,
        domain,
        field_changes,
        name,
        summary,
    })
}

impl Step<'_> {
    fn into_entry(self, kind: EntityKind, id: Uuid) -> ChangeEntry {
        ChangeEntry {
            id: format!("{}:{}", self.event.aggregate_id, self.event.version),
            timestamp: self.event.ts,
            entity_type: kind,
            entity_id: id,
            entity_name: self.name,
            action: self.domain.action().to_string(),
            field_changes: self.field_changes,
            user_id: self.event.actor.clone(),
        }
    }
}

/// The diffable JSON view of one record; a person's view includes its
/// names.
fn view(tables: &Tables, kind: EntityKind, id: Uuid) -> Result<Option<Value>> {
    let mut value = match kind {
        EntityKind::Person => record_view::<Person>(tables, id)?,
        EntityKind::Name => record_view::<PersonName>(tables, id)?,
        EntityKind::Family => record_view::<Family>(tables, id)?,
        EntityKind::Source => record_view::<Source>(tables, id)?,
        EntityKind::Citation => record_view::<Citation>(tables, id)?,
        EntityKind::Media => record_view::<Media>(tables, id)?,
        EntityKind::LifeEvent => record_view::<LifeEvent>(tables, id)?,
        EntityKind::LdsOrdinance => record_view::<LdsOrdinance>(tables, id)?,
    };
    if kind == EntityKind::Person
        && let Some(Value::Object(map)) = value.as_mut()
    {
        map.insert(
            "names".to_string(),
            serde_json::to_value(tables.names_of(id))?,
        );
    }
    Ok(value)
}

fn record_view<R: Record>(tables: &Tables, id: Uuid) -> Result<Option<Value>> {
    let Some(record) = R::table(tables).get(&id) else {
        return Ok(None);
    };
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
        for field in UNTRACKED {
            map.remove(*field);
        }
    }
    Ok(Some(value))
}

fn display_name(tables: &Tables, kind: EntityKind, id: Uuid) -> Option<String> {
    fn of<R: Record>(tables: &Tables, id: Uuid) -> Option<String> {
        R::table(tables).get(&id).map(|r| r.display_name(tables))
    }
    match kind {
        EntityKind::Person => of::<Person>(tables, id),
        EntityKind::Name => of::<PersonName>(tables, id),
        EntityKind::Family => of::<Family>(tables, id),
        EntityKind::Source => of::<Source>(tables, id),
        EntityKind::Citation => of::<Citation>(tables, id),
        EntityKind::Media => of::<Media>(tables, id),
        EntityKind::LifeEvent => of::<LifeEvent>(tables, id),
        EntityKind::LdsOrdinance => of::<LdsOrdinance>(tables, id),
    }
}

/// Field-level differences between two views.
fn diff(before: Option<&Value>, after: Option<&Value>) -> BTreeMap<String, FieldChange> {
    let empty = serde_json::Map::new();
    let fields = |v: Option<&Value>| match v {
        Some(Value::Object(map)) => map.clone(),
        _ => empty.clone(),
    };
    let (old, new) = (fields(before), fields(after));

    let mut changes = BTreeMap::new();
    for key in old.keys().chain(new.keys()) {
        let old_value = old.get(key).cloned().unwrap_or(Value::Null);
        let new_value = new.get(key).cloned().unwrap_or(Value::Null);
        if old_value != new_value {
            changes.insert(
                key.clone(),
                FieldChange {
                    old: old_value,
                    new: new_value,
                },
            );
        }
    }
    changes
}

fn summarize(
    tables: &Tables,
    kind: EntityKind,
    name: &str,
    domain: &DomainEvent,
    changed: &BTreeMap<String, FieldChange>,
) -> String {
    let person = |id: Uuid| tables.person_label(id).unwrap_or_else(|| id.to_string());
    match domain {
        DomainEvent::PersonDeleted {
            merged_into: Some(survivor),
        } => format!("Merged {name} into {}", person(*survivor)),
        DomainEvent::PersonMerged(merge) => {
            if kind == EntityKind::Person {
                format!("Merged {} into {name}", merge.merged.full_name())
            } else {
                format!("Re-pointed from {} by a merge", merge.merged.full_name())
            }
        }
        DomainEvent::NameAdded { name: added } => format!(
            "Added name {}",
            join_name(&added.given_name, &added.surname)
        ),
        DomainEvent::NameUpdated { .. } => format!("Updated a name of {name}"),
        DomainEvent::NameRemoved { .. } => format!("Removed a name of {name}"),
        DomainEvent::ChildLinked { child } => {
            format!("Linked child {} to {name}", person(child.person_id))
        }
        DomainEvent::ChildUnlinked { person_id } => {
            format!("Unlinked child {} from {name}", person(*person_id))
        }
        _ => match domain.action() {
            "created" => format!("Created {kind} {name}"),
            "deleted" => format!("Deleted {kind} {name}"),
            "rolled_back" => format!(
                "Rolled back {name} to version {}",
                domain.rollback_target().unwrap_or_default()
            ),
            _ if changed.is_empty() => format!("Updated {name}"),
            _ => {
                let fields: Vec<&str> = changed.keys().map(String::as_str).collect();
                format!("Updated {} of {name}", fields.join(", "))
            }
        },
    }
}
