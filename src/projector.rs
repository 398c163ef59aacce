//! Folds committed events into the read-model tables.
//!
//! [`apply`] is a pure mutation of [`Tables`]: no I/O, no clock, no
//! randomness. Everything it writes comes from the event, so replaying a log
//! from empty tables reproduces the tables built incrementally.

use crate::domain::{DomainEvent, PersonMerge};
use crate::event::{EntityKind, Event};
use crate::model::{
    Citation, Entity, Family, LdsOrdinance, LifeEvent, Media, Person, Record, Source, Tables,
};
use crate::read_model::decode_batch;
use uuid::Uuid;

/// Apply one decoded event.
///
/// After the event-specific mutation, the aggregate's own record (if it
/// still exists) is stamped with the event's version and timestamp, so the
/// record version always equals the stream length.
pub fn apply(tables: &mut Tables, event: &Event, domain: &DomainEvent) {
    let id = event.aggregate_id;
    match domain {
        DomainEvent::PersonCreated { person } => insert(tables, id, person),
        DomainEvent::PersonUpdated { changes } => {
            modify::<Person>(tables, event, |p| changes.apply_to(p));
        }
        DomainEvent::PersonDeleted { .. } => {
            tables.persons.remove(&id);
            tables.names.retain(|_, n| n.person_id != id);
        }
        DomainEvent::PersonMerged(merge) => apply_merge(tables, event, merge),
        DomainEvent::PersonRolledBack { changes, names, .. } => {
            modify::<Person>(tables, event, |p| changes.apply_to(p));
            if let Some(names) = names {
                tables.names.retain(|_, n| n.person_id != id);
                for name in names {
                    tables.names.insert(name.id, name.clone());
                }
            }
        }
        DomainEvent::NameAdded { name } => {
            if name.is_primary {
                demote_primary(tables, name.person_id);
            }
            tables.names.insert(name.id, name.clone());
        }
        DomainEvent::NameUpdated { name_id, changes } => {
            if changes.is_primary == Some(true)
                && let Some(person_id) = tables.names.get(name_id).map(|n| n.person_id)
            {
                demote_primary(tables, person_id);
            }
            if let Some(name) = tables.names.get_mut(name_id) {
                changes.apply_to(name);
            }
        }
        DomainEvent::NameRemoved { name_id } => {
            tables.names.remove(name_id);
        }

        DomainEvent::FamilyCreated { family } => insert(tables, id, family),
        DomainEvent::FamilyUpdated { changes } | DomainEvent::FamilyRolledBack { changes, .. } => {
            modify::<Family>(tables, event, |f| changes.apply_to(f));
        }
        DomainEvent::ChildLinked { child } => {
            modify::<Family>(tables, event, |f| {
                if !f.has_child(child.person_id) {
                    f.children.push(child.clone());
                }
            });
        }
        DomainEvent::ChildUnlinked { person_id } => {
            modify::<Family>(tables, event, |f| {
                f.children.retain(|c| c.person_id != *person_id);
            });
        }
        DomainEvent::FamilyDeleted => {
            tables.families.remove(&id);
        }

        DomainEvent::SourceCreated { source } => insert(tables, id, source),
        DomainEvent::SourceUpdated { changes } | DomainEvent::SourceRolledBack { changes, .. } => {
            modify::<Source>(tables, event, |s| changes.apply_to(s));
        }
        DomainEvent::SourceDeleted => {
            tables.sources.remove(&id);
        }

        DomainEvent::CitationCreated { citation } => insert(tables, id, citation),
        DomainEvent::CitationUpdated { changes }
        | DomainEvent::CitationRolledBack { changes, .. } => {
            modify::<Citation>(tables, event, |c| changes.apply_to(c));
        }
        DomainEvent::CitationDeleted => {
            tables.citations.remove(&id);
        }

        DomainEvent::MediaCreated { media } => insert(tables, id, media),
        DomainEvent::MediaUpdated { changes } | DomainEvent::MediaRolledBack { changes, .. } => {
            modify::<Media>(tables, event, |m| changes.apply_to(m));
        }
        DomainEvent::MediaDeleted => {
            tables.media.remove(&id);
        }

        DomainEvent::LifeEventCreated { life_event } => insert(tables, id, life_event),
        DomainEvent::LifeEventUpdated { changes }
        | DomainEvent::LifeEventRolledBack { changes, .. } => {
            modify::<LifeEvent>(tables, event, |e| changes.apply_to(e));
        }
        DomainEvent::LifeEventDeleted => {
            tables.life_events.remove(&id);
        }

        DomainEvent::LdsOrdinanceCreated { ordinance } => insert(tables, id, ordinance),
        DomainEvent::LdsOrdinanceUpdated { changes }
        | DomainEvent::LdsOrdinanceRolledBack { changes, .. } => {
            modify::<LdsOrdinance>(tables, event, |o| changes.apply_to(o));
        }
        DomainEvent::LdsOrdinanceDeleted => {
            tables.ordinances.remove(&id);
        }
    }

    stamp(tables, event);
}

/// Replay a sequence of stored events into `tables`.
pub fn replay<'a>(tables: &mut Tables, events: impl IntoIterator<Item = &'a Event>) {
    let events: Vec<Event> = events.into_iter().cloned().collect();
    for (event, domain) in decode_batch(&events) {
        apply(tables, event, &domain);
    }
}

fn insert<R: Record>(tables: &mut Tables, id: Uuid, record: &R) {
    R::table_mut(tables).insert(id, record.clone());
}

fn modify<R: Entity>(tables: &mut Tables, event: &Event, f: impl FnOnce(&mut R)) {
    match R::table_mut(tables).get_mut(&event.aggregate_id) {
        Some(record) => f(record),
        None => log::warn!(
            "kinfold: {} v{} targets missing {} {}",
            event.event_type,
            event.version,
            R::KIND,
            event.aggregate_id
        ),
    }
}

fn stamp(tables: &mut Tables, event: &Event) {
    let id = event.aggregate_id;
    let (version, at) = (event.version, event.ts);
    match event.aggregate_type {
        EntityKind::Person => stamp_in::<Person>(tables, id, version, at),
        EntityKind::Family => stamp_in::<Family>(tables, id, version, at),
        EntityKind::Source => stamp_in::<Source>(tables, id, version, at),
        EntityKind::Citation => stamp_in::<Citation>(tables, id, version, at),
        EntityKind::Media => stamp_in::<Media>(tables, id, version, at),
        EntityKind::LifeEvent => stamp_in::<LifeEvent>(tables, id, version, at),
        EntityKind::LdsOrdinance => stamp_in::<LdsOrdinance>(tables, id, version, at),
        EntityKind::Name => {}
    }
}

fn stamp_in<R: Entity>(
    tables: &mut Tables,
    id: Uuid,
    version: u64,
    at: chrono::DateTime<chrono::Utc>,
) {
    if let Some(record) = R::table_mut(tables).get_mut(&id) {
        record.stamp(version, at);
    }
}

fn demote_primary(tables: &mut Tables, person_id: Uuid) {
    for name in tables.names.values_mut() {
        if name.person_id == person_id {
            name.is_primary = false;
        }
    }
}

/// Re-point everything listed in the merge from the merged person to the
/// survivor (the aggregate the event belongs to).
fn apply_merge(tables: &mut Tables, event: &Event, merge: &PersonMerge) {
    let survivor = event.aggregate_id;
    let merged = merge.merged_id;

    modify::<Person>(tables, event, |p| merge.changes.apply_to(p));

    for id in &merge.families {
        if let Some(family) = tables.families.get_mut(id) {
            family.replace_person(merged, survivor);
        }
    }
    for id in &merge.citations {
        if let Some(citation) = tables.citations.get_mut(id)
            && citation.owner_id == merged
        {
            citation.owner_id = survivor;
        }
    }
    for id in &merge.names {
        if let Some(name) = tables.names.get_mut(id) {
            name.person_id = survivor;
            name.is_primary = false;
        }
    }
    for id in &merge.life_events {
        if let Some(life_event) = tables.life_events.get_mut(id)
            && life_event.owner_id == merged
        {
            life_event.owner_id = survivor;
        }
    }
    for id in &merge.media {
        if let Some(media) = tables.media.get_mut(id)
            && media.owner_id == merged
        {
            media.owner_id = survivor;
        }
    }
    for id in &merge.ordinances {
        if let Some(ordinance) = tables.ordinances.get_mut(id)
            && ordinance.person_id == Some(merged)
        {
            ordinance.person_id = Some(survivor);
        }
    }
}
