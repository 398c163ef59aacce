#![allow(dead_code)]

use kinfold::{
    AddName, CommandContext, CommandResult, Genealogy, LinkChild, NewFamily, NewPerson,
    NewSource, PendingEvent,
};
use serde_json::json;
use uuid::Uuid;

pub fn ctx() -> CommandContext {
    CommandContext::default().with_actor("tester")
}

pub fn pending(event_type: &str) -> PendingEvent {
    PendingEvent::new(event_type, json!({"key": "value"}))
}

pub fn new_person(given: &str, surname: &str) -> NewPerson {
    NewPerson {
        given_name: given.to_string(),
        surname: surname.to_string(),
        ..Default::default()
    }
}

pub fn person<E: kinfold::EventStore, R: kinfold::ReadModelStore>(
    tree: &Genealogy<E, R>,
    given: &str,
    surname: &str,
) -> CommandResult {
    tree.create_person(&ctx(), new_person(given, surname)).unwrap()
}

pub fn source<E: kinfold::EventStore, R: kinfold::ReadModelStore>(
    tree: &Genealogy<E, R>,
    title: &str,
) -> CommandResult {
    tree.create_source(
        &ctx(),
        NewSource {
            title: title.to_string(),
            ..Default::default()
        },
    )
    .unwrap()
}

pub fn name(person: CommandResult, given: &str, surname: &str) -> AddName {
    AddName {
        person_id: person.id,
        version: person.version,
        given_name: given.to_string(),
        surname: surname.to_string(),
        ..Default::default()
    }
}

/// A family of two partners with `children` linked in order.
pub fn family<E: kinfold::EventStore, R: kinfold::ReadModelStore>(
    tree: &Genealogy<E, R>,
    partner1: Uuid,
    partner2: Option<Uuid>,
    children: &[Uuid],
) -> CommandResult {
    let mut result = tree
        .create_family(
            &ctx(),
            NewFamily {
                partner1_id: Some(partner1),
                partner2_id: partner2,
                ..Default::default()
            },
        )
        .unwrap();
    for child in children {
        result = tree
            .link_child(
                &ctx(),
                LinkChild {
                    family_id: result.id,
                    version: result.version,
                    person_id: *child,
                    relationship: Default::default(),
                    sequence: None,
                },
            )
            .unwrap();
    }
    result
}
