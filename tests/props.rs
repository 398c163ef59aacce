mod common;

use common::{ctx, name, new_person};
use kinfold::{
    CommandResult, EntityKind, EventStore, Genealogy, Person, PersonChanges, Tables, UpdatePerson,
    projector,
};
use proptest::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Op {
    Create(String),
    Update(usize, Option<String>),
    AddName(usize, String),
    Delete(usize),
    Rollback(usize, u64),
    Merge(usize, usize),
}

fn arb_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("John".to_string()),
        Just("Mary".to_string()),
        Just("Anne".to_string()),
        Just("".to_string()),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        arb_name().prop_map(Op::Create),
        (0..8usize, proptest::option::of("18[0-9]{2}")).prop_map(|(i, d)| Op::Update(i, d)),
        (0..8usize, arb_name()).prop_map(|(i, n)| Op::AddName(i, n)),
        (0..8usize).prop_map(Op::Delete),
        (0..8usize, 0..6u64).prop_map(|(i, v)| Op::Rollback(i, v)),
        (0..8usize, 0..8usize).prop_map(|(a, b)| Op::Merge(a, b)),
    ]
}

/// Run the ops, ignoring rejected commands; returns every person id created.
fn run(tree: &Genealogy, ops: &[Op]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = Vec::new();
    let current = |tree: &Genealogy, id: Uuid| tree.get::<Person>(id).map(|p| p.version).ok();
    for op in ops {
        match op {
            Op::Create(given) => {
                if let Ok(created) = tree.create_person(&ctx(), new_person(given, "Smith")) {
                    ids.push(created.id);
                }
            }
            Op::Update(i, date) => {
                let Some(&id) = ids.get(*i) else { continue };
                let Some(version) = current(tree, id) else { continue };
                let _ = tree.update_person(
                    &ctx(),
                    UpdatePerson {
                        id,
                        version,
                        changes: PersonChanges {
                            birth_date: Some(date.clone()),
                            ..Default::default()
                        },
                    },
                );
            }
            Op::AddName(i, given) => {
                let Some(&id) = ids.get(*i) else { continue };
                let Some(version) = current(tree, id) else { continue };
                let _ = tree.add_name(&ctx(), name(CommandResult { id, version }, given, "Smyth"));
            }
            Op::Delete(i) => {
                let Some(&id) = ids.get(*i) else { continue };
                let Some(version) = current(tree, id) else { continue };
                let _ = tree.delete_person(&ctx(), id, version);
            }
            Op::Rollback(i, target) => {
                let Some(&id) = ids.get(*i) else { continue };
                let _ = tree.rollback(&ctx(), EntityKind::Person, id, *target);
            }
            Op::Merge(a, b) => {
                let (Some(&a), Some(&b)) = (ids.get(*a), ids.get(*b)) else { continue };
                let (Some(va), Some(vb)) = (current(tree, a), current(tree, b)) else { continue };
                let _ = tree.merge_persons(
                    &ctx(),
                    kinfold::MergePersons {
                        survivor_id: a,
                        merged_id: b,
                        survivor_version: va,
                        merged_version: vb,
                        field_resolution: Default::default(),
                    },
                );
            }
        }
    }
    ids
}

// Replaying the whole log from empty tables reproduces the live read model.
proptest! {
    #[test]
    fn prop_replay_matches_live_read_model(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let tree = Genealogy::in_memory();
        run(&tree, &ops);

        let mut replayed = Tables::default();
        projector::replay(&mut replayed, &tree.events().load_all().unwrap());
        let live = tree.query(Tables::clone);
        prop_assert_eq!(replayed, live);
    }
}

// Every live record's version equals its stream length, and every stream
// is gapless and 1-based.
proptest! {
    #[test]
    fn prop_versions_match_stream_length(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let tree = Genealogy::in_memory();
        let ids = run(&tree, &ops);

        for id in ids {
            let stream = tree.events().load(id).unwrap();
            for (i, event) in stream.iter().enumerate() {
                prop_assert_eq!(event.version, i as u64 + 1);
            }
            if let Ok(person) = tree.get::<Person>(id) {
                prop_assert_eq!(person.version, stream.len() as u64);
            }
        }

        let all = tree.events().load_all().unwrap();
        let mut last_per_stream: HashMap<Uuid, u64> = HashMap::new();
        for event in &all {
            let last = last_per_stream.entry(event.aggregate_id).or_insert(0);
            prop_assert_eq!(event.version, *last + 1);
            *last = event.version;
        }
    }
}
