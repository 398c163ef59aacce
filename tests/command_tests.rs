mod common;

use common::{ctx, family, name, new_person, person, source};
use kinfold::{
    CommandContext, EntityKind, Error, EventStore, ExpectedVersion, Family, FamilyChanges,
    Genealogy, LinkChild, Media, NameChanges, NameType, NewCitation, NewLifeEvent, NewMedia,
    NewLdsOrdinance, FactType, OrdinanceType, Person, PersonChanges, PersonName, Source,
    SourceChanges, UpdateFamily, UpdateName, UpdatePerson, UpdateSource, Citation, LifeEvent,
    LdsOrdinance,
};
use serde_json::json;
use std::sync::Barrier;
use uuid::Uuid;

#[test]
fn test_create_person_reads_own_write() {
    let tree = Genealogy::in_memory();
    let created = person(&tree, "Ada", "Lovelace");
    assert_eq!(created.version, 1);

    let ada: Person = tree.get(created.id).unwrap();
    assert_eq!(ada.full_name(), "Ada Lovelace");
    assert_eq!(ada.version, 1);
    assert_eq!(tree.version(created.id).unwrap(), 1);
}

#[test]
fn test_create_person_requires_a_name() {
    let tree = Genealogy::in_memory();
    let err = tree.create_person(&ctx(), new_person(" ", "")).unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");
    assert!(tree.events().load_all().unwrap().is_empty());
}

#[test]
fn test_create_with_existing_id_conflicts() {
    let tree = Genealogy::in_memory();
    let first = person(&tree, "Ada", "Lovelace");
    let mut again = new_person("Ada", "Byron");
    again.id = Some(first.id);
    let err = tree.create_person(&ctx(), again).unwrap_err();
    assert!(matches!(
        err,
        Error::ConcurrencyConflict {
            expected: ExpectedVersion::NoStream,
            actual: 1
        }
    ));
}

#[test]
fn test_stale_update_is_rejected() {
    let tree = Genealogy::in_memory();
    let created = person(&tree, "John", "Smith");

    let first = tree
        .update_person(
            &ctx(),
            UpdatePerson {
                id: created.id,
                version: 1,
                changes: PersonChanges {
                    birth_date: Some(Some("1850".into())),
                    ..Default::default()
                },
            },
        )
        .unwrap();
    assert_eq!(first.version, 2);

    // A second writer still holding version 1.
    let stale = tree.update_person(
        &ctx(),
        UpdatePerson {
            id: created.id,
            version: 1,
            changes: PersonChanges {
                birth_place: Some(Some("Boston".into())),
                ..Default::default()
            },
        },
    );
    assert!(matches!(
        stale,
        Err(Error::ConcurrencyConflict {
            expected: ExpectedVersion::Exact(1),
            actual: 2
        })
    ));

    // Retrying with the fresh version succeeds.
    let retried = tree
        .update_person(
            &ctx(),
            UpdatePerson {
                id: created.id,
                version: 2,
                changes: PersonChanges {
                    birth_place: Some(Some("Boston".into())),
                    ..Default::default()
                },
            },
        )
        .unwrap();
    assert_eq!(retried.version, 3);

    let john: Person = tree.get(created.id).unwrap();
    assert_eq!(john.birth_date.as_deref(), Some("1850"));
    assert_eq!(john.birth_place.as_deref(), Some("Boston"));
}

#[test]
fn test_version_zero_is_invalid() {
    let tree = Genealogy::in_memory();
    let created = person(&tree, "John", "Smith");
    let err = tree.delete_person(&ctx(), created.id, 0).unwrap_err();
    assert!(matches!(err, Error::InvalidVersion(0)));
}

#[test]
fn test_update_that_changes_nothing_appends_nothing() {
    let tree = Genealogy::in_memory();
    let created = person(&tree, "John", "Smith");
    let result = tree
        .update_person(
            &ctx(),
            UpdatePerson {
                id: created.id,
                version: 1,
                changes: PersonChanges {
                    given_name: Some("John".into()),
                    ..Default::default()
                },
            },
        )
        .unwrap();
    assert_eq!(result.version, 1);
    assert_eq!(tree.version(created.id).unwrap(), 1);
}

#[test]
fn test_clearing_an_optional_field() {
    let tree = Genealogy::in_memory();
    let mut input = new_person("John", "Smith");
    input.notes = Some("check census".into());
    let created = tree.create_person(&ctx(), input).unwrap();

    tree.update_person(
        &ctx(),
        UpdatePerson {
            id: created.id,
            version: 1,
            changes: PersonChanges {
                notes: Some(None),
                ..Default::default()
            },
        },
    )
    .unwrap();
    let john: Person = tree.get(created.id).unwrap();
    assert_eq!(john.notes, None);
}

#[test]
fn test_context_lands_on_the_event() {
    let tree = Genealogy::in_memory();
    let ctx = CommandContext::default()
        .with_actor("user-42")
        .with_correlation_id("req-1")
        .with_metadata(json!({"source": "import"}));
    let created = tree.create_person(&ctx, new_person("Ada", "Lovelace")).unwrap();

    let event = &tree.events().load(created.id).unwrap()[0];
    assert_eq!(event.event_type, "PersonCreated");
    assert_eq!(event.actor.as_deref(), Some("user-42"));
    let meta = event.meta.as_ref().unwrap();
    assert_eq!(meta["correlation_id"], "req-1");
    assert_eq!(meta["source"], "import");
}

#[test]
fn test_delete_person_removes_record_and_names() {
    let tree = Genealogy::in_memory();
    let created = person(&tree, "Mary", "Jones");
    let named = tree.add_name(&ctx(), name(created, "Mary", "Brown")).unwrap();

    let deleted = tree.delete_person(&ctx(), created.id, named.version).unwrap();
    assert_eq!(deleted.version, 3);
    assert!(matches!(
        tree.get::<Person>(created.id),
        Err(Error::NotFound {
            kind: EntityKind::Person,
            ..
        })
    ));
    assert!(tree.names(created.id).is_empty());

    // The stream stays.
    assert_eq!(tree.events().load(created.id).unwrap().len(), 3);
}

#[test]
fn test_names_live_on_the_person_stream() {
    let tree = Genealogy::in_memory();
    let created = person(&tree, "Mary", "Jones");
    let mut married = name(created, "Mary", "Brown");
    married.name_type = NameType::Married;
    married.is_primary = true;
    let after = tree.add_name(&ctx(), married).unwrap();
    assert_eq!(after.id, created.id);
    assert_eq!(after.version, 2);

    let mut aka = name(after, "Polly", "Brown");
    aka.name_type = NameType::Aka;
    aka.is_primary = true;
    let after = tree.add_name(&ctx(), aka).unwrap();

    let names = tree.names(created.id);
    assert_eq!(names.len(), 2);
    assert_eq!(names.iter().filter(|n| n.is_primary).count(), 1);
    assert_eq!(names[0].given_name, "Polly");

    let brown = names.iter().find(|n| n.given_name == "Mary").unwrap();
    let updated = tree
        .update_name(
            &ctx(),
            UpdateName {
                person_id: created.id,
                version: after.version,
                name_id: brown.id,
                changes: NameChanges {
                    surname: Some("Browne".into()),
                    ..Default::default()
                },
            },
        )
        .unwrap();
    let renamed: PersonName = tree.get(brown.id).unwrap();
    assert_eq!(renamed.surname, "Browne");

    let removed = tree
        .remove_name(&ctx(), created.id, updated.version, brown.id)
        .unwrap();
    assert_eq!(removed.version, 5);
    assert_eq!(tree.names(created.id).len(), 1);
}

#[test]
fn test_name_of_another_person_is_not_found() {
    let tree = Genealogy::in_memory();
    let a = person(&tree, "A", "One");
    let b = person(&tree, "B", "Two");
    let a2 = tree.add_name(&ctx(), name(a, "Alias", "One")).unwrap();
    let alias = tree.names(a.id)[0].id;

    let err = tree.remove_name(&ctx(), b.id, b.version, alias).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err}");
    assert_eq!(tree.version(a.id).unwrap(), a2.version);
}

#[test]
fn test_family_links_children_in_order() {
    let tree = Genealogy::in_memory();
    let dad = person(&tree, "George", "Smith");
    let mom = person(&tree, "Anne", "Smith");
    let kid1 = person(&tree, "Tom", "Smith");
    let kid2 = person(&tree, "Sue", "Smith");

    let fam = family(&tree, dad.id, Some(mom.id), &[kid1.id, kid2.id]);
    assert_eq!(fam.version, 3);

    let family: Family = tree.get(fam.id).unwrap();
    let order: Vec<(Uuid, u32)> = family
        .children
        .iter()
        .map(|c| (c.person_id, c.sequence))
        .collect();
    assert_eq!(order, vec![(kid1.id, 1), (kid2.id, 2)]);
    assert_eq!(tree.query(|t| t.parents_of(kid1.id)), vec![dad.id, mom.id]);
}

#[test]
fn test_link_child_rejects_invalid_links() {
    let tree = Genealogy::in_memory();
    let grandpa = person(&tree, "Old", "Smith");
    let dad = person(&tree, "George", "Smith");
    let kid = person(&tree, "Tom", "Smith");
    let upper = family(&tree, grandpa.id, None, &[dad.id]);
    let fam = family(&tree, dad.id, None, &[kid.id]);

    let link = |person_id: Uuid, family_id: Uuid, version: u64| LinkChild {
        family_id,
        version,
        person_id,
        relationship: Default::default(),
        sequence: None,
    };

    // Partner as own child.
    let err = tree.link_child(&ctx(), link(dad.id, fam.id, fam.version)).unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");

    // Already a child here.
    let err = tree.link_child(&ctx(), link(kid.id, fam.id, fam.version)).unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");

    // Already a child of another family.
    let err = tree
        .link_child(&ctx(), link(kid.id, upper.id, upper.version))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");

    // Grandpa cannot become his grandson's child.
    let other = family(&tree, kid.id, None, &[]);
    let err = tree
        .link_child(&ctx(), link(grandpa.id, other.id, other.version))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");

    // Missing person.
    let err = tree
        .link_child(&ctx(), link(Uuid::new_v4(), other.id, other.version))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err}");
}

#[test]
fn test_update_family_rejects_partner_below_a_child() {
    let tree = Genealogy::in_memory();
    let grandpa = person(&tree, "Old", "Smith");
    let dad = person(&tree, "George", "Smith");
    let kid = person(&tree, "Tom", "Smith");
    let upper = family(&tree, grandpa.id, None, &[dad.id]);
    family(&tree, dad.id, None, &[kid.id]);

    // Tom would become his own father's parent.
    let err = tree
        .update_family(
            &ctx(),
            UpdateFamily {
                id: upper.id,
                version: upper.version,
                changes: FamilyChanges {
                    partner2_id: Some(Some(kid.id)),
                    ..Default::default()
                },
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");
    assert!(!tree.query(|t| t.is_ancestor(kid.id, kid.id)));
}

#[test]
fn test_concurrent_links_of_one_child_into_two_families() {
    let tree = Genealogy::in_memory();
    let dad = person(&tree, "George", "Smith");
    let mom = person(&tree, "Ellen", "Brown");
    let kid = person(&tree, "Tom", "Smith");
    let families = [
        family(&tree, dad.id, None, &[]),
        family(&tree, mom.id, None, &[]),
    ];
    let barrier = Barrier::new(2);

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = families
            .iter()
            .map(|fam| {
                let (tree, barrier) = (&tree, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    tree.link_child(
                        &ctx(),
                        LinkChild {
                            family_id: fam.id,
                            version: fam.version,
                            person_id: kid.id,
                            relationship: Default::default(),
                            sequence: None,
                        },
                    )
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(tree.query(|t| t.child_families_of(kid.id).len()), 1);
}

#[test]
fn test_unlink_child() {
    let tree = Genealogy::in_memory();
    let dad = person(&tree, "George", "Smith");
    let kid = person(&tree, "Tom", "Smith");
    let fam = family(&tree, dad.id, None, &[kid.id]);

    let result = tree.unlink_child(&ctx(), fam.id, fam.version, kid.id).unwrap();
    let family: Family = tree.get(fam.id).unwrap();
    assert!(family.children.is_empty());

    let err = tree
        .unlink_child(&ctx(), fam.id, result.version, kid.id)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_update_family_cannot_touch_children() {
    let tree = Genealogy::in_memory();
    let dad = person(&tree, "George", "Smith");
    let fam = family(&tree, dad.id, None, &[]);
    let err = tree
        .update_family(
            &ctx(),
            UpdateFamily {
                id: fam.id,
                version: fam.version,
                changes: FamilyChanges {
                    children: Some(vec![]),
                    ..Default::default()
                },
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_family_partner_must_exist() {
    let tree = Genealogy::in_memory();
    let err = tree
        .create_family(
            &ctx(),
            kinfold::NewFamily {
                partner1_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err}");
}

#[test]
fn test_source_and_citation_lifecycle() {
    let tree = Genealogy::in_memory();
    let john = person(&tree, "John", "Smith");
    let census = source(&tree, "1850 Census");

    let citation = tree
        .create_citation(
            &ctx(),
            NewCitation {
                page: Some("p. 12".into()),
                ..NewCitation::new(census.id, EntityKind::Person, john.id)
            },
        )
        .unwrap();
    let stored: Citation = tree.get(citation.id).unwrap();
    assert_eq!(stored.page.as_deref(), Some("p. 12"));

    // A cited source cannot go away.
    let err = tree.delete_source(&ctx(), census.id, census.version).unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");

    tree.delete_citation(&ctx(), citation.id, citation.version)
        .unwrap();
    tree.delete_source(&ctx(), census.id, census.version).unwrap();
    assert!(tree.get::<Source>(census.id).is_err());
}

#[test]
fn test_citation_needs_existing_source_and_owner() {
    let tree = Genealogy::in_memory();
    let john = person(&tree, "John", "Smith");
    let census = source(&tree, "1850 Census");

    let err = tree
        .create_citation(&ctx(), NewCitation::new(Uuid::new_v4(), EntityKind::Person, john.id))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: EntityKind::Source, .. }), "{err}");

    let err = tree
        .create_citation(&ctx(), NewCitation::new(census.id, EntityKind::Person, Uuid::new_v4()))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: EntityKind::Person, .. }), "{err}");
}

#[test]
fn test_update_source() {
    let tree = Genealogy::in_memory();
    let census = source(&tree, "1850 Census");
    let updated = tree
        .update_source(
            &ctx(),
            UpdateSource {
                id: census.id,
                version: census.version,
                changes: SourceChanges {
                    author: Some(Some("US Census Bureau".into())),
                    ..Default::default()
                },
            },
        )
        .unwrap();
    assert_eq!(updated.version, 2);

    let err = tree
        .update_source(
            &ctx(),
            UpdateSource {
                id: census.id,
                version: updated.version,
                changes: SourceChanges {
                    title: Some(String::new()),
                    ..Default::default()
                },
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_media_life_event_and_ordinance() {
    let tree = Genealogy::in_memory();
    let john = person(&tree, "John", "Smith");

    let photo = tree
        .create_media(
            &ctx(),
            NewMedia {
                id: None,
                owner_type: EntityKind::Person,
                owner_id: john.id,
                title: "Portrait".into(),
                description: None,
                mime_type: "image/jpeg".into(),
                file_name: Some("john.jpg".into()),
                file_size: 2048,
            },
        )
        .unwrap();
    let media: Media = tree.get(photo.id).unwrap();
    assert_eq!(media.owner_id, john.id);

    let birth = tree
        .create_life_event(
            &ctx(),
            NewLifeEvent {
                id: None,
                owner_type: EntityKind::Person,
                owner_id: john.id,
                fact_type: FactType::Birth,
                date: Some("ABT 1850".into()),
                place: Some("Boston".into()),
                description: None,
            },
        )
        .unwrap();
    let event: LifeEvent = tree.get(birth.id).unwrap();
    assert_eq!(event.date.as_deref(), Some("ABT 1850"));

    let baptism = tree
        .create_lds_ordinance(
            &ctx(),
            NewLdsOrdinance {
                id: None,
                ordinance_type: OrdinanceType::Baptism,
                person_id: Some(john.id),
                family_id: None,
                date: None,
                place: None,
                temple_code: Some("SLAKE".into()),
                status: None,
                notes: None,
            },
        )
        .unwrap();
    let ordinance: LdsOrdinance = tree.get(baptism.id).unwrap();
    assert_eq!(ordinance.person_id, Some(john.id));

    // Media needs a title.
    let err = tree
        .create_media(
            &ctx(),
            NewMedia {
                id: None,
                owner_type: EntityKind::Person,
                owner_id: john.id,
                title: "".into(),
                description: None,
                mime_type: "image/png".into(),
                file_name: None,
                file_size: 0,
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    tree.delete_media(&ctx(), photo.id, photo.version).unwrap();
    assert!(tree.get::<Media>(photo.id).is_err());
}

#[test]
fn test_failed_command_appends_nothing() {
    let tree = Genealogy::in_memory();
    let john = person(&tree, "John", "Smith");
    let before = tree.events().load_all().unwrap().len();

    let _ = tree.update_person(
        &ctx(),
        UpdatePerson {
            id: john.id,
            version: 7,
            changes: PersonChanges::default(),
        },
    );
    let _ = tree.create_citation(&ctx(), NewCitation::new(Uuid::new_v4(), EntityKind::Person, john.id));

    assert_eq!(tree.events().load_all().unwrap().len(), before);
}
