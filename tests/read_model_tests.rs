mod common;

use common::{person, source};
use kinfold::{Genealogy, ListQuery, Person, Source};
use serde_json::json;

fn tree_with_people() -> Genealogy {
    let tree = Genealogy::in_memory();
    person(&tree, "John", "Smith");
    person(&tree, "Mary", "Smith");
    person(&tree, "Anne", "Jones");
    person(&tree, "Tom", "Brown");
    tree
}

#[test]
fn test_list_filters_by_field() {
    let tree = tree_with_people();
    let page = tree
        .list::<Person>(&ListQuery::default().filter("surname", json!("Smith")))
        .unwrap();
    assert_eq!(page.total, 2);
    assert!(page.items.iter().all(|p| p.surname == "Smith"));
}

#[test]
fn test_list_sorts_and_paginates() {
    let tree = tree_with_people();
    let page = tree
        .list::<Person>(&ListQuery::default().sort_by("given_name").limit(2))
        .unwrap();
    let names: Vec<&str> = page.items.iter().map(|p| p.given_name.as_str()).collect();
    assert_eq!(names, vec!["Anne", "John"]);
    assert_eq!(page.total, 4);
    assert!(page.has_more);

    let page = tree
        .list::<Person>(
            &ListQuery::default()
                .sort_by("given_name")
                .descending()
                .offset(3),
        )
        .unwrap();
    let names: Vec<&str> = page.items.iter().map(|p| p.given_name.as_str()).collect();
    assert_eq!(names, vec!["Anne"]);
    assert!(!page.has_more);
}

#[test]
fn test_list_search_matches_display_name() {
    let tree = tree_with_people();
    let page = tree
        .list::<Person>(&ListQuery::default().search("mary sm"))
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].given_name, "Mary");
}

#[test]
fn test_list_limit_is_clamped() {
    let tree = tree_with_people().with_max_page_size(3);
    assert_eq!(tree.max_page_size(), 3);

    let page = tree
        .list::<Person>(&ListQuery::default().limit(1000))
        .unwrap();
    assert_eq!(page.items.len(), 3);
    assert!(page.has_more);

    let page = tree.list::<Person>(&ListQuery::default().limit(0)).unwrap();
    assert_eq!(page.items.len(), 1);
}

#[test]
fn test_list_is_per_kind() {
    let tree = tree_with_people();
    source(&tree, "Parish register");
    let sources = tree.list::<Source>(&ListQuery::default()).unwrap();
    assert_eq!(sources.total, 1);
    assert_eq!(sources.items[0].title, "Parish register");
}

#[test]
fn test_rebuild_matches_live_read_model() {
    let tree = tree_with_people();
    let before = tree.query(|t| t.clone());
    tree.rebuild().unwrap();
    let after = tree.query(|t| t.clone());
    assert_eq!(before, after);
}
