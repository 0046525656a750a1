use pocket_crdt::{ORSet, Tag};
use pocket_types::OperationId;
use std::collections::HashSet;

#[test]
fn new_set_is_empty() {
    let set: ORSet<i32> = ORSet::new();
    assert!(set.is_empty());
    assert_eq!(set.len(), 0);
}

#[test]
fn add_and_contains() {
    let mut set = ORSet::new();
    set.add(1);
    set.add(2);
    assert!(set.contains(&1));
    assert!(set.contains(&2));
    assert!(!set.contains(&3));
    assert_eq!(set.len(), 2);
}

#[test]
fn add_returns_unique_tags() {
    let mut set = ORSet::new();
    let t1 = set.add(1);
    let t2 = set.add(1);
    assert_ne!(t1, t2);
    assert_eq!(set.tags_for(&1).len(), 2);
    assert_eq!(set.len(), 1);
}

#[test]
fn remove_returns_observed_tags() {
    let mut set = ORSet::new();
    let t1 = set.add("x");
    let t2 = set.add("x");
    let mut expected = vec![t1, t2];
    expected.sort();

    assert_eq!(set.remove(&"x"), expected);
    assert!(!set.contains(&"x"));
    assert!(set.is_tombstoned(&t1));
    assert!(set.is_tombstoned(&t2));
}

#[test]
fn remove_nonexistent_returns_empty() {
    let mut set: ORSet<i32> = ORSet::new();
    assert!(set.remove(&999).is_empty());
}

#[test]
fn tag_from_operation_id_is_stable() {
    let op = OperationId::new();
    assert_eq!(Tag::from(op), Tag::from(op));
}

#[test]
fn add_with_tombstoned_tag_stays_removed() {
    let mut set = ORSet::new();
    let tag = Tag::new();
    set.remove_tags(&[tag]);
    assert!(!set.add_with_tag("late", tag));
    assert!(!set.contains(&"late"));
}

#[test]
fn readding_with_fresh_tag_revives() {
    let mut set = ORSet::new();
    set.add("x");
    set.remove(&"x");
    assert!(set.add_with_tag("x", Tag::new()));
    assert!(set.contains(&"x"));
}

#[test]
fn concurrent_add_and_remove_add_wins() {
    let mut a = ORSet::new();
    a.add("shared");
    let mut b = a.clone();

    a.remove(&"shared");
    b.add("shared");

    let ab = a.merged(&b);
    let ba = b.merged(&a);
    assert!(ab.contains(&"shared"));
    assert_eq!(ab, ba);
}

#[test]
fn merge_is_idempotent() {
    let mut a = ORSet::new();
    a.add(1);
    a.add(2);
    a.remove(&1);
    assert_eq!(a.merged(&a), a);
}

#[test]
fn iter_yields_live_elements_only() {
    let mut set = ORSet::new();
    set.add("a");
    set.add("b");
    set.add("c");
    set.remove(&"b");
    let live: HashSet<&str> = set.iter().copied().collect();
    assert_eq!(live, HashSet::from(["a", "c"]));
}

#[test]
fn from_iterator() {
    let set: ORSet<u8> = [1, 2, 2, 3].into_iter().collect();
    assert_eq!(set.len(), 3);
}

#[test]
fn serde_roundtrip() {
    let mut set = ORSet::new();
    set.add("a".to_string());
    set.add("b".to_string());
    set.remove(&"a".to_string());
    let json = serde_json::to_string(&set).unwrap();
    let parsed: ORSet<String> = serde_json::from_str(&json).unwrap();
    assert_eq!(set, parsed);
}
