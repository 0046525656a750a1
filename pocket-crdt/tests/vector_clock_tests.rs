use pocket_crdt::{CausalOrder, VectorClock};
use pocket_types::NodeId;

fn node(name: &str) -> NodeId {
    NodeId::new(name)
}

#[test]
fn new_clock_is_empty() {
    let clock = VectorClock::new();
    assert!(clock.is_empty());
    assert_eq!(clock.len(), 0);
}

#[test]
fn get_unknown_node_returns_zero() {
    let clock = VectorClock::new();
    assert_eq!(clock.get(&node("nobody")), 0);
}

#[test]
fn increment_increases_time() {
    let a = node("a");
    let mut clock = VectorClock::new();

    assert_eq!(clock.increment(&a), 1);
    assert_eq!(clock.increment(&a), 2);
    assert_eq!(clock.get(&a), 2);
    assert_eq!(clock.len(), 1);
}

#[test]
fn update_never_lowers_an_entry() {
    let a = node("a");
    let mut clock = VectorClock::new();
    clock.update(&a, 10);
    clock.update(&a, 3);
    assert_eq!(clock.get(&a), 10);
}

#[test]
fn nodes_iterate_in_id_order() {
    let mut clock = VectorClock::new();
    clock.increment(&node("c"));
    clock.increment(&node("a"));
    clock.increment(&node("b"));
    let names: Vec<&str> = clock.nodes().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn merge_takes_pointwise_max() {
    let mut left = VectorClock::new();
    left.update(&node("a"), 3);
    left.update(&node("b"), 1);

    let mut right = VectorClock::new();
    right.update(&node("a"), 1);
    right.update(&node("c"), 7);

    let merged = left.merged(&right);
    assert_eq!(merged.get(&node("a")), 3);
    assert_eq!(merged.get(&node("b")), 1);
    assert_eq!(merged.get(&node("c")), 7);
    assert_eq!(merged, right.merged(&left));
}

#[test]
fn compare_equal() {
    let mut a = VectorClock::new();
    a.increment(&node("x"));
    let b = a.clone();
    assert_eq!(a.compare(&b), CausalOrder::Equal);
    assert!(a.dominates(&b));
}

#[test]
fn missing_entry_reads_as_zero() {
    let mut a = VectorClock::new();
    a.update(&node("x"), 0);
    assert_eq!(a.compare(&VectorClock::new()), CausalOrder::Equal);
}

#[test]
fn compare_before_and_after() {
    let mut earlier = VectorClock::new();
    earlier.increment(&node("x"));
    let mut later = earlier.clone();
    later.increment(&node("y"));

    assert_eq!(earlier.compare(&later), CausalOrder::Before);
    assert_eq!(later.compare(&earlier), CausalOrder::After);
    assert!(earlier.is_before(&later));
    assert!(later.is_after(&earlier));
    assert!(later.dominates(&earlier));
    assert!(!earlier.dominates(&later));
}

#[test]
fn compare_concurrent() {
    let mut a = VectorClock::new();
    a.increment(&node("x"));
    let mut b = VectorClock::new();
    b.increment(&node("y"));

    assert_eq!(a.compare(&b), CausalOrder::Concurrent);
    assert!(a.is_concurrent(&b));
    assert!(!a.dominates(&b));

    let merged = a.merged(&b);
    assert!(merged.dominates(&a));
    assert!(merged.dominates(&b));
}

#[test]
fn serializes_as_plain_map() {
    let mut clock = VectorClock::new();
    clock.update(&node("a"), 2);
    let json = serde_json::to_value(&clock).unwrap();
    assert_eq!(json, serde_json::json!({"a": 2}));
    let parsed: VectorClock = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, clock);
}
