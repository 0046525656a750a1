use pocket_types::{
    DocumentId, FieldOperation, FieldType, LamportTimestamp, NodeId, OperationKind,
};
use serde_json::json;

fn sample() -> FieldOperation {
    FieldOperation::new(
        DocumentId::from("doc-1"),
        "viewCount",
        FieldType::GCounter,
        LamportTimestamp::new(3, NodeId::new("n1")),
        OperationKind::Increment,
        json!(5),
    )
}

#[test]
fn new_operation_takes_node_from_timestamp() {
    let op = sample();
    assert_eq!(op.node_id, NodeId::new("n1"));
    assert_eq!(op.field, "viewCount");
}

#[test]
fn wire_form_uses_schema_names() {
    let op = sample();
    let value = serde_json::to_value(&op).unwrap();
    assert_eq!(value["documentId"], "doc-1");
    assert_eq!(value["type"], "g-counter");
    assert_eq!(value["operation"], "increment");
    assert_eq!(value["nodeId"], "n1");
    assert_eq!(value["timestamp"]["counter"], 3);
    assert_eq!(value["value"], 5);
}

#[test]
fn json_roundtrip() {
    let op = sample();
    let parsed = FieldOperation::from_json(&op.to_json().unwrap()).unwrap();
    assert_eq!(op, parsed);
}

#[test]
fn parses_operation_from_foreign_replica() {
    let raw = r#"{
        "id": "01890a5d-ac96-774b-bcce-b302099a8057",
        "documentId": "doc-9",
        "field": "title",
        "type": "lww-register",
        "nodeId": "bob",
        "timestamp": {"counter": 12, "nodeId": "bob"},
        "operation": "set",
        "value": "Hello"
    }"#;
    let op = FieldOperation::from_json(raw).unwrap();
    assert_eq!(op.field_type, FieldType::LwwRegister);
    assert_eq!(op.operation, OperationKind::Set);
    assert_eq!(op.value, json!("Hello"));
}

#[test]
fn missing_field_is_rejected() {
    let raw = r#"{"documentId": "d", "field": "f"}"#;
    assert!(FieldOperation::from_json(raw).is_err());
}

#[test]
fn field_type_names_roundtrip() {
    for ty in [
        FieldType::LwwRegister,
        FieldType::GCounter,
        FieldType::PnCounter,
        FieldType::OrSet,
        FieldType::LwwMap,
    ] {
        let parsed: FieldType = ty.as_str().parse().unwrap();
        assert_eq!(parsed, ty);
        assert_eq!(serde_json::to_value(ty).unwrap(), json!(ty.to_string()));
    }
    assert!("mv-register".parse::<FieldType>().is_err());
}

#[test]
fn field_type_supports_expected_kinds() {
    use OperationKind::*;
    assert!(FieldType::LwwRegister.supports(Set));
    assert!(!FieldType::LwwRegister.supports(Increment));
    assert!(FieldType::GCounter.supports(Increment));
    assert!(!FieldType::GCounter.supports(Decrement));
    assert!(FieldType::PnCounter.supports(Decrement));
    assert!(FieldType::OrSet.supports(Add));
    assert!(FieldType::OrSet.supports(Remove));
    assert!(!FieldType::OrSet.supports(Set));
    assert!(FieldType::LwwMap.supports(Set));
    assert!(FieldType::LwwMap.supports(Remove));
    assert!(!FieldType::LwwMap.supports(Add));
}
