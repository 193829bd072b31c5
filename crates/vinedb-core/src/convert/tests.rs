use super::*;
use crate::{
    backend::ColumnValue,
    entity::{NodeEntity, SyncLock},
    test_support::{fixture_files, fixture_mapping, fixture_registry},
};

fn assemble_row(param: &InsertParam, mapped: &MappedTable) -> BTreeMap<String, Value> {
    // simulate a fetched row: column -> value, then strip to fields
    let mut fields = BTreeMap::new();
    for (column, value) in &param.values {
        if let ColumnValue::Value(v) = value
            && let Some(field) = mapped.field(column)
        {
            fields.insert(field.to_string(), v.clone());
        }
    }
    fields
}

#[test]
fn insert_param_round_trips_every_non_binary_property() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);

    let mut node = NodeEntity::new("User")
        .prop("nickname", "n1")
        .prop("email", "n1@example.com")
        .prop("age", Value::Integer(33));
    node.id = "000001000000".into();
    node.uuid = "abc".into();
    node.create_time = Some(1_700_000_000_000);
    node.update_time = Some(1_700_000_000_000);

    let param = convert.node_insert_param(&node, &[]).unwrap();
    let mapped = mapping.node_table("User").unwrap();
    let fields = assemble_row(&param, mapped);
    let back = convert.fields_to_node("User", &fields).unwrap();

    assert_eq!(back.id, node.id);
    assert_eq!(back.uuid, node.uuid);
    assert_eq!(back.create_time, node.create_time);
    assert_eq!(back.update_time, node.update_time);
    assert_eq!(back.get("nickname"), node.get("nickname"));
    assert_eq!(back.get("email"), node.get("email"));
    assert_eq!(back.get("age"), node.get("age"));
}

#[test]
fn insert_param_substitutes_literal_defaults() {
    use vinedb_schema::property::DefaultValue;
    use vinedb_schema::{node::NodeDef, registry::Registry};

    let node_def = NodeDef::new("Task", "Task").prop(
        "state",
        PropertyDef::new("state", BaseType::String)
            .default_value(DefaultValue::Literal(Value::from("open"))),
    );
    let registry = Registry::new(vec![node_def], vec![]).unwrap();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);

    let mut task = NodeEntity::new("Task");
    task.id = "000001000000".into();
    let param = convert.node_insert_param(&task, &[]).unwrap();
    let state = param
        .values
        .iter()
        .find(|(c, _)| c == "P_STATE")
        .map(|(_, v)| v);
    assert!(matches!(
        state,
        Some(ColumnValue::Value(Value::Text(s))) if s == "open"
    ));
}

#[test]
fn binary_property_becomes_stream_reference() {
    use vinedb_schema::{node::NodeDef, registry::Registry};

    let node_def = NodeDef::new("Avatar", "Avatar")
        .prop("image", PropertyDef::new("image", BaseType::Binary));
    let registry = Registry::new(vec![node_def], vec![]).unwrap();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);

    let mut node = NodeEntity::new("Avatar").prop("image", Value::Binary(0));
    node.id = "000001000000".into();

    let param = convert.node_insert_param(&node, &fixture_files()).unwrap();
    let image = param
        .values
        .iter()
        .find(|(c, _)| c == "P_IMAGE")
        .map(|(_, v)| v);
    assert!(matches!(
        image,
        Some(ColumnValue::Stream(f)) if f.name == "avatar.png"
    ));

    // out-of-range index fails
    let bad = NodeEntity::new("Avatar").prop("image", Value::Binary(7));
    let err = convert.node_insert_param(&bad, &fixture_files()).unwrap_err();
    assert!(matches!(err, ConvertError::MissingFile { index: 7, .. }));
}

#[test]
fn binary_is_excluded_from_row_decoding() {
    use vinedb_schema::{node::NodeDef, registry::Registry};

    let node_def = NodeDef::new("Avatar", "Avatar")
        .prop("image", PropertyDef::new("image", BaseType::Binary));
    let registry = Registry::new(vec![node_def], vec![]).unwrap();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);

    let mut fields = BTreeMap::new();
    fields.insert("__id".to_string(), Value::from("000001000000"));
    fields.insert("image".to_string(), Value::from("blob:avatar.png"));
    let node = convert.fields_to_node("Avatar", &fields).unwrap();
    assert!(node.get("image").is_none());
}

#[test]
fn update_param_carries_sync_lock_column() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);

    let mut node = NodeEntity::new("User").prop("nickname", "n1");
    node.id = "000001000000".into();
    node.uuid = "abc".into();
    node.update_time = Some(5);
    node.sync_lock = Some(SyncLock {
        property: "nickname".to_string(),
        value: Value::from("n0"),
    });

    let param = convert.node_update_param(&node, &[]).unwrap();
    assert_eq!(param.id_column, "A_ID");
    assert_eq!(
        param.lock,
        Some(("P_NICKNAME".to_string(), Value::from("n0")))
    );
}

#[test]
fn coercion_accepts_widening_and_rejects_mismatch() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let float_prop = PropertyDef::new("score", BaseType::Float);
    let int_prop = PropertyDef::new("age", BaseType::Integer);
    let bool_prop = PropertyDef::new("flag", BaseType::Boolean);

    assert_eq!(
        convert
            .coerce("User", "score", &float_prop, &Value::Integer(3))
            .unwrap(),
        Value::Float(3.0)
    );
    assert_eq!(
        convert
            .coerce("User", "flag", &bool_prop, &Value::Integer(1))
            .unwrap(),
        Value::Boolean(true)
    );
    let err = convert
        .coerce("User", "age", &int_prop, &Value::from("x"))
        .unwrap_err();
    assert!(matches!(err, ConvertError::TypeMismatch { .. }));
}

#[test]
fn timestamp_text_is_decoded() {
    let decoded = EpochMillis
        .decode(&Value::from("2024-01-01T00:00:00Z"))
        .unwrap();
    assert_eq!(decoded, 1_704_067_200_000);
    assert!(EpochMillis.decode(&Value::Boolean(true)).is_err());
}

#[test]
fn event_insert_param_carries_endpoints() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);

    let mut event = crate::entity::EventEntity::new(
        "HAVE",
        ("UserGroup", "000001000001"),
        ("User", "000001000002"),
    );
    event.id = "000001000003".into();
    event.uuid = "u".into();

    let param = convert.event_insert_param(&event, &[]).unwrap();
    assert_eq!(param.table, "E_USER_GROUP_HAVE_USER");
    let get = |col: &str| {
        param
            .values
            .iter()
            .find(|(c, _)| c == col)
            .map(|(_, v)| v.clone())
    };
    assert!(matches!(
        get("A_LEFT"),
        Some(ColumnValue::Value(Value::Text(s))) if s == "000001000001"
    ));
    assert!(matches!(
        get("A_RIGHT_SD"),
        Some(ColumnValue::Value(Value::Text(s))) if s == "User"
    ));
}
