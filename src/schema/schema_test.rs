use std::collections::BTreeMap;

use super::*;

fn sample_schema() -> ConfigSchema {
    ConfigSchema::builder()
        .leaf("enabled", ValueKind::Boolean)
        .leaf("name", ValueKind::String)
        .group("limits", |g| {
            g.leaf("max_connections", ValueKind::Number)
                .leaf("allowed_hosts", ValueKind::StringArray)
                .group("http", |h| h.leaf("max_body", ValueKind::Number))
        })
        .build()
        .expect("valid schema")
}

#[test]
fn test_builder_indexes_every_leaf() {
    let schema = sample_schema();

    assert_eq!(schema.len(), 5);
    assert_eq!(
        schema.leaf_paths(),
        vec![
            ("enabled", ValueKind::Boolean),
            ("limits.allowed_hosts", ValueKind::StringArray),
            ("limits.http.max_body", ValueKind::Number),
            ("limits.max_connections", ValueKind::Number),
            ("name", ValueKind::String),
        ]
    );
}

#[test]
fn test_kind_of_distinguishes_unknown_and_group_paths() {
    let schema = sample_schema();

    assert_eq!(schema.kind_of("limits.http.max_body"), Ok(ValueKind::Number));
    assert_eq!(
        schema.kind_of("limits.http"),
        Err(SchemaError::NotALeaf("limits.http".to_string()))
    );
    assert_eq!(
        schema.kind_of("limits.nope"),
        Err(SchemaError::UnknownPath("limits.nope".to_string()))
    );
    assert_eq!(schema.kind_of(""), Err(SchemaError::EmptyPath));
}

#[test]
fn test_validate_value_checks_kind() {
    let schema = sample_schema();

    assert!(schema
        .validate_value("limits.max_connections", Some(&ConfigValue::Number(10.0)))
        .is_ok());
    assert!(schema.validate_value("limits.max_connections", None).is_ok());

    let err = schema
        .validate_value("limits.max_connections", Some(&ConfigValue::from("ten")))
        .unwrap_err();
    assert_eq!(
        err,
        SchemaError::TypeMismatch {
            path: "limits.max_connections".to_string(),
            expected: ValueKind::Number,
            actual: ValueKind::String,
        }
    );
}

#[test]
fn test_duplicate_segment_is_rejected() {
    let result = ConfigSchema::builder()
        .leaf("a", ValueKind::Number)
        .leaf("a", ValueKind::String)
        .build();

    assert_eq!(result.unwrap_err(), SchemaError::DuplicateSegment("a".to_string()));
}

#[test]
fn test_nested_builder_error_propagates() {
    let result = ConfigSchema::builder()
        .group("limits", |g| g.leaf("bad.name", ValueKind::Number))
        .build();

    assert!(matches!(result, Err(SchemaError::InvalidSegment { .. })));
}

#[test]
fn test_from_nodes_validates_segments() {
    let mut root = BTreeMap::new();
    root.insert("ok".to_string(), SchemaNode::Leaf(ValueKind::Boolean));
    root.insert("not ok".to_string(), SchemaNode::Leaf(ValueKind::Boolean));

    assert!(ConfigSchema::from_nodes(root).is_err());
}

#[test]
fn test_empty_schema() {
    let schema = ConfigSchema::builder().build().unwrap();
    assert!(schema.is_empty());
    assert!(schema.kind_of("anything").is_err());
}
