use super::*;
use crate::ConfigValue;
use crate::SchemaError;

#[test]
fn test_flatten_preserves_insertion_order() {
    let patch = ConfigPatch::new()
        .group("app", |g| g.set("port", 8080).unset("name"))
        .set("debug", true)
        .group("limits", |g| g.set("rates", vec![1.5, 2.5]));

    let leaves = patch.flatten().unwrap();

    assert_eq!(
        leaves,
        vec![
            ("app.port".to_string(), Some(ConfigValue::from(8080))),
            ("app.name".to_string(), None),
            ("debug".to_string(), Some(ConfigValue::from(true))),
            (
                "limits.rates".to_string(),
                Some(ConfigValue::NumberArray(vec![1.5, 2.5]))
            ),
        ]
    );
}

#[test]
fn test_flatten_descends_nested_groups() {
    let patch = ConfigPatch::new().group("a", |g| g.group("b", |g| g.group("c", |g| g.set("d", "deep"))));

    let leaves = patch.flatten().unwrap();

    assert_eq!(leaves, vec![("a.b.c.d".to_string(), Some(ConfigValue::from("deep")))]);
}

#[test]
fn test_empty_patch_and_empty_groups_yield_nothing() {
    assert!(ConfigPatch::new().is_empty());
    assert!(ConfigPatch::new().flatten().unwrap().is_empty());

    let patch = ConfigPatch::new().group("app", |g| g);
    assert!(!patch.is_empty());
    assert!(patch.flatten().unwrap().is_empty());
}

#[test]
fn test_repeated_name_replaces_in_place() {
    let patch = ConfigPatch::new().set("a", 1).set("b", 2).set("a", 3);

    let leaves = patch.flatten().unwrap();

    assert_eq!(
        leaves,
        vec![
            ("a".to_string(), Some(ConfigValue::from(3))),
            ("b".to_string(), Some(ConfigValue::from(2))),
        ]
    );
}

#[test]
fn test_invalid_segment_is_rejected() {
    let patch = ConfigPatch::new().set("app.port", 1);

    assert!(matches!(
        patch.flatten(),
        Err(SchemaError::InvalidSegment { ref segment, .. }) if segment == "app.port"
    ));

    let patch = ConfigPatch::new().group("", |g| g.set("x", 1));
    assert!(matches!(patch.flatten(), Err(SchemaError::InvalidSegment { .. })));
}

#[test]
fn test_explicit_node() {
    let patch = ConfigPatch::new().node(
        "app",
        PatchNode::Group(vec![("tags".to_string(), PatchNode::Leaf(None))]),
    );

    assert_eq!(patch.nodes().len(), 1);
    assert_eq!(patch.flatten().unwrap(), vec![("app.tags".to_string(), None)]);
}
