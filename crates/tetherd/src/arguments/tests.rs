//! Unit tests for argument resolution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::handles::{HandleObject, NewObject};

#[derive(Debug)]
struct Database;

impl HandleObject for Database {
    const TYPE_TAG: TypeTag = TypeTag::new("database");
}

#[derive(Debug)]
struct Document;

impl HandleObject for Document {
    const TYPE_TAG: TypeTag = TypeTag::new("document");
}

#[fixture]
fn registry() -> HandleRegistry {
    HandleRegistry::new()
}

fn bag(value: Value) -> ArgumentBag {
    match value {
        Value::Object(map) => ArgumentBag::from(map),
        other => panic!("argument bag must be an object, got {other}"),
    }
}

fn database_signature() -> Signature {
    Signature::new([
        Param::required("database", ParamKind::Object(Database::TYPE_TAG)),
        Param::optional("name", ParamKind::String),
    ])
}

#[rstest]
fn replaces_markers_with_the_registered_instance(registry: HandleRegistry) {
    let shared = Arc::new(Database);
    let handle = registry.register(NewObject::shared(Arc::clone(&shared)));
    let args = ArgumentResolver::new(&registry)
        .resolve(
            &bag(json!({ "database": handle.to_string(), "name": "db" })),
            &database_signature(),
        )
        .expect("resolve arguments");

    let resolved = args.object::<Database>("database").expect("database");
    assert!(Arc::ptr_eq(&shared, &resolved));
    assert_eq!(args.str("name"), Ok("db"));
}

#[rstest]
fn unknown_handles_are_reported_with_the_argument_name(registry: HandleRegistry) {
    let error = ArgumentResolver::new(&registry)
        .resolve(&bag(json!({ "database": "@41" })), &database_signature())
        .expect_err("nothing registered");

    let Some(handle) = Handle::from_marker("@41") else {
        panic!("marker should parse");
    };
    assert_eq!(
        error,
        ArgumentError::UnknownHandle {
            argument: "database".to_owned(),
            handle,
        }
    );
}

#[rstest]
#[case::absent(json!({ "name": "db" }))]
#[case::null(json!({ "database": null }))]
fn missing_required_arguments_are_reported(registry: HandleRegistry, #[case] raw: Value) {
    let error = ArgumentResolver::new(&registry)
        .resolve(&bag(raw), &database_signature())
        .expect_err("database is required");
    assert_eq!(error, ArgumentError::missing("database"));
}

#[rstest]
fn missing_arguments_win_over_unknown_handles(registry: HandleRegistry) {
    let signature = Signature::new([
        Param::required("other", ParamKind::AnyObject),
        Param::required("database", ParamKind::AnyObject),
    ]);
    let error = ArgumentResolver::new(&registry)
        .resolve(&bag(json!({ "other": "@9" })), &signature)
        .expect_err("database missing");
    assert_eq!(error, ArgumentError::missing("database"));
}

#[rstest]
fn wrong_object_kind_is_a_type_mismatch(registry: HandleRegistry) {
    let handle = registry.register_value(Document);
    let error = ArgumentResolver::new(&registry)
        .resolve(
            &bag(json!({ "database": handle.to_string() })),
            &database_signature(),
        )
        .expect_err("document is not a database");
    assert_eq!(
        error,
        ArgumentError::type_mismatch("database", "database", "document")
    );
}

#[rstest]
#[case::number_for_string(ParamKind::String, json!(5), "number")]
#[case::text_for_integer(ParamKind::Integer, json!("5"), "string")]
#[case::fraction_for_integer(ParamKind::Integer, json!(1.5), "number")]
#[case::mapping_for_sequence(ParamKind::Sequence, json!({}), "mapping")]
#[case::text_for_object(ParamKind::AnyObject, json!("plain"), "string")]
fn plain_value_shapes_are_checked(
    registry: HandleRegistry,
    #[case] kind: ParamKind,
    #[case] value: Value,
    #[case] found: &str,
) {
    let signature = Signature::new([Param::required("value", kind)]);
    let error = ArgumentResolver::new(&registry)
        .resolve(&bag(json!({ "value": value })), &signature)
        .expect_err("shape mismatch");
    assert_eq!(
        error,
        ArgumentError::type_mismatch("value", kind.to_string(), found)
    );
}

#[rstest]
fn nested_markers_are_resolved(registry: HandleRegistry) {
    let first = registry.register_value(Document);
    let second = registry.register_value(Document);
    let args = ArgumentResolver::new(&registry)
        .resolve(
            &bag(json!({
                "documents": [first.to_string(), { "inner": second.to_string() }],
            })),
            &Signature::none(),
        )
        .expect("resolve nested");

    let Some(Resolved::Sequence(items)) = args.get("documents") else {
        panic!("documents should be a sequence");
    };
    assert!(matches!(&items[0], Resolved::Object(object) if object.handle() == first));
    let Resolved::Mapping(inner) = &items[1] else {
        panic!("second item should be a mapping");
    };
    assert!(
        matches!(inner.get("inner"), Some(Resolved::Object(object)) if object.handle() == second)
    );
}

#[rstest]
fn nested_unknown_markers_fail_resolution(registry: HandleRegistry) {
    let error = ArgumentResolver::new(&registry)
        .resolve(&bag(json!({ "items": ["@3"] })), &Signature::none())
        .expect_err("unknown nested handle");
    assert!(matches!(error, ArgumentError::UnknownHandle { argument, .. } if argument == "items"));
}

#[rstest]
#[case::bare_at("@")]
#[case::email("someone@example.com")]
#[case::suffix("@12abc")]
fn non_marker_text_stays_plain(registry: HandleRegistry, #[case] text: &str) {
    let args = ArgumentResolver::new(&registry)
        .resolve(&bag(json!({ "text": text })), &Signature::none())
        .expect("plain text");
    assert_eq!(args.str("text"), Ok(text));
}

#[rstest]
fn resolution_does_not_change_the_registry(registry: HandleRegistry) {
    let handle = registry.register_value(Database);
    let before = registry.len();
    let _ = ArgumentResolver::new(&registry).resolve(
        &bag(json!({ "database": handle.to_string(), "missing": "@99" })),
        &database_signature(),
    );
    assert_eq!(registry.len(), before);
    assert!(registry.contains(handle));
}

#[rstest]
fn optional_arguments_may_be_null(registry: HandleRegistry) {
    let handle = registry.register_value(Database);
    let args = ArgumentResolver::new(&registry)
        .resolve(
            &bag(json!({ "database": handle.to_string(), "name": null })),
            &database_signature(),
        )
        .expect("null optional");
    assert_eq!(args.optional_str("name"), Ok(None));
    assert!(matches!(args.raw("name"), Some(Resolved::Null)));
}

#[rstest]
fn resolved_values_render_objects_as_markers(registry: HandleRegistry) {
    let handle = registry.register_value(Document);
    let args = ArgumentResolver::new(&registry)
        .resolve(
            &bag(json!({ "content": { "doc": handle.to_string(), "n": 1 } })),
            &Signature::none(),
        )
        .expect("resolve");
    let map = args
        .optional_mapping("content")
        .expect("mapping")
        .expect("present");
    assert_eq!(
        Value::Object(map.to_json()),
        json!({ "doc": handle.to_string(), "n": 1 })
    );
}

#[rstest]
fn typed_accessors_reject_other_shapes(registry: HandleRegistry) {
    let args = ArgumentResolver::new(&registry)
        .resolve(&bag(json!({ "count": "three" })), &Signature::none())
        .expect("resolve");
    assert_eq!(
        args.u64("count"),
        Err(ArgumentError::type_mismatch(
            "count",
            "non-negative integer",
            "string"
        ))
    );
    assert_eq!(args.u64("absent"), Err(ArgumentError::missing("absent")));
}

#[rstest]
fn wide_mappings_resolve_in_linear_time(registry: HandleRegistry) {
    let entries: Map<String, Value> = (0..90_000)
        .map(|index| (format!("key{index}"), Value::from(index)))
        .collect();
    let raw = bag(json!({ "content": Value::Object(entries) }));

    let started = Instant::now();
    let args = ArgumentResolver::new(&registry)
        .resolve(&raw, &Signature::none())
        .expect("resolve wide mapping");
    let elapsed = started.elapsed();

    let map = args
        .optional_mapping("content")
        .expect("mapping")
        .expect("present");
    assert_eq!(map.len(), 90_000);
    assert_eq!(map.iter().next().map(|(key, _)| key), Some("key0"));
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
}
