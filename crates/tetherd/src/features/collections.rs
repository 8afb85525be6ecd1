//! In-memory dictionaries and arrays addressed by handle.
//!
//! These stand in for the per-entity handlers of a client library and
//! exercise the whole handle lifecycle: objects are created by one request,
//! mutated and read through later ones, and released explicitly. Values are
//! kept as JSON; a live object stored inside a collection is kept as its
//! handle marker.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::arguments::{Param, ParamKind, ResolvedArgs, Signature};
use crate::dispatch::{DispatchError, MethodTable, Outcome};
use crate::handles::{HandleObject, TypeTag};

use super::FeatureModule;

/// Mutable string-keyed map.
#[derive(Debug, Default)]
pub struct Dictionary {
    entries: Mutex<Map<String, Value>>,
}

impl Dictionary {
    /// Creates a dictionary holding `entries`.
    #[must_use]
    pub fn new(entries: Map<String, Value>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Stores `value` under `key`.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.lock().insert(key.into(), value);
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` when the dictionary holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the contents.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HandleObject for Dictionary {
    const TYPE_TAG: TypeTag = TypeTag::new("dictionary");
}

/// Mutable ordered list.
#[derive(Debug, Default)]
pub struct Array {
    items: Mutex<Vec<Value>>,
}

impl Array {
    /// Creates an array holding `items`.
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }

    /// Appends `value`.
    pub fn push(&self, value: Value) {
        self.lock().push(value);
    }

    /// Value at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.lock().get(index).cloned()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` when the array holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Value>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HandleObject for Array {
    const TYPE_TAG: TypeTag = TypeTag::new("array");
}

const DICTIONARY: ParamKind = ParamKind::Object(Dictionary::TYPE_TAG);
const ARRAY: ParamKind = ParamKind::Object(Array::TYPE_TAG);

/// `dictionary_*` and `array_*` methods.
#[derive(Debug, Default, Clone, Copy)]
pub struct CollectionsFeature;

impl FeatureModule for CollectionsFeature {
    fn name(&self) -> &'static str {
        "collections"
    }

    fn methods(&self) -> MethodTable {
        MethodTable::new()
            .with(
                "dictionary_create",
                Signature::new([Param::optional("content", ParamKind::Mapping)]),
                dictionary_create,
            )
            .with(
                "dictionary_setValue",
                Signature::new([
                    Param::required("dictionary", DICTIONARY),
                    Param::required("key", ParamKind::String),
                    Param::optional("value", ParamKind::Any),
                ]),
                dictionary_set_value,
            )
            .with(
                "dictionary_getValue",
                Signature::new([
                    Param::required("dictionary", DICTIONARY),
                    Param::required("key", ParamKind::String),
                ]),
                dictionary_get_value,
            )
            .with(
                "dictionary_count",
                Signature::new([Param::required("dictionary", DICTIONARY)]),
                |args| Ok(Outcome::value(args.object::<Dictionary>("dictionary")?.len())),
            )
            .with(
                "dictionary_toMap",
                Signature::new([Param::required("dictionary", DICTIONARY)]),
                |args| Ok(Outcome::value(args.object::<Dictionary>("dictionary")?.to_map())),
            )
            .with(
                "array_create",
                Signature::new([Param::optional("content", ParamKind::Sequence)]),
                array_create,
            )
            .with(
                "array_addValue",
                Signature::new([
                    Param::required("array", ARRAY),
                    Param::optional("value", ParamKind::Any),
                ]),
                array_add_value,
            )
            .with(
                "array_getValue",
                Signature::new([
                    Param::required("array", ARRAY),
                    Param::required("index", ParamKind::Integer),
                ]),
                array_get_value,
            )
            .with(
                "array_count",
                Signature::new([Param::required("array", ARRAY)]),
                |args| Ok(Outcome::value(args.object::<Array>("array")?.len())),
            )
    }
}

fn dictionary_create(args: &ResolvedArgs) -> Result<Outcome, DispatchError> {
    let content = args
        .optional_mapping("content")?
        .map(|content| content.to_json())
        .unwrap_or_default();
    Ok(Outcome::object(Dictionary::new(content)))
}

fn dictionary_set_value(args: &ResolvedArgs) -> Result<Outcome, DispatchError> {
    let dictionary = args.object::<Dictionary>("dictionary")?;
    let value = args.get("value").map_or(Value::Null, |value| value.to_json());
    dictionary.set(args.str("key")?, value);
    Ok(Outcome::Void)
}

fn dictionary_get_value(args: &ResolvedArgs) -> Result<Outcome, DispatchError> {
    let dictionary = args.object::<Dictionary>("dictionary")?;
    let value = dictionary.get(args.str("key")?).unwrap_or(Value::Null);
    Ok(Outcome::Value(value))
}

fn array_create(args: &ResolvedArgs) -> Result<Outcome, DispatchError> {
    let items = args
        .optional_sequence("content")?
        .map(|items| items.iter().map(|item| item.to_json()).collect())
        .unwrap_or_default();
    Ok(Outcome::object(Array::new(items)))
}

fn array_add_value(args: &ResolvedArgs) -> Result<Outcome, DispatchError> {
    let array = args.object::<Array>("array")?;
    array.push(args.get("value").map_or(Value::Null, |value| value.to_json()));
    Ok(Outcome::Void)
}

fn array_get_value(args: &ResolvedArgs) -> Result<Outcome, DispatchError> {
    let array = args.object::<Array>("array")?;
    let index = args.u64("index")?;
    usize::try_from(index)
        .ok()
        .and_then(|index| array.get(index))
        .map(Outcome::Value)
        .ok_or_else(|| {
            DispatchError::handler_failure(format!(
                "index {index} is out of range for an array of {} items",
                array.len()
            ))
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::arguments::ArgumentBag;
    use crate::dispatch::{Dispatcher, Reply};
    use crate::handles::Handle;

    #[fixture]
    fn dispatcher() -> Dispatcher {
        Dispatcher::builder()
            .feature(CollectionsFeature)
            .build()
            .expect("build")
    }

    fn call(dispatcher: &Dispatcher, method: &str, args: Value) -> Result<Reply, DispatchError> {
        let Value::Object(map) = args else {
            panic!("arguments must be an object");
        };
        dispatcher.dispatch(method, &ArgumentBag::from(map))
    }

    fn handle_of(reply: Reply) -> Handle {
        match reply {
            Reply::Handle { handle, .. } => handle,
            other => panic!("expected a handle, got {other:?}"),
        }
    }

    fn value_of(reply: Reply) -> Value {
        match reply {
            Reply::Value(value) => value,
            other => panic!("expected a value, got {other:?}"),
        }
    }

    #[rstest]
    fn dictionaries_round_trip_values(dispatcher: Dispatcher) {
        let dictionary = handle_of(
            call(&dispatcher, "dictionary_create", json!({"content": {"a": 1}})).expect("create"),
        );
        let marker = dictionary.to_string();

        call(
            &dispatcher,
            "dictionary_setValue",
            json!({"dictionary": marker, "key": "b", "value": [true]}),
        )
        .expect("set");

        let count = call(&dispatcher, "dictionary_count", json!({"dictionary": marker}));
        assert_eq!(value_of(count.expect("count")), json!(2));
        let value = call(
            &dispatcher,
            "dictionary_getValue",
            json!({"dictionary": marker, "key": "b"}),
        );
        assert_eq!(value_of(value.expect("get")), json!([true]));
        let map = call(&dispatcher, "dictionary_toMap", json!({"dictionary": marker}));
        assert_eq!(value_of(map.expect("to map")), json!({"a": 1, "b": [true]}));
    }

    #[rstest]
    fn missing_keys_read_as_null(dispatcher: Dispatcher) {
        let dictionary = handle_of(call(&dispatcher, "dictionary_create", json!({})).expect("create"));
        let value = call(
            &dispatcher,
            "dictionary_getValue",
            json!({"dictionary": dictionary.to_string(), "key": "nope"}),
        );
        assert_eq!(value_of(value.expect("get")), Value::Null);
    }

    #[rstest]
    fn nested_objects_are_stored_as_markers(dispatcher: Dispatcher) {
        let inner = handle_of(call(&dispatcher, "array_create", json!({})).expect("array"));
        let outer = handle_of(
            call(
                &dispatcher,
                "dictionary_create",
                json!({"content": {"items": inner.to_string()}}),
            )
            .expect("dictionary"),
        );

        let stored = dispatcher
            .registry()
            .resolve_as::<Dictionary>(outer)
            .expect("dictionary");
        assert_eq!(stored.get("items"), Some(json!(inner.to_string())));
    }

    #[rstest]
    fn arrays_append_and_index(dispatcher: Dispatcher) {
        let array = handle_of(
            call(&dispatcher, "array_create", json!({"content": ["x"]})).expect("create"),
        );
        let marker = array.to_string();
        call(&dispatcher, "array_addValue", json!({"array": marker, "value": 7})).expect("add");

        let count = call(&dispatcher, "array_count", json!({"array": marker}));
        assert_eq!(value_of(count.expect("count")), json!(2));
        let second = call(&dispatcher, "array_getValue", json!({"array": marker, "index": 1}));
        assert_eq!(value_of(second.expect("get")), json!(7));
    }

    #[rstest]
    fn out_of_range_indices_are_handler_failures(dispatcher: Dispatcher) {
        let array = handle_of(call(&dispatcher, "array_create", json!({})).expect("create"));
        let error = call(
            &dispatcher,
            "array_getValue",
            json!({"array": array.to_string(), "index": 3}),
        )
        .expect_err("out of range");

        assert!(matches!(error, DispatchError::HandlerFailure { .. }));
        assert_eq!(
            error.to_string(),
            "index 3 is out of range for an array of 0 items"
        );
    }

    #[rstest]
    fn collections_reject_each_others_handles(dispatcher: Dispatcher) {
        let array = handle_of(call(&dispatcher, "array_create", json!({})).expect("create"));
        let error = call(
            &dispatcher,
            "dictionary_count",
            json!({"dictionary": array.to_string()}),
        )
        .expect_err("wrong kind");

        assert_eq!(error.code().as_str(), "type_mismatch");
    }

    #[rstest]
    fn fractional_indices_are_rejected(dispatcher: Dispatcher) {
        let array = handle_of(call(&dispatcher, "array_create", json!({})).expect("create"));
        let error = call(
            &dispatcher,
            "array_getValue",
            json!({"array": array.to_string(), "index": 0.5}),
        )
        .expect_err("not an integer");
        assert_eq!(error.code().as_str(), "type_mismatch");
    }

    #[rstest]
    fn concurrent_appends_are_all_kept() {
        let array = Arc::new(Array::default());
        let writers: Vec<_> = (0..8)
            .map(|writer| {
                let array = Arc::clone(&array);
                std::thread::spawn(move || {
                    for item in 0..50 {
                        array.push(json!([writer, item]));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().expect("writer thread");
        }
        assert_eq!(array.len(), 400);
    }
}
