//! Resolved argument values handed to handlers.

use std::sync::Arc;

use serde_json::{Map, Number, Value};

use super::ArgumentError;
use crate::handles::{HandleObject, LiveObject};

/// An argument value after handle markers have been replaced.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// JSON `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(Number),
    /// Plain text.
    String(String),
    /// A live object named by a handle marker.
    Object(LiveObject),
    /// An ordered sequence of resolved values.
    Sequence(Vec<Resolved>),
    /// A keyed mapping of resolved values.
    Mapping(ResolvedMap),
}

impl Resolved {
    /// Short description of the value's shape, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(object) => object.tag().as_str(),
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
        }
    }

    /// Converts back to JSON, rendering live objects as their handle markers.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Number(number) => Value::Number(number.clone()),
            Self::String(text) => Value::String(text.clone()),
            Self::Object(object) => Value::String(object.handle().to_string()),
            Self::Sequence(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Mapping(map) => Value::Object(map.to_json()),
        }
    }
}

/// Ordered mapping of names to resolved values.
#[derive(Debug, Clone, Default)]
pub struct ResolvedMap(Vec<(String, Resolved)>);

impl ResolvedMap {
    pub(super) fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Appends an entry. Keys come from a JSON object and are already unique.
    pub(super) fn push(&mut self, key: String, value: Resolved) {
        self.0.push((key, value));
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Resolved> {
        self.0
            .iter()
            .find_map(|(name, value)| (name == key).then_some(value))
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Resolved)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the mapping is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts to a JSON object, rendering live objects as handle markers.
    #[must_use]
    pub fn to_json(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}

/// Named, resolved arguments passed to a handler.
///
/// Accessors treat `null` as absent. The typed accessors re-check shapes so
/// handlers can read undeclared arguments safely.
#[derive(Debug, Clone, Default)]
pub struct ResolvedArgs {
    values: ResolvedMap,
}

impl From<ResolvedMap> for ResolvedArgs {
    fn from(values: ResolvedMap) -> Self {
        Self { values }
    }
}

impl ResolvedArgs {
    /// The value under `name`, or `None` when absent or `null`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Resolved> {
        self.values
            .get(name)
            .filter(|value| !matches!(value, Resolved::Null))
    }

    /// The raw resolved value under `name`, `null` included.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&Resolved> {
        self.values.get(name)
    }

    /// All arguments in the order they were supplied.
    #[must_use]
    pub const fn values(&self) -> &ResolvedMap {
        &self.values
    }

    /// The value under `name`, failing when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentError::Missing`] when the argument is absent or `null`.
    pub fn require(&self, name: &str) -> Result<&Resolved, ArgumentError> {
        self.get(name).ok_or_else(|| ArgumentError::missing(name))
    }

    /// A required text argument.
    ///
    /// # Errors
    ///
    /// Fails when the argument is absent or not text.
    pub fn str(&self, name: &str) -> Result<&str, ArgumentError> {
        self.optional_str(name)?
            .ok_or_else(|| ArgumentError::missing(name))
    }

    /// An optional text argument.
    ///
    /// # Errors
    ///
    /// Fails when the argument is present but not text.
    pub fn optional_str(&self, name: &str) -> Result<Option<&str>, ArgumentError> {
        self.typed(name, "string", |value| match value {
            Resolved::String(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// A required non-negative integer argument.
    ///
    /// # Errors
    ///
    /// Fails when the argument is absent or not a non-negative integer.
    pub fn u64(&self, name: &str) -> Result<u64, ArgumentError> {
        self.optional_u64(name)?
            .ok_or_else(|| ArgumentError::missing(name))
    }

    /// An optional non-negative integer argument.
    ///
    /// # Errors
    ///
    /// Fails when the argument is present but not a non-negative integer.
    pub fn optional_u64(&self, name: &str) -> Result<Option<u64>, ArgumentError> {
        self.typed(name, "non-negative integer", |value| match value {
            Resolved::Number(number) => number.as_u64(),
            _ => None,
        })
    }

    /// An optional mapping argument.
    ///
    /// # Errors
    ///
    /// Fails when the argument is present but not a mapping.
    pub fn optional_mapping(&self, name: &str) -> Result<Option<&ResolvedMap>, ArgumentError> {
        self.typed(name, "mapping", |value| match value {
            Resolved::Mapping(map) => Some(map),
            _ => None,
        })
    }

    /// An optional sequence argument.
    ///
    /// # Errors
    ///
    /// Fails when the argument is present but not a sequence.
    pub fn optional_sequence(&self, name: &str) -> Result<Option<&[Resolved]>, ArgumentError> {
        self.typed(name, "sequence", |value| match value {
            Resolved::Sequence(items) => Some(items.as_slice()),
            _ => None,
        })
    }

    /// A required live object of any kind.
    ///
    /// # Errors
    ///
    /// Fails when the argument is absent or not a live object.
    pub fn live_object(&self, name: &str) -> Result<&LiveObject, ArgumentError> {
        self.typed(name, "object", |value| match value {
            Resolved::Object(object) => Some(object),
            _ => None,
        })?
        .ok_or_else(|| ArgumentError::missing(name))
    }

    /// A required live object of type `T`.
    ///
    /// # Errors
    ///
    /// Fails when the argument is absent or names an object of another kind.
    pub fn object<T: HandleObject>(&self, name: &str) -> Result<Arc<T>, ArgumentError> {
        let object = self.live_object(name)?;
        object.downcast::<T>().map_err(|_| {
            ArgumentError::type_mismatch(name, T::TYPE_TAG.as_str(), object.tag().as_str())
        })
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: &str,
        extract: impl FnOnce(&'a Resolved) -> Option<T>,
    ) -> Result<Option<T>, ArgumentError> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        let found = value.kind_name();
        extract(value)
            .map(Some)
            .ok_or_else(|| ArgumentError::type_mismatch(name, expected, found))
    }
}
