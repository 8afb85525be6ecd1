//! Argument bags, handler signatures and handle resolution.
//!
//! Requests carry a raw [`ArgumentBag`]: JSON values keyed by name in the
//! order the driver sent them. Before a handler runs, the
//! [`ArgumentResolver`] replaces every `@<n>` marker with the live object it
//! names and checks the bag against the handler's [`Signature`]. Handlers
//! therefore only ever see [`ResolvedArgs`], and a failed resolution never
//! reaches handler code.

mod resolved;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::handles::{Handle, HandleError, HandleRegistry, LiveObject, TypeTag};

pub use self::resolved::{Resolved, ResolvedArgs, ResolvedMap};

/// Raw named arguments exactly as received from the driver.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ArgumentBag(Map<String, Value>);

impl ArgumentBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bag with `name` set to `value`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets `name` to `value`, replacing any earlier value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Raw value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Entries in the order the driver supplied them.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the bag holds no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for ArgumentBag {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Shape a parameter's value must have once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Any value, including `null`.
    Any,
    /// `true` or `false`.
    Bool,
    /// Any JSON number.
    Number,
    /// A number with no fractional part.
    Integer,
    /// Plain text that is not a handle marker.
    String,
    /// An ordered sequence.
    Sequence,
    /// A keyed mapping.
    Mapping,
    /// A live object carrying the given tag.
    Object(TypeTag),
    /// A live object of any kind.
    AnyObject,
}

impl ParamKind {
    /// `true` when `value` has this shape.
    #[must_use]
    pub fn accepts(self, value: &Resolved) -> bool {
        match (self, value) {
            (Self::Any, _)
            | (Self::Bool, Resolved::Bool(_))
            | (Self::Number, Resolved::Number(_))
            | (Self::String, Resolved::String(_))
            | (Self::Sequence, Resolved::Sequence(_))
            | (Self::Mapping, Resolved::Mapping(_))
            | (Self::AnyObject, Resolved::Object(_)) => true,
            (Self::Integer, Resolved::Number(number)) => number.is_i64() || number.is_u64(),
            (Self::Object(tag), Resolved::Object(object)) => object.tag() == tag,
            _ => false,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => formatter.write_str("any value"),
            Self::Bool => formatter.write_str("boolean"),
            Self::Number => formatter.write_str("number"),
            Self::Integer => formatter.write_str("integer"),
            Self::String => formatter.write_str("string"),
            Self::Sequence => formatter.write_str("sequence"),
            Self::Mapping => formatter.write_str("mapping"),
            Self::Object(tag) => write!(formatter, "{tag}"),
            Self::AnyObject => formatter.write_str("object"),
        }
    }
}

/// One declared parameter of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    name: &'static str,
    kind: ParamKind,
    required: bool,
}

impl Param {
    /// A parameter the driver must supply.
    #[must_use]
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    /// A parameter the driver may omit or send as `null`.
    #[must_use]
    pub const fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }

    /// Parameter name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Expected shape.
    #[must_use]
    pub const fn kind(&self) -> ParamKind {
        self.kind
    }

    /// Whether the parameter must be present.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    fn check(&self, value: &Resolved) -> Result<(), ArgumentError> {
        if matches!(value, Resolved::Null) && !self.required {
            return Ok(());
        }
        if self.kind.accepts(value) {
            Ok(())
        } else {
            Err(ArgumentError::type_mismatch(
                self.name,
                self.kind.to_string(),
                value.kind_name(),
            ))
        }
    }
}

/// Parameters a handler declares.
///
/// Arguments the signature does not mention are still resolved and passed
/// through; only declared parameters are checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature(Vec<Param>);

impl Signature {
    /// Builds a signature from its parameters.
    #[must_use]
    pub fn new(params: impl IntoIterator<Item = Param>) -> Self {
        Self(params.into_iter().collect())
    }

    /// A signature with no declared parameters.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Declared parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.0
    }

    /// Looks up a declared parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.0.iter().find(|param| param.name == name)
    }
}

/// Failures raised while resolving or reading arguments.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArgumentError {
    /// A required argument was absent or `null`.
    #[error("missing required argument '{argument}'")]
    Missing {
        /// Argument name.
        argument: String,
    },
    /// An argument referenced a handle with no live object.
    #[error("argument '{argument}' refers to unknown handle {handle}")]
    UnknownHandle {
        /// Argument name.
        argument: String,
        /// Handle that could not be resolved.
        handle: Handle,
    },
    /// An argument resolved to the wrong kind of value.
    #[error("argument '{argument}' must be a {expected}, got {found}")]
    TypeMismatch {
        /// Argument name.
        argument: String,
        /// Expected shape.
        expected: String,
        /// Shape actually supplied.
        found: String,
    },
}

impl ArgumentError {
    /// Creates a missing argument error.
    pub fn missing(argument: impl Into<String>) -> Self {
        Self::Missing {
            argument: argument.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(
        argument: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            argument: argument.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Replaces handle markers with live objects and checks signatures.
///
/// Resolution only reads the registry; it never registers or releases.
#[derive(Debug, Clone, Copy)]
pub struct ArgumentResolver<'a> {
    registry: &'a HandleRegistry,
}

impl<'a> ArgumentResolver<'a> {
    /// Creates a resolver reading from `registry`.
    #[must_use]
    pub const fn new(registry: &'a HandleRegistry) -> Self {
        Self { registry }
    }

    /// Resolves `bag` against `signature`.
    ///
    /// Missing required arguments are reported before any handle is looked
    /// up. Markers nested inside sequences and mappings are resolved too.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentError::Missing`], [`ArgumentError::UnknownHandle`] or
    /// [`ArgumentError::TypeMismatch`] for the first offending argument.
    pub fn resolve(
        &self,
        bag: &ArgumentBag,
        signature: &Signature,
    ) -> Result<ResolvedArgs, ArgumentError> {
        if let Some(absent) = signature
            .params()
            .iter()
            .filter(|param| param.is_required())
            .find(|param| bag.get(param.name()).is_none_or(Value::is_null))
        {
            return Err(ArgumentError::missing(absent.name()));
        }

        let mut values = ResolvedMap::with_capacity(bag.len());
        for (name, raw) in bag.iter() {
            let resolved = self.resolve_value(name, raw)?;
            if let Some(param) = signature.param(name) {
                param.check(&resolved)?;
            }
            values.push(name.clone(), resolved);
        }
        Ok(ResolvedArgs::from(values))
    }

    fn resolve_value(&self, argument: &str, raw: &Value) -> Result<Resolved, ArgumentError> {
        Ok(match raw {
            Value::Null => Resolved::Null,
            Value::Bool(flag) => Resolved::Bool(*flag),
            Value::Number(number) => Resolved::Number(number.clone()),
            Value::String(text) => match Handle::from_marker(text) {
                Some(handle) => Resolved::Object(self.resolve_handle(argument, handle)?),
                None => Resolved::String(text.clone()),
            },
            Value::Array(items) => Resolved::Sequence(
                items
                    .iter()
                    .map(|item| self.resolve_value(argument, item))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(entries) => {
                let mut map = ResolvedMap::with_capacity(entries.len());
                for (key, value) in entries {
                    map.push(key.clone(), self.resolve_value(argument, value)?);
                }
                Resolved::Mapping(map)
            }
        })
    }

    fn resolve_handle(
        &self,
        argument: &str,
        handle: Handle,
    ) -> Result<LiveObject, ArgumentError> {
        self.registry.resolve(handle).map_err(|error| match error {
            HandleError::Unknown { handle } => ArgumentError::UnknownHandle {
                argument: argument.to_owned(),
                handle,
            },
            HandleError::TypeMismatch {
                expected, found, ..
            } => ArgumentError::type_mismatch(argument, expected.as_str(), found.as_str()),
            HandleError::Malformed { text } => {
                ArgumentError::type_mismatch(argument, "handle", text)
            }
        })
    }
}

#[cfg(test)]
mod tests;
