//! Handler results and the replies they turn into.

use serde_json::Value;

use crate::handles::{Handle, HandleObject, NewObject, TypeTag};

/// What a handler produced.
#[derive(Debug)]
pub enum Outcome {
    /// Nothing to return.
    Void,
    /// A value that can be sent as JSON.
    Value(Value),
    /// An object to keep alive in the registry; the driver receives a handle.
    Object(NewObject),
}

impl Outcome {
    /// A JSON value result.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// An object result.
    pub fn object<T: HandleObject>(object: T) -> Self {
        Self::Object(NewObject::new(object))
    }
}

/// Result sent back to the driver once objects have been registered.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// No result.
    Void,
    /// A JSON value.
    Value(Value),
    /// A freshly registered object.
    Handle {
        /// Handle naming the object.
        handle: Handle,
        /// Tag of the object.
        tag: TypeTag,
    },
}

impl Reply {
    /// Tag reported alongside the reply.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Value(value) => value_tag(value),
            Self::Handle { tag, .. } => tag.as_str(),
        }
    }
}

fn value_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}
