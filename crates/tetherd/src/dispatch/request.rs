//! Request deserialization for the dispatch loop.
//!
//! Each JSONL line names a method and carries its arguments as a JSON object:
//!
//! ```json
//! {"method":"dictionary_setValue","args":{"dictionary":"@3","key":"k","value":1}}
//! ```

use serde::Deserialize;

use crate::arguments::ArgumentBag;

use super::errors::DispatchError;

/// Parsed command request from a driver.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Method to invoke.
    method: String,
    /// Named arguments; absent means none.
    #[serde(default)]
    args: ArgumentBag,
}

impl CommandRequest {
    /// Parses a JSONL line into a command request.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed before
    /// parsing.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::MalformedRequest` if the line is empty or is not
    /// valid JSON, and `DispatchError::InvalidRequest` if the JSON does not
    /// have the request shape.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }

        let value: serde_json::Value =
            serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)?;
        // Serde would also accept the struct as a positional array.
        if !value.is_object() {
            return Err(DispatchError::invalid_request("request must be a JSON object"));
        }
        serde_json::from_value(value)
            .map_err(|error| DispatchError::invalid_request(error.to_string()))
    }

    /// Validates that the method name is present.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidRequest` if the method is empty or
    /// contains only whitespace.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.method.trim().is_empty() {
            return Err(DispatchError::invalid_request("method field is empty"));
        }
        Ok(())
    }

    /// Method name with surrounding whitespace removed.
    pub fn method(&self) -> &str {
        self.method.trim()
    }

    /// Raw arguments.
    pub const fn args(&self) -> &ArgumentBag {
        &self.args
    }
}

/// Trims trailing ASCII whitespace from a byte slice.
fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}
