//! Response serialization helpers for the dispatch loop.
//!
//! Every request produces exactly one [`DaemonMessage`] line: an `ok`
//! message carrying a value, a handle or nothing, or an `error` message with
//! a stable code.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use crate::handles::Handle;

use super::errors::{DispatchError, ErrorCode};
use super::outcome::Reply;

/// Response messages sent to drivers.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// The method completed.
    Ok {
        /// Type tag of the result (`void`, `string`, `map`, an object tag...).
        #[serde(rename = "type")]
        type_tag: &'static str,
        /// Value result, absent for handles and void results.
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
        /// Handle naming a registered object.
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<Handle>,
    },
    /// The request failed.
    Error {
        /// Stable error code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },
}

impl DaemonMessage {
    /// Creates the success message for a reply.
    pub fn reply(reply: &Reply) -> Self {
        let type_tag = reply.type_tag();
        match reply {
            Reply::Void => Self::Ok {
                type_tag,
                value: None,
                handle: None,
            },
            Reply::Value(value) => Self::Ok {
                type_tag,
                value: Some(value.clone()),
                handle: None,
            },
            Reply::Handle { handle, .. } => Self::Ok {
                type_tag,
                value: None,
                handle: Some(*handle),
            },
        }
    }

    /// Creates the failure message for an error.
    pub fn error(error: &DispatchError) -> Self {
        Self::Error {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

/// Writer that serializes daemon messages to a stream.
///
/// The writer handles JSONL framing and flushes after every message so the
/// driver sees each reply as soon as it is produced.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a daemon message as a JSONL line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_message(&mut self, message: &DaemonMessage) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes the success message for a reply.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_reply(&mut self, reply: &Reply) -> Result<(), DispatchError> {
        self.write_message(&DaemonMessage::reply(reply))
    }

    /// Writes the failure message for an error.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_error(&mut self, error: &DispatchError) -> Result<(), DispatchError> {
        self.write_message(&DaemonMessage::error(error))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::handles::TypeTag;

    fn written(write: impl FnOnce(&mut ResponseWriter<&mut Vec<u8>>)) -> Value {
        let mut output = Vec::new();
        let mut writer = ResponseWriter::new(&mut output);
        write(&mut writer);
        let text = String::from_utf8(output).expect("valid utf8");
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);
        serde_json::from_str(&text).expect("valid json")
    }

    #[test]
    fn writes_void_replies() {
        let message = written(|writer| writer.write_reply(&Reply::Void).expect("write"));
        assert_eq!(message, json!({"kind": "ok", "type": "void"}));
    }

    #[test]
    fn writes_null_values_explicitly() {
        let message = written(|writer| {
            writer
                .write_reply(&Reply::Value(Value::Null))
                .expect("write");
        });
        assert_eq!(message, json!({"kind": "ok", "type": "null", "value": null}));
    }

    #[test]
    fn writes_handles() {
        let handle = Handle::from_marker("@7").expect("marker");
        let reply = Reply::Handle {
            handle,
            tag: TypeTag::new("database"),
        };
        let message = written(|writer| writer.write_reply(&reply).expect("write"));
        assert_eq!(
            message,
            json!({"kind": "ok", "type": "database", "handle": "@7"})
        );
    }

    #[test]
    fn writes_errors_with_codes() {
        let error = DispatchError::method_not_found("bogus");
        let message = written(|writer| writer.write_error(&error).expect("write"));
        assert_eq!(message["kind"], "error");
        assert_eq!(message["code"], "method_not_found");
        assert_eq!(message["message"], "method not found: bogus");
    }
}
