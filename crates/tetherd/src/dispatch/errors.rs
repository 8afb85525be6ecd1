//! Error types for request dispatch failures.
//!
//! Every failure a driver can observe maps to a stable snake_case
//! [`ErrorCode`]. Resolution and routing errors are raised before a handler
//! runs; handler and supervisor failures are carried through unchanged.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::arguments::ArgumentError;
use crate::handles::HandleError;
use crate::supervisor::SupervisorError;

/// Stable codes reported in error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request line was not valid JSON.
    MalformedRequest,
    /// Request JSON did not have the expected shape.
    InvalidRequest,
    /// Request line exceeded the size limit.
    RequestTooLarge,
    /// No handler is registered under the method name.
    MethodNotFound,
    /// A required argument was absent.
    MissingArgument,
    /// An argument named a handle with no live object.
    UnknownHandle,
    /// An argument had the wrong kind.
    TypeMismatch,
    /// The service is already running.
    AlreadyRunning,
    /// The service is not running.
    NotRunning,
    /// The daemon is shutting down and refuses new services.
    ShuttingDown,
    /// The service did not become ready in time.
    StartupTimeout,
    /// The service could not be spawned.
    SpawnFailed,
    /// The service exited before becoming ready.
    ExitedDuringStartup,
    /// Signalling or reaping a service failed.
    ProcessControl,
    /// A handler reported a failure.
    HandlerFailure,
    /// Transport IO failed.
    Io,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorCode {
    /// Wire representation of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedRequest => "malformed_request",
            Self::InvalidRequest => "invalid_request",
            Self::RequestTooLarge => "request_too_large",
            Self::MethodNotFound => "method_not_found",
            Self::MissingArgument => "missing_argument",
            Self::UnknownHandle => "unknown_handle",
            Self::TypeMismatch => "type_mismatch",
            Self::AlreadyRunning => "already_running",
            Self::NotRunning => "not_running",
            Self::ShuttingDown => "shutting_down",
            Self::StartupTimeout => "startup_timeout",
            Self::SpawnFailed => "spawn_failed",
            Self::ExitedDuringStartup => "exited_during_startup",
            Self::ProcessControl => "process_control",
            Self::HandlerFailure => "handler_failure",
            Self::Io => "io",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Errors surfaced during request parsing and dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed as JSON.
    #[error("malformed request: {message}")]
    MalformedRequest {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Request JSON does not match the `CommandRequest` schema.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge { size: usize, max_size: usize },

    /// No handler is registered under the requested name.
    #[error("method not found: {method}")]
    MethodNotFound { method: String },

    /// Arguments could not be resolved against the handler signature.
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    /// A handle lookup performed by a handler failed.
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// A supervised process operation failed.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// A handler failed; the message is the handler's own.
    #[error("{message}")]
    HandlerFailure {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// IO error during read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialization failed.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// Stable code reported to drivers.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedRequest { .. } => ErrorCode::MalformedRequest,
            Self::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            Self::RequestTooLarge { .. } => ErrorCode::RequestTooLarge,
            Self::MethodNotFound { .. } => ErrorCode::MethodNotFound,
            Self::Argument(error) => match error {
                ArgumentError::Missing { .. } => ErrorCode::MissingArgument,
                ArgumentError::UnknownHandle { .. } => ErrorCode::UnknownHandle,
                ArgumentError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            },
            Self::Handle(error) => match error {
                HandleError::Unknown { .. } => ErrorCode::UnknownHandle,
                HandleError::TypeMismatch { .. } | HandleError::Malformed { .. } => {
                    ErrorCode::TypeMismatch
                }
            },
            Self::Supervisor(error) => match error {
                SupervisorError::AlreadyRunning { .. } => ErrorCode::AlreadyRunning,
                SupervisorError::NotRunning { .. } => ErrorCode::NotRunning,
                SupervisorError::ShuttingDown { .. } => ErrorCode::ShuttingDown,
                SupervisorError::StartupTimeout { .. } => ErrorCode::StartupTimeout,
                SupervisorError::SpawnFailed { .. } => ErrorCode::SpawnFailed,
                SupervisorError::ExitedDuringStartup { .. } => ErrorCode::ExitedDuringStartup,
                SupervisorError::Signal { .. } | SupervisorError::Wait { .. } => {
                    ErrorCode::ProcessControl
                }
            },
            Self::HandlerFailure { .. } => ErrorCode::HandlerFailure,
            Self::Io(_) => ErrorCode::Io,
            Self::SerializeResponse(_) | Self::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Creates a malformed request error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedRequest {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed request error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a request too large error.
    pub fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Creates a method not found error.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Creates a handler failure carrying the handler's own message.
    pub fn handler_failure(message: impl Into<String>) -> Self {
        Self::HandlerFailure {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an error raised inside a handler, keeping it as the source.
    pub fn handler_error(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::HandlerFailure {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::handles::{Handle, TypeTag};

    fn unknown_handle() -> Handle {
        Handle::from_marker("@4").unwrap_or_else(|| panic!("valid marker"))
    }

    #[rstest]
    #[case::method(DispatchError::method_not_found("nope"), "method_not_found")]
    #[case::missing(ArgumentError::missing("db").into(), "missing_argument")]
    #[case::unknown(
        ArgumentError::UnknownHandle { argument: "db".into(), handle: unknown_handle() }.into(),
        "unknown_handle"
    )]
    #[case::mismatch(ArgumentError::type_mismatch("db", "database", "string").into(), "type_mismatch")]
    #[case::released(
        HandleError::Unknown { handle: unknown_handle() }.into(),
        "unknown_handle"
    )]
    #[case::wrong_tag(
        HandleError::TypeMismatch {
            handle: unknown_handle(),
            expected: TypeTag::new("a"),
            found: TypeTag::new("b"),
        }.into(),
        "type_mismatch"
    )]
    #[case::not_running(
        SupervisorError::NotRunning { service: "sg".into() }.into(),
        "not_running"
    )]
    #[case::timeout(
        SupervisorError::StartupTimeout {
            service: "sg".into(),
            timeout: std::time::Duration::from_secs(1),
        }.into(),
        "startup_timeout"
    )]
    #[case::closing(
        SupervisorError::ShuttingDown { service: "sg".into() }.into(),
        "shutting_down"
    )]
    #[case::handler(DispatchError::handler_failure("boom"), "handler_failure")]
    #[case::too_large(DispatchError::request_too_large(10, 5), "request_too_large")]
    #[case::malformed(DispatchError::malformed("bad"), "malformed_request")]
    #[case::internal(DispatchError::internal("poisoned"), "internal")]
    fn errors_map_to_stable_codes(#[case] error: DispatchError, #[case] code: &str) {
        assert_eq!(error.code().as_str(), code);
    }

    #[rstest]
    fn handler_failures_keep_the_original_message() {
        let source = io::Error::other("disk on fire");
        let error = DispatchError::handler_error(source);
        assert_eq!(error.to_string(), "disk on fire");
        assert!(error.source().is_some());
    }

    #[rstest]
    fn codes_serialise_in_snake_case() {
        let json = serde_json::to_string(&ErrorCode::ExitedDuringStartup).expect("serialise");
        assert_eq!(json, "\"exited_during_startup\"");
    }
}
