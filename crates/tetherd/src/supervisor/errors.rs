//! Errors raised while supervising external services.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Failures reported by [`ProcessSupervisor`](super::ProcessSupervisor).
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A live process is already tracked for the service.
    #[error("service '{service}' is already running (pid {pid})")]
    AlreadyRunning {
        /// Logical service name.
        service: String,
        /// Process identifier of the running instance.
        pid: u32,
    },

    /// No process is tracked for the service.
    #[error("service '{service}' is not running")]
    NotRunning {
        /// Logical service name.
        service: String,
    },

    /// The supervisor is shutting down and refuses new services.
    #[error("cannot start service '{service}': the supervisor is shutting down")]
    ShuttingDown {
        /// Logical service name.
        service: String,
    },

    /// The readiness probe never succeeded; the child has been killed.
    #[error("service '{service}' did not become ready within {timeout:?}")]
    StartupTimeout {
        /// Logical service name.
        service: String,
        /// Readiness budget that was exceeded.
        timeout: Duration,
    },

    /// The executable could not be spawned.
    #[error("failed to spawn '{program}' for service '{service}': {source}")]
    SpawnFailed {
        /// Logical service name.
        service: String,
        /// Program that was launched.
        program: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The child exited before the readiness probe succeeded.
    #[error("service '{service}' exited during startup ({status})")]
    ExitedDuringStartup {
        /// Logical service name.
        service: String,
        /// Exit status of the child.
        status: ExitStatus,
    },

    /// A signal could not be delivered.
    #[error("failed to send {signal} to service '{service}' (pid {pid}): {source}")]
    Signal {
        /// Logical service name.
        service: String,
        /// Process identifier.
        pid: u32,
        /// Signal name.
        signal: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Polling or reaping the child failed.
    #[error("failed to reap service '{service}': {source}")]
    Wait {
        /// Logical service name.
        service: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl SupervisorError {
    /// Logical service the error refers to.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::AlreadyRunning { service, .. }
            | Self::NotRunning { service }
            | Self::ShuttingDown { service }
            | Self::StartupTimeout { service, .. }
            | Self::SpawnFailed { service, .. }
            | Self::ExitedDuringStartup { service, .. }
            | Self::Signal { service, .. }
            | Self::Wait { service, .. } => service,
        }
    }

    pub(crate) fn not_running(service: &str) -> Self {
        Self::NotRunning {
            service: service.to_owned(),
        }
    }

    pub(crate) fn wait(service: &str, source: io::Error) -> Self {
        Self::Wait {
            service: service.to_owned(),
            source,
        }
    }
}
