//! Structured logging for the daemon.
//!
//! Logs go to stderr through a `tracing-subscriber` fmt layer. The format and
//! filter come from configuration; the subscriber is installed at most once
//! per process.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tether_config::{Config, LogFormat};
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

static TELEMETRY: OnceCell<LogFormat> = OnceCell::new();

/// Proof that the global subscriber is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format chosen by the call that installed the subscriber.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter directive did not parse.
    #[error("invalid log filter '{directive}': {message}")]
    Filter { directive: String, message: String },
    /// Another subscriber was installed outside this module.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[source] SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls return a handle for the subscriber already installed and
/// ignore their configuration.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid or a foreign
/// subscriber is already installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY
        .get_or_try_init(|| install_subscriber(config).map(|()| config.log_format()))
        .map(|format| TelemetryHandle { format: *format })
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_new(config.log_filter()).map_err(|error| TelemetryError::Filter {
            directive: config.log_filter().to_owned(),
            message: error.to_string(),
        })?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
