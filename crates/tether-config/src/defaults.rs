//! Default values shared by the configuration layers.

use crate::endpoint::ListenEndpoint;
use crate::logging::LogFormat;

/// Loopback host the daemon binds when no endpoint is configured.
pub const DEFAULT_TCP_HOST: &str = "127.0.0.1";

/// Port the test drivers expect the dispatcher on.
pub const DEFAULT_TCP_PORT: u16 = 8080;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Readiness budget for supervised services, in milliseconds.
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 60_000;

/// Grace period between `SIGTERM` and `SIGKILL`, in milliseconds.
pub const DEFAULT_STOP_GRACE_MS: u64 = 5_000;

/// Sync gateway executable resolved through `PATH`.
pub const DEFAULT_SYNC_GATEWAY_BINARY: &str = "sync_gateway";

/// Sync gateway admin port.
pub const DEFAULT_SYNC_GATEWAY_PROBE_PORT: u16 = 4985;

/// Database server executable resolved through `PATH`.
pub const DEFAULT_CB_SERVER_BINARY: &str = "couchbase-server";

/// Database server administration console port.
pub const DEFAULT_CB_SERVER_PROBE_PORT: u16 = 8091;

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

pub(crate) fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Endpoint used when none is configured.
#[must_use]
pub fn default_listen_endpoint() -> ListenEndpoint {
    ListenEndpoint::tcp(DEFAULT_TCP_HOST, DEFAULT_TCP_PORT)
}

pub(crate) const fn default_startup_timeout_ms() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_MS
}

pub(crate) const fn default_stop_grace_ms() -> u64 {
    DEFAULT_STOP_GRACE_MS
}

pub(crate) fn default_sync_gateway_binary() -> String {
    DEFAULT_SYNC_GATEWAY_BINARY.to_owned()
}

pub(crate) const fn default_sync_gateway_probe_port() -> u16 {
    DEFAULT_SYNC_GATEWAY_PROBE_PORT
}

pub(crate) fn default_cb_server_binary() -> String {
    DEFAULT_CB_SERVER_BINARY.to_owned()
}

pub(crate) const fn default_cb_server_probe_port() -> u16 {
    DEFAULT_CB_SERVER_PROBE_PORT
}
