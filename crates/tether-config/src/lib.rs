//! Shared configuration for the Tether command dispatcher.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, then a
//! `tether.toml` file, then `TETHER_*` environment variables, then command
//! line flags. The daemon reads the listening endpoint, telemetry settings and
//! the parameters used to supervise the external services it can orchestrate.

mod defaults;
mod endpoint;
mod logging;
mod services;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CB_SERVER_BINARY, DEFAULT_CB_SERVER_PROBE_PORT, DEFAULT_LOG_FILTER,
    DEFAULT_STARTUP_TIMEOUT_MS, DEFAULT_STOP_GRACE_MS, DEFAULT_SYNC_GATEWAY_BINARY,
    DEFAULT_SYNC_GATEWAY_PROBE_PORT, DEFAULT_TCP_HOST, DEFAULT_TCP_PORT, default_listen_endpoint,
    default_log_filter, default_log_format,
};
pub use endpoint::{EndpointParseError, EndpointPreparationError, ListenEndpoint};
pub use logging::{LogFormat, LogFormatParseError};
pub use services::ServiceSettings;

/// Resolved configuration for the dispatcher daemon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TETHER")]
pub struct Config {
    /// Endpoint the daemon accepts driver connections on.
    #[serde(default = "defaults::default_listen_endpoint")]
    pub listen: ListenEndpoint,
    /// Tracing filter directive (for example `info` or `tetherd=debug`).
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Output format for structured logs.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
    /// Upper bound on how long a supervised service may take to become ready.
    #[serde(default = "defaults::default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    /// Time a supervised service is given to exit after `SIGTERM`.
    #[serde(default = "defaults::default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// Executable used to launch the sync gateway.
    #[serde(default = "defaults::default_sync_gateway_binary")]
    pub sync_gateway_binary: String,
    /// Port probed to decide when the sync gateway is ready.
    #[serde(default = "defaults::default_sync_gateway_probe_port")]
    pub sync_gateway_probe_port: u16,
    /// Executable used to launch the database server.
    #[serde(default = "defaults::default_cb_server_binary")]
    pub cb_server_binary: String,
    /// Port probed to decide when the database server is ready.
    #[serde(default = "defaults::default_cb_server_probe_port")]
    pub cb_server_probe_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen_endpoint(),
            log_filter: defaults::default_log_filter_string(),
            log_format: default_log_format(),
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
            sync_gateway_binary: DEFAULT_SYNC_GATEWAY_BINARY.to_owned(),
            sync_gateway_probe_port: DEFAULT_SYNC_GATEWAY_PROBE_PORT,
            cb_server_binary: DEFAULT_CB_SERVER_BINARY.to_owned(),
            cb_server_probe_port: DEFAULT_CB_SERVER_PROBE_PORT,
        }
    }
}

impl Config {
    /// Endpoint the daemon listens on.
    #[must_use]
    pub const fn listen(&self) -> &ListenEndpoint {
        &self.listen
    }

    /// Tracing filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Readiness budget for supervised services.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Grace period between `SIGTERM` and `SIGKILL` when stopping a service.
    #[must_use]
    pub const fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Launch settings for the sync gateway.
    #[must_use]
    pub fn sync_gateway(&self) -> ServiceSettings<'_> {
        ServiceSettings::new(&self.sync_gateway_binary, self.sync_gateway_probe_port)
    }

    /// Launch settings for the database server.
    #[must_use]
    pub fn cb_server(&self) -> ServiceSettings<'_> {
        ServiceSettings::new(&self.cb_server_binary, self.cb_server_probe_port)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn defaults_point_at_loopback_tcp() {
        let config = Config::default();
        assert_eq!(
            config.listen(),
            &ListenEndpoint::tcp(DEFAULT_TCP_HOST, DEFAULT_TCP_PORT)
        );
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Json);
    }

    #[rstest]
    fn durations_are_derived_from_milliseconds() {
        let config = Config {
            startup_timeout_ms: 1_500,
            stop_grace_ms: 250,
            ..Config::default()
        };
        assert_eq!(config.startup_timeout(), Duration::from_millis(1_500));
        assert_eq!(config.stop_grace(), Duration::from_millis(250));
    }

    #[rstest]
    fn service_settings_reflect_overrides() {
        let config = Config {
            sync_gateway_binary: "/opt/sg/bin/sync_gateway".to_owned(),
            sync_gateway_probe_port: 14_985,
            ..Config::default()
        };
        let settings = config.sync_gateway();
        assert_eq!(settings.binary(), "/opt/sg/bin/sync_gateway");
        assert_eq!(settings.probe_port(), 14_985);
        assert_eq!(config.cb_server().probe_port(), DEFAULT_CB_SERVER_PROBE_PORT);
    }
}
