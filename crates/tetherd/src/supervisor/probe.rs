//! Readiness probes used while a service starts.

use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use tracing::warn;

use super::SUPERVISOR_TARGET;

/// Upper bound on a single probe attempt.
const MAX_ATTEMPT: Duration = Duration::from_secs(1);
/// Lower bound so an exhausted budget still yields a valid socket timeout.
const MIN_ATTEMPT: Duration = Duration::from_millis(10);

/// Check deciding when a started process is serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessProbe {
    /// Ready as soon as the process has been spawned.
    Immediate,
    /// Ready once the given time has elapsed since spawning.
    Delay(Duration),
    /// Ready once a TCP connection to the address succeeds.
    TcpConnect(SocketAddr),
    /// Ready once `GET path` answers with a 2xx status.
    HttpGet {
        /// Address of the HTTP listener.
        addr: SocketAddr,
        /// Request path, for example `/`.
        path: String,
    },
}

impl ReadinessProbe {
    /// Performs one probe attempt.
    ///
    /// `elapsed` is the time since the process was spawned and `budget` the
    /// time left before the start times out; network attempts never wait
    /// longer than the budget allows.
    #[must_use]
    pub fn check(&self, elapsed: Duration, budget: Duration) -> bool {
        let attempt = budget.clamp(MIN_ATTEMPT, MAX_ATTEMPT);
        match self {
            Self::Immediate => true,
            Self::Delay(delay) => elapsed >= *delay,
            Self::TcpConnect(addr) => TcpStream::connect_timeout(addr, attempt).is_ok(),
            Self::HttpGet { addr, path } => http_ready(*addr, path, attempt),
        }
    }
}

impl fmt::Display for ReadinessProbe {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => formatter.write_str("immediate"),
            Self::Delay(delay) => write!(formatter, "delay {delay:?}"),
            Self::TcpConnect(addr) => write!(formatter, "tcp {addr}"),
            Self::HttpGet { addr, path } => write!(formatter, "http://{addr}{path}"),
        }
    }
}

/// Shared client; readiness checks target local listeners, so no proxy.
static HTTP_CLIENT: Lazy<Option<Client>> = Lazy::new(|| {
    Client::builder()
        .no_proxy()
        .build()
        .inspect_err(|error| warn!(target: SUPERVISOR_TARGET, %error, "HTTP client unavailable"))
        .ok()
});

fn http_ready(addr: SocketAddr, path: &str, attempt: Duration) -> bool {
    let Some(client) = HTTP_CLIENT.as_ref() else {
        return false;
    };
    client
        .get(format!("http://{addr}{path}"))
        .timeout(attempt)
        .send()
        .is_ok_and(|response| response.status().is_success())
}
