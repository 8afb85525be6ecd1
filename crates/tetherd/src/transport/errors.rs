//! Error types for the driver listener.

use std::io;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;

use tether_config::EndpointPreparationError;
use thiserror::Error;

/// Errors surfaced while binding or running the driver listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The socket directory could not be prepared.
    #[error(transparent)]
    Prepare(#[from] EndpointPreparationError),
    /// The TCP host name could not be resolved.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded but produced no address.
    #[error("{host}:{port} resolved to no addresses")]
    ResolveEmpty { host: String, port: u16 },
    /// Binding the TCP socket failed.
    #[error("failed to bind {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// The accept loop could not be switched to non-blocking mode.
    #[error("failed to make the listener non-blocking: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    /// Unix sockets were requested on a platform without them.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported on this platform ({endpoint})")]
    UnsupportedUnix { endpoint: String },
    /// Binding the Unix socket failed.
    #[cfg(unix)]
    #[error("failed to bind {}: {source}", .path.display())]
    BindUnix {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Another process is serving on the socket path.
    #[cfg(unix)]
    #[error("{} is served by another process", .path.display())]
    UnixInUse { path: PathBuf },
    /// Something other than a socket occupies the path.
    #[cfg(unix)]
    #[error("{} exists and is not a socket", .path.display())]
    UnixNotSocket { path: PathBuf },
    /// A leftover socket file could not be inspected or removed.
    #[cfg(unix)]
    #[error("failed to clear stale socket {}: {source}", .path.display())]
    UnixStale {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be started.
    #[error("failed to spawn the accept thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}
