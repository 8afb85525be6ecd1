//! Accept loop for the driver endpoint.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use tether_config::ListenEndpoint;
use tracing::{debug, info, warn};

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to the configured endpoint, not yet accepting.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: ListenEndpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl SocketListener {
    /// Binds `endpoint`, creating the socket directory and clearing a stale
    /// Unix socket file first.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the endpoint cannot be bound.
    pub fn bind(endpoint: &ListenEndpoint) -> Result<Self, ListenerError> {
        endpoint.prepare_filesystem()?;
        let listener = match endpoint {
            ListenEndpoint::Tcp { host, port } => ListenerKind::Tcp(bind_tcp(host, *port)?),
            #[cfg(unix)]
            ListenEndpoint::Unix { path } => ListenerKind::Unix(bind_unix(path.as_std_path())?),
            #[cfg(not(unix))]
            ListenEndpoint::Unix { .. } => {
                return Err(ListenerError::UnsupportedUnix {
                    endpoint: endpoint.to_string(),
                });
            }
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    /// Bound TCP address; `None` for Unix sockets.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerKind::Unix(_) => None,
        }
    }

    /// Starts the accept loop on a background thread.
    ///
    /// Every accepted connection is served by `handler` on its own thread.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::NonBlocking`] when the socket cannot be polled.
    pub fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        let nonblocking = match &self.listener {
            ListenerKind::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            ListenerKind::Unix(listener) => listener.set_nonblocking(true),
        };
        if let Err(source) = nonblocking {
            #[cfg(unix)]
            remove_socket_file(&self.endpoint);
            return Err(ListenerError::NonBlocking { source });
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let thread = thread::Builder::new()
            .name(String::from("tetherd-accept"))
            .spawn(move || run_accept_loop(&self, &flag, &handler))
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            shutdown,
            thread: Some(thread),
        })
    }
}

/// Handle to the background accept thread.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept loop to stop. Connections already accepted keep
    /// running until their peers disconnect.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if the loop panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        self.thread
            .take()
            .map_or(Ok(()), |thread| {
                thread.join().map_err(|_| ListenerError::ThreadPanic)
            })
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &AtomicBool,
    handler: &Arc<dyn ConnectionHandler>,
) {
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.endpoint,
        "accepting driver connections"
    );
    let connections = AtomicU64::new(0);
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(listener) {
            Ok(Some(stream)) => {
                last_error = None;
                let connection = connections.fetch_add(1, Ordering::Relaxed) + 1;
                spawn_worker(connection, stream, Arc::clone(handler));
            }
            Ok(None) => thread::sleep(ACCEPT_BACKOFF),
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(target: LISTENER_TARGET, %error, "accept failed");
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    info!(target: LISTENER_TARGET, endpoint = %listener.endpoint, "listener stopped");
    #[cfg(unix)]
    remove_socket_file(&listener.endpoint);
}

fn spawn_worker(connection: u64, stream: ConnectionStream, handler: Arc<dyn ConnectionHandler>) {
    let peer = stream.peer();
    debug!(target: LISTENER_TARGET, connection, peer, "connection accepted");
    let spawned = thread::Builder::new()
        .name(format!("tetherd-conn-{connection}"))
        .spawn(move || {
            handler.handle(stream);
            debug!(target: LISTENER_TARGET, connection, "connection closed");
        });
    if let Err(error) = spawned {
        warn!(target: LISTENER_TARGET, connection, %error, "failed to spawn connection worker");
    }
}

fn accept_connection(listener: &SocketListener) -> io::Result<Option<ConnectionStream>> {
    let accepted = match &listener.listener {
        ListenerKind::Tcp(tcp) => tcp.accept().and_then(|(stream, _)| {
            stream.set_nonblocking(false)?;
            Ok(ConnectionStream::Tcp(stream))
        }),
        #[cfg(unix)]
        ListenerKind::Unix(unix) => unix.accept().and_then(|(stream, _)| {
            stream.set_nonblocking(false)?;
            Ok(ConnectionStream::Unix(stream))
        }),
    };
    match accepted {
        Ok(stream) => Ok(Some(stream)),
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?
        .next()
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    clear_stale_socket(path)?;
    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: path.to_path_buf(),
        source,
    })
}

/// Removes a socket file left behind by a daemon that is no longer serving.
#[cfg(unix)]
fn clear_stale_socket(path: &Path) -> Result<(), ListenerError> {
    let stale = |source: io::Error| ListenerError::UnixStale {
        path: path.to_path_buf(),
        source,
    };
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(stale(error)),
    };
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::UnixNotSocket {
            path: path.to_path_buf(),
        });
    }
    match UnixStream::connect(path) {
        Ok(_) => Err(ListenerError::UnixInUse {
            path: path.to_path_buf(),
        }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            fs::remove_file(path).map_err(stale)
        }
        Err(error) => Err(stale(error)),
    }
}

#[cfg(unix)]
fn remove_socket_file(endpoint: &ListenEndpoint) {
    let Some(path) = endpoint.unix_path() else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}
