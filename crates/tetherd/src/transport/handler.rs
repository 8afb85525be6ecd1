//! Connection abstractions shared by the listener and its handlers.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// A connected driver stream.
pub enum ConnectionStream {
    /// TCP connection.
    Tcp(TcpStream),
    /// Unix domain socket connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Opens a second handle onto the same socket.
    ///
    /// Handlers use the clone as a buffered read half while responses are
    /// written through the original.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the descriptor cannot be duplicated.
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }

    /// Peer description used in logs.
    #[must_use]
    pub fn peer(&self) -> String {
        match self {
            Self::Tcp(stream) => stream
                .peer_addr()
                .map_or_else(|_| String::from("tcp:unknown"), |addr| addr.to_string()),
            #[cfg(unix)]
            Self::Unix(_) => String::from("unix"),
        }
    }
}

impl fmt::Debug for ConnectionStream {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("ConnectionStream")
            .field(&self.peer())
            .finish()
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Serves accepted connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Serves one connection until the peer disconnects. Must not panic.
    fn handle(&self, stream: ConnectionStream);
}
