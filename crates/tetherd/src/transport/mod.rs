//! Socket transport for driver connections.
//!
//! The listener binds the configured endpoint, accepts connections on a
//! background thread and hands each one to a [`ConnectionHandler`] running on
//! its own worker thread.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub use self::handler::{ConnectionHandler, ConnectionStream};
pub use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::{CountingHandler, EchoHandler};

pub(crate) const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
