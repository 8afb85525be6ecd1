//! Process entry point: bootstrap, serve until signalled, then tear down.

mod errors;
mod launch;
mod shutdown;

pub use self::errors::LaunchError;
pub use self::launch::{run_daemon, run_daemon_with};
pub use self::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
