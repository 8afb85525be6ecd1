//! Runs the daemon in the foreground until a shutdown signal arrives.

use std::sync::Arc;

use tracing::info;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Runs the daemon using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, listening or signal handling fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        &SystemShutdownSignal,
    )
}

/// Runs the daemon with injected collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, listening or signal handling fails.
/// Once the daemon has bootstrapped, its services and handles are released
/// before any later error is returned.
pub fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    let mut daemon = bootstrap_with(loader, reporter)?;
    if let Err(error) = daemon.start_listener() {
        daemon.shutdown()?;
        return Err(error.into());
    }
    info!(
        target: PROCESS_TARGET,
        listen = %daemon.config().listen(),
        local_addr = ?daemon.local_addr(),
        "daemon listening"
    );

    let waited = shutdown.wait();
    let summary = daemon.shutdown()?;
    info!(
        target: PROCESS_TARGET,
        stopped_services = ?summary.stopped_services,
        released_handles = summary.released_handles,
        "daemon stopped"
    );
    waited.map_err(LaunchError::from)
}
