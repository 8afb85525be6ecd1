//! Daemon bootstrap orchestration.
//!
//! Bootstrap loads configuration, installs telemetry, creates the process
//! supervisor and assembles the dispatcher with every feature module. The
//! resulting [`Daemon`] then binds the listener and, on shutdown, stops the
//! listener, every supervised service and every live handle.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tether_config::Config;
use thiserror::Error;
use tracing::info;

use crate::dispatch::{DispatchConnectionHandler, Dispatcher, RouterError};
use crate::features::{CollectionsFeature, OrchestrationFeature};
use crate::health::HealthReporter;
use crate::supervisor::ProcessSupervisor;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{ListenerError, ListenerHandle, SocketListener};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader error when configuration is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that reads defaults, `tether.toml`, the environment and the
/// command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration fixed in advance.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The method table could not be assembled.
    #[error("failed to assemble the method table: {source}")]
    Dispatcher {
        /// Underlying router error.
        #[source]
        source: RouterError,
    },
}

/// What a shutdown released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Services that were still running and have been stopped.
    pub stopped_services: Vec<String>,
    /// Handles that were still live and have been released.
    pub released_handles: usize,
}

/// A bootstrapped daemon.
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    supervisor: Arc<ProcessSupervisor>,
    dispatcher: Arc<Dispatcher>,
    listener: Option<ListenerHandle>,
    local_addr: Option<SocketAddr>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Dispatcher serving driver requests.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Supervisor owning the orchestrated services.
    #[must_use]
    pub const fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    /// Bound TCP address once listening; `None` for Unix sockets.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// `true` once the listener is accepting connections.
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Binds the configured endpoint and starts accepting drivers.
    ///
    /// Calling this again while listening does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the endpoint cannot be bound.
    pub fn start_listener(&mut self) -> Result<(), ListenerError> {
        if self.listener.is_some() {
            return Ok(());
        }
        let listener = SocketListener::bind(self.config.listen())?;
        let local_addr = listener.local_addr();
        let handler = Arc::new(DispatchConnectionHandler::new(Arc::clone(&self.dispatcher)));
        self.listener = Some(listener.start(handler)?);
        self.local_addr = local_addr;
        Ok(())
    }

    /// Stops accepting drivers, stops every supervised service and releases
    /// every live handle.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if the accept loop panicked;
    /// services and handles are released regardless.
    pub fn shutdown(mut self) -> Result<ShutdownSummary, ListenerError> {
        let listener = self.listener.take().map_or(Ok(()), |handle| {
            handle.shutdown();
            handle.join()
        });
        let stopped_services = self
            .supervisor
            .shutdown_all()
            .iter()
            .map(|report| report.service().to_owned())
            .collect();
        let released_handles = self.dispatcher.release_all();
        let summary = ShutdownSummary {
            stopped_services,
            released_handles,
        };
        info!(
            target: BOOTSTRAP_TARGET,
            services = summary.stopped_services.len(),
            handles = summary.released_handles,
            "daemon resources released"
        );
        listener.map(|()| summary)
    }
}

impl fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("listen", &self.config.listen().to_string())
            .field("local_addr", &self.local_addr)
            .field("methods", &self.dispatcher.router().method_names().len())
            .finish_non_exhaustive()
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration, telemetry or the method
/// table cannot be set up. The reporter is told about the failure first.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    match assemble(loader, &reporter) {
        Ok(daemon) => {
            reporter.bootstrap_succeeded(&daemon.config);
            Ok(daemon)
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn assemble(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    let supervisor = Arc::new(ProcessSupervisor::new(
        config.stop_grace(),
        Arc::clone(reporter),
    ));
    let dispatcher = Dispatcher::builder()
        .feature(CollectionsFeature)
        .feature(OrchestrationFeature::new(Arc::clone(&supervisor), &config))
        .build()
        .map_err(|source| BootstrapError::Dispatcher { source })?;

    Ok(Daemon {
        config,
        telemetry,
        supervisor,
        dispatcher: Arc::new(dispatcher),
        listener: None,
        local_addr: None,
    })
}
