//! BDD test world: loader, reporter, daemon and driver state shared by steps.
//!
use std::cell::RefCell;
use std::sync::Arc;

use serde_json::Value;

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, ShutdownSummary, bootstrap_with};

use super::config_loader::{FailingConfigLoader, TestConfigLoader};
use super::driver::TestDriver;
use super::reporter::RecordingHealthReporter;

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    daemon: Option<Daemon>,
    bootstrap_error: Option<BootstrapError>,
    driver: Option<TestDriver>,
    responses: Vec<Value>,
    last_handle: Option<String>,
    summary: Option<ShutdownSummary>,
}

impl TestWorld {
    /// Builds a world with a successful configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader::new()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            daemon: None,
            bootstrap_error: None,
            driver: None,
            responses: Vec::new(),
            last_handle: None,
            summary: None,
        }
    }

    /// Installs a loader that always fails.
    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
        self.reset_results();
    }

    /// Installs a loader that succeeds.
    pub fn use_successful_loader(&mut self) {
        self.loader = Box::new(TestConfigLoader::new());
        self.reset_results();
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.daemon.is_some() || self.bootstrap_error.is_some() {
            return;
        }
        match bootstrap_with(&*self.loader, self.reporter.clone()) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Bootstraps if needed, starts the listener and connects a driver.
    pub fn serve(&mut self) -> Result<(), String> {
        self.bootstrap();
        let daemon = self
            .daemon
            .as_mut()
            .ok_or_else(|| format!("bootstrap failed: {:?}", self.bootstrap_error))?;
        daemon.start_listener().map_err(|error| error.to_string())?;
        let addr = daemon
            .local_addr()
            .ok_or_else(|| String::from("daemon is not listening on TCP"))?;
        self.driver = Some(TestDriver::connect(addr));
        Ok(())
    }

    /// Sends a request through the connected driver and records the reply.
    pub fn send(&mut self, request: &Value) -> Result<(), String> {
        let driver = self
            .driver
            .as_mut()
            .ok_or_else(|| String::from("no driver connected"))?;
        let response = driver.send(request);
        if let Some(handle) = response.get("handle").and_then(Value::as_str) {
            self.last_handle = Some(handle.to_owned());
        }
        self.responses.push(response);
        Ok(())
    }

    /// Shuts the daemon down and keeps the summary.
    pub fn shutdown(&mut self) -> Result<(), String> {
        let daemon = self
            .daemon
            .take()
            .ok_or_else(|| String::from("daemon not running"))?;
        self.driver = None;
        let summary = daemon.shutdown().map_err(|error| error.to_string())?;
        self.summary = Some(summary);
        Ok(())
    }

    /// Returns whether bootstrap produced an error.
    #[must_use]
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// Returns the running daemon, if bootstrap succeeded.
    #[must_use]
    pub fn daemon(&self) -> Option<&Daemon> {
        self.daemon.as_ref()
    }

    /// Most recent response received by the driver.
    #[must_use]
    pub fn last_response(&self) -> Option<&Value> {
        self.responses.last()
    }

    /// Handle carried by the most recent response that returned one.
    #[must_use]
    pub fn last_handle(&self) -> Option<&str> {
        self.last_handle.as_deref()
    }

    /// Sends raw bytes through the connected driver and records the reply.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), String> {
        let driver = self
            .driver
            .as_mut()
            .ok_or_else(|| String::from("no driver connected"))?;
        self.responses.push(driver.send_raw(bytes));
        Ok(())
    }

    /// Summary of the last shutdown.
    #[must_use]
    pub fn summary(&self) -> Option<&ShutdownSummary> {
        self.summary.as_ref()
    }

    fn reset_results(&mut self) {
        self.daemon = None;
        self.bootstrap_error = None;
        self.driver = None;
        self.responses.clear();
        self.last_handle = None;
        self.summary = None;
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
