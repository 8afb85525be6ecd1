//! Test double for [`HealthReporter`] that records structured events for assertions.
//!
//! The recorder captures bootstrap and service supervision telemetry so unit
//! and behaviour tests can check what the daemon reported.

use std::sync::Mutex;

use tether_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::supervisor::{LaunchSpec, ProcessInfo, StopReport, SupervisorError};

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// A service is being spawned.
    ServiceStarting(String),
    /// A service passed its readiness probe.
    ServiceReady(String),
    /// A service failed to start.
    ServiceFailed { service: String, message: String },
    /// A service was stopped.
    ServiceStopped { service: String, forced: bool },
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn service_starting(&self, spec: &LaunchSpec) {
        self.record(HealthEvent::ServiceStarting(spec.service().to_owned()));
    }

    fn service_ready(&self, info: &ProcessInfo) {
        self.record(HealthEvent::ServiceReady(info.service().to_owned()));
    }

    fn service_failed(&self, error: &SupervisorError) {
        self.record(HealthEvent::ServiceFailed {
            service: error.service().to_owned(),
            message: error.to_string(),
        });
    }

    fn service_stopped(&self, report: &StopReport) {
        self.record(HealthEvent::ServiceStopped {
            service: report.service().to_owned(),
            forced: report.forced(),
        });
    }
}
