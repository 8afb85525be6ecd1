//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use tether_config::Config;

use crate::bootstrap::BootstrapError;
use crate::supervisor::{LaunchSpec, ProcessInfo, StopReport, SupervisorError};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked before a supervised service is spawned.
    fn service_starting(&self, spec: &LaunchSpec);

    /// Invoked once a supervised service passes its readiness probe.
    fn service_ready(&self, info: &ProcessInfo);

    /// Invoked when a supervised service fails to start.
    fn service_failed(&self, error: &SupervisorError);

    /// Invoked after a supervised service has been stopped and reaped.
    fn service_stopped(&self, report: &StopReport);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn service_starting(&self, spec: &LaunchSpec) {
        (**self).service_starting(spec);
    }

    fn service_ready(&self, info: &ProcessInfo) {
        (**self).service_ready(info);
    }

    fn service_failed(&self, error: &SupervisorError) {
        (**self).service_failed(error);
    }

    fn service_stopped(&self, report: &StopReport) {
        (**self).service_stopped(report);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            listen = %config.listen(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn service_starting(&self, spec: &LaunchSpec) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_starting",
            service = spec.service(),
            program = %spec.program().to_string_lossy(),
            probe = %spec.readiness_probe(),
            "starting service"
        );
    }

    fn service_ready(&self, info: &ProcessInfo) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_ready",
            service = info.service(),
            pid = info.pid(),
            "service ready"
        );
    }

    fn service_failed(&self, error: &SupervisorError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "service_failed",
            service = error.service(),
            error = %error,
            "service failed to start"
        );
    }

    fn service_stopped(&self, report: &StopReport) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_stopped",
            service = report.service(),
            pid = report.pid(),
            forced = report.forced(),
            status = %report.status(),
            "service stopped"
        );
    }
}
