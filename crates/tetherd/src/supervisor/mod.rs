//! Supervision of external services started on behalf of drivers.
//!
//! The [`ProcessSupervisor`] tracks at most one child process per logical
//! service name. Starting a service spawns the executable, polls its
//! [`ReadinessProbe`] until it succeeds or the timeout elapses, and kills the
//! child again when it never becomes ready. Stopping sends `SIGTERM`, waits a
//! grace period and escalates to `SIGKILL`. Each service runs in its own
//! process group and signals go to the whole group, so anything the service
//! command spawned is terminated with it.
//!
//! Each service has its own slot: one operation lock serialising start and
//! stop for that name, plus a phase cell readable without waiting on a slow
//! start. The map of slots is locked only long enough to find or create a
//! slot, so different services never block each other.

mod errors;
mod probe;

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::health::HealthReporter;

pub use self::errors::SupervisorError;
pub use self::probe::ReadinessProbe;

/// Tracing target for supervisor operations.
pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Interval between readiness and exit polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Readiness budget applied when a launch does not set one.
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle phase of a supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServicePhase {
    /// Never started.
    Absent,
    /// Spawned and waiting for the readiness probe.
    Starting,
    /// Running and ready.
    Ready,
    /// Being terminated.
    Stopping,
    /// Exited, stopped or failed to start.
    Stopped,
}

impl ServicePhase {
    /// Lower-case name of the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServicePhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Everything needed to start one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    service: String,
    program: OsString,
    args: Vec<OsString>,
    probe: ReadinessProbe,
    timeout: Duration,
}

impl LaunchSpec {
    /// Launches `program` as `service`, ready immediately, with the default
    /// readiness budget.
    pub fn new(service: impl Into<String>, program: impl Into<OsString>) -> Self {
        Self {
            service: service.into(),
            program: program.into(),
            args: Vec::new(),
            probe: ReadinessProbe::Immediate,
            timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the readiness probe.
    #[must_use]
    pub fn probe(mut self, probe: ReadinessProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Sets the readiness budget.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Logical service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Executable to run.
    #[must_use]
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Arguments passed to the executable.
    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Readiness probe.
    #[must_use]
    pub const fn readiness_probe(&self) -> &ReadinessProbe {
        &self.probe
    }

    /// Readiness budget.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        self.timeout
    }
}

/// Description of a service that became ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    service: String,
    pid: u32,
    probe: ReadinessProbe,
    started_at: SystemTime,
}

impl ProcessInfo {
    /// Logical service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Process identifier of the child.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Probe that declared the service ready.
    #[must_use]
    pub const fn probe(&self) -> &ReadinessProbe {
        &self.probe
    }

    /// Wall-clock time the child was spawned.
    #[must_use]
    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }
}

/// Outcome of stopping a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    service: String,
    pid: u32,
    forced: bool,
    status: ExitStatus,
}

impl StopReport {
    /// Logical service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Process identifier of the stopped child.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// `true` when the grace period expired and `SIGKILL` was sent.
    #[must_use]
    pub const fn forced(&self) -> bool {
        self.forced
    }

    /// Exit status collected when the child was reaped.
    #[must_use]
    pub const fn status(&self) -> ExitStatus {
        self.status
    }
}

struct ManagedProcess {
    info: ProcessInfo,
    child: Child,
}

struct ServiceSlot {
    process: Mutex<Option<ManagedProcess>>,
    phase: RwLock<ServicePhase>,
}

impl ServiceSlot {
    fn new() -> Self {
        Self {
            process: Mutex::new(None),
            phase: RwLock::new(ServicePhase::Absent),
        }
    }

    fn lock_process(&self) -> MutexGuard<'_, Option<ManagedProcess>> {
        self.process.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phase(&self) -> ServicePhase {
        *self.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: ServicePhase) {
        *self.phase.write().unwrap_or_else(PoisonError::into_inner) = phase;
    }
}

/// Starts, tracks and stops external services by logical name.
pub struct ProcessSupervisor {
    services: Mutex<HashMap<String, Arc<ServiceSlot>>>,
    closed: AtomicBool,
    grace: Duration,
    poll_interval: Duration,
    reporter: Arc<dyn HealthReporter>,
}

impl ProcessSupervisor {
    /// Creates a supervisor that waits `grace` between `SIGTERM` and
    /// `SIGKILL`.
    #[must_use]
    pub fn new(grace: Duration, reporter: Arc<dyn HealthReporter>) -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            grace,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reporter,
        }
    }

    /// Overrides the interval between readiness and exit polls.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Starts the service described by `spec` and waits until it is ready.
    ///
    /// A tracked process that has already exited is reaped and its slot
    /// reused. On any failure nothing is left running or tracked.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::AlreadyRunning`] when a live process is
    /// tracked for the service, [`SupervisorError::SpawnFailed`] when the
    /// executable cannot be launched, [`SupervisorError::ExitedDuringStartup`]
    /// when the child exits before the probe succeeds, and
    /// [`SupervisorError::StartupTimeout`] when the probe never succeeds.
    /// Once [`ProcessSupervisor::shutdown_all`] has begun every start fails
    /// with [`SupervisorError::ShuttingDown`].
    pub fn start(&self, spec: &LaunchSpec) -> Result<ProcessInfo, SupervisorError> {
        let service = spec.service();
        let slot = self.slot(service);
        let mut tracked = slot.lock_process();
        // Checked under the slot lock: `shutdown_all` closes before listing
        // slots, so a start that passes here is stopped by it.
        if self.closed.load(Ordering::SeqCst) {
            return Err(SupervisorError::ShuttingDown {
                service: service.to_owned(),
            });
        }

        if let Some(process) = tracked.as_mut() {
            match process.child.try_wait() {
                Ok(None) => {
                    return Err(SupervisorError::AlreadyRunning {
                        service: service.to_owned(),
                        pid: process.info.pid,
                    });
                }
                Ok(Some(status)) => {
                    debug!(
                        target: SUPERVISOR_TARGET,
                        service,
                        pid = process.info.pid,
                        %status,
                        "reaped exited service before restart"
                    );
                    *tracked = None;
                }
                Err(source) => return Err(SupervisorError::wait(service, source)),
            }
        }

        slot.set_phase(ServicePhase::Starting);
        self.reporter.service_starting(spec);
        match self.launch(spec) {
            Ok(process) => {
                let info = process.info.clone();
                *tracked = Some(process);
                slot.set_phase(ServicePhase::Ready);
                self.reporter.service_ready(&info);
                Ok(info)
            }
            Err(error) => {
                slot.set_phase(ServicePhase::Stopped);
                self.reporter.service_failed(&error);
                Err(error)
            }
        }
    }

    /// Stops the tracked process for `service`.
    ///
    /// The tracked entry is dropped only once the child has been reaped, so a
    /// concurrent start for the same name waits until the old process is
    /// gone.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotRunning`] when nothing is tracked, or a
    /// signalling or reaping failure; in the latter case the process stays
    /// tracked.
    pub fn stop(&self, service: &str) -> Result<StopReport, SupervisorError> {
        let slot = self
            .existing_slot(service)
            .ok_or_else(|| SupervisorError::not_running(service))?;
        let mut tracked = slot.lock_process();
        let Some(mut process) = tracked.take() else {
            return Err(SupervisorError::not_running(service));
        };

        let previous = slot.phase();
        slot.set_phase(ServicePhase::Stopping);
        match self.terminate(&mut process) {
            Ok(report) => {
                slot.set_phase(ServicePhase::Stopped);
                self.reporter.service_stopped(&report);
                Ok(report)
            }
            Err(error) => {
                *tracked = Some(process);
                slot.set_phase(previous);
                Err(error)
            }
        }
    }

    /// Current lifecycle phase of `service`.
    ///
    /// A ready service whose process has exited on its own is reported as
    /// stopped.
    #[must_use]
    pub fn status(&self, service: &str) -> ServicePhase {
        let Some(slot) = self.existing_slot(service) else {
            return ServicePhase::Absent;
        };
        let phase = slot.phase();
        if phase != ServicePhase::Ready {
            return phase;
        }
        // A start or stop in progress holds the lock; its phase is current.
        let Ok(mut tracked) = slot.process.try_lock() else {
            return phase;
        };
        match tracked.as_mut().map(|process| process.child.try_wait()) {
            Some(Ok(Some(_))) => ServicePhase::Stopped,
            _ => phase,
        }
    }

    /// Process identifier of the tracked child for `service`, if any.
    #[must_use]
    pub fn pid(&self, service: &str) -> Option<u32> {
        let slot = self.existing_slot(service)?;
        let tracked = slot.lock_process();
        tracked.as_ref().map(|process| process.info.pid)
    }

    /// Names of services that are starting, ready or stopping, sorted.
    #[must_use]
    pub fn active_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock_services()
            .iter()
            .filter(|(_, slot)| {
                matches!(
                    slot.phase(),
                    ServicePhase::Starting | ServicePhase::Ready | ServicePhase::Stopping
                )
            })
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Refuses further starts, then stops every tracked service and returns
    /// the reports of those stopped.
    ///
    /// Failures are logged and do not prevent the remaining services from
    /// being stopped.
    pub fn shutdown_all(&self) -> Vec<StopReport> {
        self.closed.store(true, Ordering::SeqCst);
        let services: Vec<String> = self.lock_services().keys().cloned().collect();
        services
            .iter()
            .filter_map(|service| match self.stop(service) {
                Ok(report) => Some(report),
                Err(SupervisorError::NotRunning { .. }) => None,
                Err(error) => {
                    warn!(
                        target: SUPERVISOR_TARGET,
                        service = service.as_str(),
                        %error,
                        "failed to stop service during shutdown"
                    );
                    None
                }
            })
            .collect()
    }

    fn launch(&self, spec: &LaunchSpec) -> Result<ManagedProcess, SupervisorError> {
        let service = spec.service();
        let mut child = Command::new(spec.program())
            .args(spec.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|source| SupervisorError::SpawnFailed {
                service: service.to_owned(),
                program: spec.program().to_string_lossy().into_owned(),
                source,
            })?;
        let started_at = SystemTime::now();
        let pid = child.id();
        debug!(
            target: SUPERVISOR_TARGET,
            service,
            pid,
            probe = %spec.readiness_probe(),
            timeout_ms = u64::try_from(spec.startup_timeout().as_millis()).unwrap_or(u64::MAX),
            "spawned service, waiting for readiness"
        );

        if let Err(error) = self.await_ready(spec, &mut child) {
            discard(service, &mut child);
            return Err(error);
        }

        info!(target: SUPERVISOR_TARGET, service, pid, "service ready");
        Ok(ManagedProcess {
            info: ProcessInfo {
                service: service.to_owned(),
                pid,
                probe: spec.readiness_probe().clone(),
                started_at,
            },
            child,
        })
    }

    fn await_ready(&self, spec: &LaunchSpec, child: &mut Child) -> Result<(), SupervisorError> {
        let service = spec.service();
        let started = Instant::now();
        let deadline = started + spec.startup_timeout();
        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|source| SupervisorError::wait(service, source))?
            {
                return Err(SupervisorError::ExitedDuringStartup {
                    service: service.to_owned(),
                    status,
                });
            }

            let now = Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            if spec.readiness_probe().check(now - started, remaining) {
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    target: SUPERVISOR_TARGET,
                    service,
                    pid = child.id(),
                    "service never became ready, killing it"
                );
                return Err(SupervisorError::StartupTimeout {
                    service: service.to_owned(),
                    timeout: spec.startup_timeout(),
                });
            }
            thread::sleep(self.poll_interval.min(remaining));
        }
    }

    fn terminate(&self, process: &mut ManagedProcess) -> Result<StopReport, SupervisorError> {
        let service = process.info.service.as_str();
        let pid = process.info.pid;
        let report = |forced, status| StopReport {
            service: service.to_owned(),
            pid,
            forced,
            status,
        };

        if let Some(status) = poll_exit(service, &mut process.child)? {
            debug!(target: SUPERVISOR_TARGET, service, pid, %status, "service had already exited");
            signal_group(service, pid, Signal::SIGKILL)?;
            return Ok(report(false, status));
        }

        signal_group(service, pid, Signal::SIGTERM)?;
        let deadline = Instant::now() + self.grace;
        loop {
            if let Some(status) = poll_exit(service, &mut process.child)? {
                info!(target: SUPERVISOR_TARGET, service, pid, %status, "service stopped");
                // Descendants that outlived the leader.
                signal_group(service, pid, Signal::SIGKILL)?;
                return Ok(report(false, status));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(self.poll_interval.min(remaining));
        }

        warn!(
            target: SUPERVISOR_TARGET,
            service,
            pid,
            grace_ms = u64::try_from(self.grace.as_millis()).unwrap_or(u64::MAX),
            "service ignored SIGTERM, sending SIGKILL"
        );
        signal_group(service, pid, Signal::SIGKILL)?;
        let status = process
            .child
            .wait()
            .map_err(|source| SupervisorError::wait(service, source))?;
        Ok(report(true, status))
    }

    fn slot(&self, service: &str) -> Arc<ServiceSlot> {
        let mut services = self.lock_services();
        Arc::clone(
            services
                .entry(service.to_owned())
                .or_insert_with(|| Arc::new(ServiceSlot::new())),
        )
    }

    fn existing_slot(&self, service: &str) -> Option<Arc<ServiceSlot>> {
        self.lock_services().get(service).map(Arc::clone)
    }

    fn lock_services(&self) -> MutexGuard<'_, HashMap<String, Arc<ServiceSlot>>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ProcessSupervisor")
            .field("grace", &self.grace)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

fn poll_exit(service: &str, child: &mut Child) -> Result<Option<ExitStatus>, SupervisorError> {
    child
        .try_wait()
        .map_err(|source| SupervisorError::wait(service, source))
}

/// Signals the process group led by `pid`.
fn signal_group(service: &str, pid: u32, signal: Signal) -> Result<(), SupervisorError> {
    let failure = |source: io::Error| SupervisorError::Signal {
        service: service.to_owned(),
        pid,
        signal: signal.as_str(),
        source,
    };
    let raw = i32::try_from(pid).map_err(|_| failure(io::Error::other("pid out of range")))?;
    match killpg(Pid::from_raw(raw), signal) {
        // The whole group is gone already; reaping follows.
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(errno) => Err(failure(io::Error::from(errno))),
    }
}

/// Kills the process group of a child that failed to start and reaps it.
fn discard(service: &str, child: &mut Child) {
    if let Err(error) = signal_group(service, child.id(), Signal::SIGKILL) {
        debug!(target: SUPERVISOR_TARGET, service, %error, "kill after failed start");
    }
    if let Err(error) = child.wait() {
        warn!(target: SUPERVISOR_TARGET, service, %error, "failed to reap child after failed start");
    }
}
