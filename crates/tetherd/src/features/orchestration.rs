//! Methods that start and stop the external services a test run needs.
//!
//! Each service is launched from the configured binary and considered ready
//! once its probe port on the loopback interface accepts connections. The
//! [`ProcessSupervisor`] enforces one live instance per service name.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tether_config::{Config, ServiceSettings};

use crate::arguments::{Param, ParamKind, ResolvedArgs, Signature};
use crate::dispatch::{DispatchError, MethodTable, Outcome};
use crate::supervisor::{LaunchSpec, ProcessInfo, ProcessSupervisor, ReadinessProbe};

use super::FeatureModule;

/// Service name used for the sync gateway.
pub const SYNC_GATEWAY: &str = "sync_gateway";

/// Service name used for the database server.
pub const CB_SERVER: &str = "cb_server";

/// Launch parameters captured from configuration.
#[derive(Debug, Clone)]
struct ServiceLaunch {
    service: &'static str,
    binary: String,
    probe_port: u16,
}

impl ServiceLaunch {
    fn new(service: &'static str, settings: ServiceSettings<'_>) -> Self {
        Self {
            service,
            binary: settings.binary().to_owned(),
            probe_port: settings.probe_port(),
        }
    }

    fn spec(&self, timeout: Duration) -> LaunchSpec {
        let probe_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.probe_port));
        LaunchSpec::new(self.service, &self.binary)
            .probe(ReadinessProbe::TcpConnect(probe_addr))
            .timeout(timeout)
    }
}

/// `start_*`, `kill_*`/`stop_*` and `service_status` methods.
#[derive(Debug, Clone)]
pub struct OrchestrationFeature {
    supervisor: Arc<ProcessSupervisor>,
    sync_gateway: ServiceLaunch,
    cb_server: ServiceLaunch,
    startup_timeout: Duration,
}

impl OrchestrationFeature {
    /// Creates the feature from the daemon configuration.
    #[must_use]
    pub fn new(supervisor: Arc<ProcessSupervisor>, config: &Config) -> Self {
        Self {
            supervisor,
            sync_gateway: ServiceLaunch::new(SYNC_GATEWAY, config.sync_gateway()),
            cb_server: ServiceLaunch::new(CB_SERVER, config.cb_server()),
            startup_timeout: config.startup_timeout(),
        }
    }

    fn timeout(&self, args: &ResolvedArgs) -> Result<Duration, DispatchError> {
        Ok(args
            .optional_u64("timeout_ms")?
            .map_or(self.startup_timeout, Duration::from_millis))
    }

    fn start_sync_gateway(&self, args: &ResolvedArgs) -> Result<Outcome, DispatchError> {
        let mut spec = self.sync_gateway.spec(self.timeout(args)?);
        if let Some(config) = args.optional_str("config")? {
            spec = spec.arg(config);
        }
        let info = self.supervisor.start(&spec)?;
        Ok(started(&info))
    }

    fn start_cb_server(&self, args: &ResolvedArgs) -> Result<Outcome, DispatchError> {
        let spec = self.cb_server.spec(self.timeout(args)?);
        let info = self.supervisor.start(&spec)?;
        Ok(started(&info))
    }

    fn stop(&self, service: &str) -> Result<Outcome, DispatchError> {
        self.supervisor.stop(service)?;
        Ok(Outcome::Void)
    }

    fn status(&self, args: &ResolvedArgs) -> Result<Outcome, DispatchError> {
        let phase = self.supervisor.status(args.str("name")?);
        Ok(Outcome::value(phase.as_str()))
    }
}

fn started(info: &ProcessInfo) -> Outcome {
    Outcome::Value(json!({
        "service": info.service(),
        "pid": info.pid(),
    }))
}

impl FeatureModule for OrchestrationFeature {
    fn name(&self) -> &'static str {
        "orchestration"
    }

    fn methods(&self) -> MethodTable {
        let timeout = Param::optional("timeout_ms", ParamKind::Integer);
        let start_sg = self.clone();
        let kill_sg = self.clone();
        let start_cb = self.clone();
        let stop_cb = self.clone();
        let status = self.clone();

        MethodTable::new()
            .with(
                "start_sync_gateway",
                Signature::new([Param::optional("config", ParamKind::String), timeout]),
                move |args| start_sg.start_sync_gateway(args),
            )
            .with("kill_sync_gateway", Signature::none(), move |_| {
                kill_sg.stop(SYNC_GATEWAY)
            })
            .with(
                "start_cb_server",
                Signature::new([timeout]),
                move |args| start_cb.start_cb_server(args),
            )
            .with("stop_cb_server", Signature::none(), move |_| {
                stop_cb.stop(CB_SERVER)
            })
            .with(
                "service_status",
                Signature::new([Param::required("name", ParamKind::String)]),
                move |args| status.status(args),
            )
    }
}
