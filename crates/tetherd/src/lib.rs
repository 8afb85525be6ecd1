//! Tether daemon: executes commands for remote test drivers.
//!
//! A driver connects over TCP or a Unix socket and sends one JSON request per
//! line. Each request names a method and carries named arguments; the daemon
//! resolves those arguments against a registry of live objects, runs the
//! method and writes exactly one JSON response line back. Objects a method
//! returns stay in the registry and reach the driver as opaque `@<id>`
//! handles, which later requests pass back as arguments.
//!
//! Methods come from feature modules assembled at bootstrap:
//!
//! - built-ins for releasing handles and flushing the registry,
//! - collections exposing dictionaries and arrays as handle objects,
//! - orchestration that starts and stops the external services a test run
//!   depends on, supervised until they pass a readiness probe.
//!
//! Health reporting hooks emit structured telemetry at each bootstrap and
//! supervision step so operators can diagnose failures quickly.

mod arguments;
mod bootstrap;
mod dispatch;
mod features;
mod handles;
mod health;
mod process;
mod supervisor;
mod telemetry;
mod transport;

pub use arguments::{
    ArgumentBag, ArgumentError, ArgumentResolver, Param, ParamKind, Resolved, ResolvedArgs,
    ResolvedMap, Signature,
};
pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, ShutdownSummary, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use dispatch::{
    CommandRequest, DaemonMessage, DispatchConnectionHandler, DispatchError, Dispatcher,
    DispatcherBuilder, ErrorCode, FLUSH_MEMORY, HandlerFn, MAX_REQUEST_BYTES, MethodEntry,
    MethodTable, Outcome, RELEASE, Reply, ResponseWriter, Router, RouterError,
};
pub use features::{
    Array, CB_SERVER, CollectionsFeature, Dictionary, FeatureModule, OrchestrationFeature,
    SYNC_GATEWAY,
};
pub use handles::{
    Handle, HandleError, HandleObject, HandleRegistry, LiveObject, NewObject, TypeTag,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon, run_daemon_with,
};
pub use supervisor::{
    LaunchSpec, ProcessInfo, ProcessSupervisor, ReadinessProbe, ServicePhase, StopReport,
    SupervisorError,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{
    ConnectionHandler, ConnectionStream, ListenerError, ListenerHandle, SocketListener,
};

#[cfg(test)]
mod tests;
