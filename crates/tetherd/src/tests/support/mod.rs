//! Test harness utilities shared by the daemon unit and behavioural suites.

mod config_loader;
mod driver;
mod reporter;
mod shutdown;
mod world;

pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use driver::TestDriver;
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use shutdown::ManualShutdownSignal;
pub use world::{TestWorld, world};
