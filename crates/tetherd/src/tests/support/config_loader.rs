//! Test configuration loaders for scenarios covering success and failure paths.
//!
use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;
use tether_config::{Config, ListenEndpoint};

use crate::bootstrap::ConfigLoader;

/// Loader yielding defaults with a test-controlled listening endpoint.
#[derive(Clone)]
pub struct TestConfigLoader {
    listen: ListenEndpoint,
    socket_dir: Option<Arc<TempDir>>,
}

impl TestConfigLoader {
    /// Listens on an ephemeral loopback TCP port.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listen: ListenEndpoint::tcp("127.0.0.1", 0),
            socket_dir: None,
        }
    }

    /// Listens on a Unix socket inside a fresh temporary directory.
    #[must_use]
    pub fn unix() -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory for socket");
        let path = dir.path().join("run").join("tetherd.sock");
        let path = path
            .to_str()
            .expect("temporary socket path was not valid UTF-8")
            .to_owned();
        Self {
            listen: ListenEndpoint::unix(path),
            socket_dir: Some(Arc::new(dir)),
        }
    }

    /// Endpoint handed to the daemon.
    #[must_use]
    pub fn listen(&self) -> &ListenEndpoint {
        &self.listen
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            listen: self.listen.clone(),
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an invalid endpoint flag.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("tetherd"),
            OsString::from("--listen"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}
