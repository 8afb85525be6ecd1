//! Listening endpoint declarations.
//!
//! Test drivers usually reach the dispatcher over TCP from another machine or
//! container, so TCP is the default. A Unix domain socket can be configured
//! for drivers that run on the same host.

use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Declarative listening endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ListenEndpoint {
    /// TCP endpoint.
    Tcp {
        /// Host name or address to bind.
        host: String,
        /// Port to bind; `0` asks the OS for an ephemeral port.
        port: u16,
    },
    /// Unix domain socket endpoint.
    Unix {
        /// Filesystem path of the socket.
        path: Utf8PathBuf,
    },
}

impl ListenEndpoint {
    /// Builds a TCP endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Socket path when the endpoint uses the Unix transport.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }

    /// Creates the parent directory of a Unix socket with owner-only access.
    ///
    /// TCP endpoints need no preparation.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointPreparationError`] when the path has no parent or the
    /// directory cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), EndpointPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .ok_or_else(|| EndpointPreparationError::MissingParent {
                path: path.to_path_buf(),
            })?;

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        builder
            .create(parent.as_std_path())
            .map_err(|source| EndpointPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })
    }
}

impl fmt::Display for ListenEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
            Self::Unix { path } => write!(formatter, "unix://{path}"),
        }
    }
}

impl FromStr for ListenEndpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| EndpointParseError::MissingHost(input.to_owned()))?;
                let port = url
                    .port()
                    .ok_or_else(|| EndpointParseError::MissingPort(input.to_owned()))?;
                Ok(Self::tcp(host, port))
            }
            "unix" => match url.path() {
                "" => Err(EndpointParseError::MissingUnixPath(input.to_owned())),
                path => Ok(Self::unix(path)),
            },
            other => Err(EndpointParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Errors encountered while parsing a [`ListenEndpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Scheme was neither `tcp` nor `unix`.
    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// Text was not a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised when preparing the directory of a Unix socket.
#[derive(Debug, Error)]
pub enum EndpointPreparationError {
    /// Socket path has no parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Configured socket path.
        path: Utf8PathBuf,
    },
    /// The parent directory could not be created.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
