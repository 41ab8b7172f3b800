use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Fatal failures while bringing the proxy up. These are the only errors that
/// reach the caller of `dockerproxy::start`.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("wildcard vsock port is rejected; pass a port or allow an ephemeral one")]
    InvalidPort,
    #[error("failed to bind vsock port {port}: {source}")]
    Bind {
        port: u32,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum AcceptError {
    #[error("listener is closed")]
    Closed,
    #[error("transient accept failure: {0}")]
    Transient(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum DialError {
    /// Socket missing or refusing connections, usually because the daemon is
    /// still starting.
    #[error("docker socket {path} is unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot dial docker socket {path}: {source}")]
    Fatal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DialError {
    pub fn new(path: PathBuf, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut => {
                DialError::Unavailable { path, source }
            }
            _ => DialError::Fatal { path, source },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DialError::Unavailable { .. })
    }
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Dial(#[from] DialError),
    #[error("relay io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
#[error("session {session} from {peer} did not drain within {grace:?}; closing it")]
pub struct ShutdownTimeoutError {
    pub session: u64,
    pub peer: String,
    pub grace: Duration,
}
