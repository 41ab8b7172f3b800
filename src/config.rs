use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StartError;

pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Kernel picks the port when binding to this value.
pub const VMADDR_PORT_ANY: u32 = u32::MAX;

/// What a configured port of 0 means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroPortPolicy {
    #[default]
    Reject,
    Ephemeral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenConfig {
    pub port: u32,
    pub zero_port: ZeroPortPolicy,
}

impl ListenConfig {
    pub fn new(port: u32) -> Self {
        ListenConfig {
            port,
            zero_port: ZeroPortPolicy::default(),
        }
    }

    /// Port to hand to the transport's bind call.
    pub fn bind_port(&self) -> Result<u32, StartError> {
        match (self.port, self.zero_port) {
            (0 | VMADDR_PORT_ANY, ZeroPortPolicy::Reject) => Err(StartError::InvalidPort),
            (0 | VMADDR_PORT_ANY, ZeroPortPolicy::Ephemeral) => Ok(VMADDR_PORT_ANY),
            (port, _) => Ok(port),
        }
    }
}

/// Docker control socket location. Fixed once the proxy starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonTarget {
    path: PathBuf,
}

impl DaemonTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DaemonTarget { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for DaemonTarget {
    fn default() -> Self {
        DaemonTarget::new(DEFAULT_DOCKER_SOCKET)
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen: ListenConfig,
    pub target: DaemonTarget,
    pub grace_period: Duration,
    /// Passed through from the command line untouched.
    pub extra_args: Vec<String>,
}

impl ProxyConfig {
    pub fn new(port: u32) -> Self {
        ProxyConfig {
            listen: ListenConfig::new(port),
            target: DaemonTarget::default(),
            grace_period: DEFAULT_GRACE_PERIOD,
            extra_args: Vec::new(),
        }
    }
}
