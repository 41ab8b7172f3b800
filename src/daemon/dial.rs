use log::debug;

use async_trait::async_trait;
use tokio::net::UnixStream;

use crate::config::DaemonTarget;
use crate::error::DialError;

pub mod dialer {
    use super::*;

    /// Opens a fresh connection to the daemon for every call. Sessions are
    /// never pooled: each client stream gets its own daemon stream.
    #[cfg_attr(test, mockall::automock)]
    #[async_trait]
    pub trait Dialer: Send + Sync {
        fn target(&self) -> &DaemonTarget;
        async fn dial(&self) -> Result<UnixStream, DialError>;
    }
}

pub struct UnixDialer {
    target: DaemonTarget,
}

impl UnixDialer {
    pub fn new(target: DaemonTarget) -> Self {
        UnixDialer { target }
    }
}

#[async_trait]
impl dialer::Dialer for UnixDialer {
    fn target(&self) -> &DaemonTarget {
        &self.target
    }

    async fn dial(&self) -> Result<UnixStream, DialError> {
        let path = self.target.path();
        match UnixStream::connect(path).await {
            Ok(stream) => {
                debug!("Dialed docker socket {}", path.display());
                Ok(stream)
            }
            Err(e) => Err(DialError::new(path.to_path_buf(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::dialer::Dialer;
    use super::*;

    use tempfile::TempDir;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_dial_missing_socket_is_transient() {
        let dir = TempDir::new().unwrap();
        let d = UnixDialer::new(DaemonTarget::new(dir.path().join("docker.sock")));

        let e = d.dial().await.err().unwrap();
        assert!(e.is_transient());
    }

    #[tokio::test]
    async fn test_dial_live_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docker.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let d = UnixDialer::new(DaemonTarget::new(&path));

        let (dialed, accepted) = tokio::join!(d.dial(), listener.accept());
        assert!(dialed.is_ok());
        assert!(accepted.is_ok());
        assert_eq!(d.target().path(), path.as_path());
    }

    #[tokio::test]
    async fn test_dial_each_call_opens_new_stream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docker.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let d = UnixDialer::new(DaemonTarget::new(&path));

        let _first = d.dial().await.unwrap();
        let _second = d.dial().await.unwrap();
        assert!(listener.accept().await.is_ok());
        assert!(listener.accept().await.is_ok());
    }
}
