use log::{debug, warn};
use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

use crate::error::AcceptError;

pub mod transport {
    use super::*;

    /// A bound socket that yields raw duplex byte streams.
    #[async_trait]
    pub trait Transport: Send {
        type Conn: AsyncRead + AsyncWrite + Send + Unpin + 'static;
        /// Returns the accepted stream and a printable peer address.
        async fn accept(&mut self) -> io::Result<(Self::Conn, String)>;
        fn local_port(&self) -> Option<u32>;
    }
}

use transport::Transport;

/// Errors after which the socket will never accept again.
fn is_fatal_accept_error(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::InvalidInput
        || matches!(
            e.raw_os_error(),
            Some(libc::EBADF | libc::EINVAL | libc::ENOTSOCK)
        )
}

#[async_trait]
impl Transport for UnixListener {
    type Conn = tokio::net::UnixStream;

    async fn accept(&mut self) -> io::Result<(Self::Conn, String)> {
        let (stream, addr) = UnixListener::accept(self).await?;
        let peer = match addr.as_pathname() {
            Some(path) => path.display().to_string(),
            None => "unix:unnamed".to_string(),
        };
        Ok((stream, peer))
    }

    fn local_port(&self) -> Option<u32> {
        None
    }
}

/// Closes a [`ListenerHandle`] from another task.
#[derive(Clone)]
pub struct ListenerCloser {
    closed: CancellationToken,
}

impl ListenerCloser {
    pub fn close(&self) {
        self.closed.cancel();
    }
}

pub struct ListenerHandle<T: Transport> {
    listener: Option<T>,
    closed: CancellationToken,
}

impl<T: Transport> ListenerHandle<T> {
    pub fn new(listener: T) -> Self {
        ListenerHandle {
            listener: Some(listener),
            closed: CancellationToken::new(),
        }
    }

    pub fn closer(&self) -> ListenerCloser {
        ListenerCloser {
            closed: self.closed.clone(),
        }
    }

    pub fn local_port(&self) -> Option<u32> {
        self.listener.as_ref().and_then(|l| l.local_port())
    }

    pub fn is_closed(&self) -> bool {
        self.listener.is_none() || self.closed.is_cancelled()
    }

    /// Waits for the next client. Fails with [`AcceptError::Closed`] once the
    /// handle or any of its closers has been closed, including while waiting.
    pub async fn accept(&mut self) -> Result<(T::Conn, String), AcceptError> {
        if self.is_closed() {
            self.close();
            return Err(AcceptError::Closed);
        }
        let Some(listener) = self.listener.as_mut() else {
            return Err(AcceptError::Closed);
        };

        let accepted = tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            res = listener.accept() => Some(res),
        };

        match accepted {
            Some(Err(e)) if is_fatal_accept_error(&e) => {
                warn!("Listener failed permanently: {}", e);
                self.close();
                Err(AcceptError::Closed)
            }
            Some(res) => res.map_err(AcceptError::Transient),
            None => {
                self.close();
                Err(AcceptError::Closed)
            }
        }
    }

    /// Drops the bound socket. Safe to call any number of times.
    pub fn close(&mut self) {
        self.closed.cancel();
        if self.listener.take().is_some() {
            debug!("Listener closed");
        }
    }
}
