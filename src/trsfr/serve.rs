use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::daemon::dial::dialer::Dialer;
use crate::error::{AcceptError, RelayError, ShutdownTimeoutError, StartError};
use crate::trsfr::listen::{transport::Transport, ListenerHandle};
use crate::trsfr::relay::relay;
use crate::trsfr::state::ProxyState;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listening,
    Draining,
    Stopped,
}

/// Owns the listener, spawns one relay task per accepted client and runs the
/// drain on shutdown.
pub struct Supervisor<D: Dialer> {
    dialer: Arc<D>,
    state: Arc<ProxyState>,
    grace_period: Duration,
    stop: CancellationToken,
    phase: watch::Sender<Phase>,
}

impl<D: Dialer + 'static> Supervisor<D> {
    pub fn new(dialer: D, grace_period: Duration) -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        Supervisor {
            dialer: Arc::new(dialer),
            state: ProxyState::new(),
            grace_period,
            stop: CancellationToken::new(),
            phase,
        }
    }

    pub fn with_stop_token(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    /// Cancelling this token moves the supervisor into `Draining`.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn state(&self) -> Arc<ProxyState> {
        Arc::clone(&self.state)
    }

    /// Binds with `bind` and serves until stopped. A bind failure is returned
    /// as is and leaves the supervisor `Idle`.
    pub async fn start<T, F>(&self, bind: F) -> Result<(), StartError>
    where
        T: Transport,
        F: FnOnce() -> Result<T, StartError>,
    {
        let listener = bind()?;
        self.serve(ListenerHandle::new(listener)).await;
        Ok(())
    }

    /// Accept loop. Returns once the stop token fires or the listener is
    /// closed, and every session has drained or been force-closed.
    pub async fn serve<T: Transport>(&self, mut listener: ListenerHandle<T>) {
        self.phase.send_replace(Phase::Listening);
        match listener.local_port() {
            Some(port) => info!("Docker proxy listening on port {}", port),
            None => info!("Docker proxy listening"),
        }

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.stop.cancelled() => None,
                res = listener.accept() => Some(res),
            };

            let Some(res) = accepted else {
                info!("Stop requested, closing listener");
                listener.close();
                break;
            };

            match res {
                Ok((conn, peer)) => self.spawn_relay(conn, peer),
                Err(AcceptError::Closed) => {
                    info!("Listener closed");
                    break;
                }
                Err(e @ AcceptError::Transient(_)) => {
                    warn!("{}", e);
                    tokio::select! {
                        _ = self.stop.cancelled() => (),
                        _ = tokio::time::sleep(ACCEPT_BACKOFF) => (),
                    }
                }
            }
        }

        self.drain().await;
    }

    fn spawn_relay<C>(&self, conn: C, peer: String)
    where
        C: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
    {
        let guard = self.state.register(peer.clone());
        let id = guard.id();
        let dialer = Arc::clone(&self.dialer);
        debug!("Session {} accepted from {}", id, peer);

        let task = tokio::spawn(async move {
            let _guard = guard;
            match relay(conn, dialer.as_ref()).await {
                Ok(stats) => debug!(
                    "Session {} from {} finished: {} bytes in, {} bytes out",
                    id, peer, stats.client_to_daemon, stats.daemon_to_client
                ),
                Err(RelayError::Dial(e)) => {
                    warn!("Session {} from {} closed: {}", id, peer, e)
                }
                Err(e) => warn!("Session {} from {} torn down: {}", id, peer, e),
            }
        });
        self.state.attach(id, task.abort_handle());
    }

    async fn drain(&self) {
        self.phase.send_replace(Phase::Draining);
        let active = self.state.active();
        if active > 0 {
            info!(
                "Draining {} session(s) with a grace period of {:?}",
                active, self.grace_period
            );
        }

        if tokio::time::timeout(self.grace_period, self.state.wait_idle())
            .await
            .is_err()
        {
            for (session, peer) in self.state.snapshot() {
                warn!(
                    "{}",
                    ShutdownTimeoutError {
                        session,
                        peer,
                        grace: self.grace_period,
                    }
                );
            }
            self.state.abort_all();
            self.state.wait_idle().await;
        }

        self.phase.send_replace(Phase::Stopped);
        info!("Docker proxy stopped");
    }
}
