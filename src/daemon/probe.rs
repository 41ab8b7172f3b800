use log::{debug, info, warn};
use std::time::Duration;

use crate::daemon::dial::dialer::Dialer;

const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

#[derive(Debug, PartialEq, Eq)]
pub enum Status {
    Alive,
    Dead,
}

/// One-shot reachability check of the daemon socket. Never fatal; clients
/// arriving before the daemon is up simply get their connection closed.
pub async fn check_daemon_health<D: Dialer + ?Sized>(dialer: &D) -> Status {
    let path = dialer.target().path().display().to_string();
    match tokio::time::timeout(PROBE_TIMEOUT, dialer.dial()).await {
        Ok(Ok(_)) => {
            info!("Docker socket {} is reachable", path);
            Status::Alive
        }
        Ok(Err(e)) if e.is_transient() => {
            warn!("Docker socket not ready yet: {}", e);
            Status::Dead
        }
        Ok(Err(e)) => {
            warn!("{}", e);
            Status::Dead
        }
        Err(_) => {
            debug!("Docker socket {} probe timed out", path);
            Status::Dead
        }
    }
}
