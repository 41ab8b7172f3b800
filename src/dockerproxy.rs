use log::{debug, info, warn};

use futures::future::pending;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::config::ProxyConfig;
use crate::daemon::dial::UnixDialer;
use crate::daemon::probe::check_daemon_health;
use crate::error::StartError;
use crate::trsfr::serve::Supervisor;
use crate::trsfr::vsock::VsockTransport;

/// Runs the proxy until SIGINT or SIGTERM. Only startup failures are
/// returned; per-connection problems end up in the log.
#[tokio::main]
pub async fn start(config: ProxyConfig) -> Result<(), StartError> {
    let stop = CancellationToken::new();
    let signalled = stop.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signalled.cancel();
    });

    run(config, stop).await
}

pub async fn run(config: ProxyConfig, stop: CancellationToken) -> Result<(), StartError> {
    let requested = config.listen.port;
    let port = config.listen.bind_port()?;
    if !config.extra_args.is_empty() {
        debug!("Pass-through arguments: {:?}", config.extra_args);
    }

    let dialer = UnixDialer::new(config.target.clone());
    check_daemon_health(&dialer).await;

    let sup = Supervisor::new(dialer, config.grace_period).with_stop_token(stop);
    sup.start(|| {
        VsockTransport::bind(port).map_err(|source| StartError::Bind {
            port: requested,
            source,
        })
    })
    .await
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for SIGINT: {}", e);
            pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = interrupt => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
