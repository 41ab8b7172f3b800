use log::debug;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::try_join;

use crate::daemon::dial::dialer::Dialer;
use crate::error::RelayError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_daemon: u64,
    pub daemon_to_client: u64,
}

/// Copies one direction until `reader` hits end-of-stream, then shuts down
/// the write side of `writer` so the peer sees the half-close.
async fn pipe<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let copied = tokio::io::copy(reader, writer).await?;
    match writer.shutdown().await {
        Ok(()) => Ok(copied),
        // The peer already went away; nothing left to signal.
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(copied),
        Err(e) => Err(e),
    }
}

/// Forwards one client stream to a freshly dialed daemon stream.
///
/// Each direction completes independently, so a client that finishes writing
/// still receives the rest of the daemon's reply. An IO error in either
/// direction tears the whole session down. Both streams are dropped, and so
/// closed, on every return path.
pub async fn relay<C, D>(client: C, dialer: &D) -> Result<RelayStats, RelayError>
where
    C: AsyncRead + AsyncWrite + Send + Unpin,
    D: Dialer + ?Sized,
{
    // On dial failure `client` is dropped here, which closes it.
    let mut server = dialer.dial().await?;

    let (mut ri, mut wi) = tokio::io::split(client);
    let (mut ro, mut wo) = server.split();

    let client_to_server = pipe(&mut ri, &mut wo);
    let server_to_client = pipe(&mut ro, &mut wi);

    let (bytes_tx, bytes_rx) = try_join!(client_to_server, server_to_client)?;

    debug!(
        "client wrote {:?} bytes and received {:?} bytes",
        bytes_tx, bytes_rx
    );
    Ok(RelayStats {
        client_to_daemon: bytes_tx,
        daemon_to_client: bytes_rx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonTarget;
    use crate::daemon::dial::dialer::MockDialer;
    use crate::daemon::dial::UnixDialer;
    use crate::error::DialError;

    use std::path::PathBuf;
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::{UnixListener, UnixStream};

    async fn echo_daemon(listener: UnixListener) {
        while let Ok((mut conn, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = conn.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
                let _ = w.shutdown().await;
            });
        }
    }

    #[tokio::test]
    async fn test_relay_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docker.sock");
        tokio::spawn(echo_daemon(UnixListener::bind(&path).unwrap()));
        let d = UnixDialer::new(DaemonTarget::new(&path));

        let (client, proxied) = UnixStream::pair().unwrap();
        let session = tokio::spawn(async move { relay(proxied, &d).await });

        let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
        let (mut rd, mut wr) = client.into_split();
        let writer = {
            let payload = payload.clone();
            tokio::spawn(async move {
                wr.write_all(&payload).await.unwrap();
                wr.shutdown().await.unwrap();
            })
        };

        let mut echoed = Vec::new();
        rd.read_to_end(&mut echoed).await.unwrap();
        writer.await.unwrap();
        assert_eq!(echoed, payload);

        let stats = session.await.unwrap().unwrap();
        assert_eq!(stats.client_to_daemon, payload.len() as u64);
        assert_eq!(stats.daemon_to_client, payload.len() as u64);
    }

    #[tokio::test]
    async fn test_relay_half_close_drains_reply() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docker.sock");
        let listener = UnixListener::bind(&path).unwrap();

        // Daemon reads the whole request, waits, then answers in two writes.
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            conn.read_to_end(&mut request).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            conn.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            conn.write_all(&request).await.unwrap();
        });
        let d = UnixDialer::new(DaemonTarget::new(&path));

        let (mut client, proxied) = UnixStream::pair().unwrap();
        let session = tokio::spawn(async move { relay(proxied, &d).await });

        client.write_all(b"GET /_ping HTTP/1.1\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"HTTP/1.1 200 OK\r\n\r\nGET /_ping HTTP/1.1\r\n\r\n".to_vec());
        assert!(session.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_relay_dial_failure_closes_client() {
        let mut m_dialer = MockDialer::new();
        m_dialer.expect_dial().times(1).returning(|| {
            Err(DialError::new(
                PathBuf::from("/nonexistent/docker.sock"),
                io::Error::from(io::ErrorKind::NotFound),
            ))
        });

        let (mut client, proxied) = UnixStream::pair().unwrap();
        let e = relay(proxied, &m_dialer).await.err().unwrap();
        assert!(matches!(e, RelayError::Dial(ref d) if d.is_transient()));

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_relay_daemon_hangs_up_mid_request() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docker.sock");
        let listener = UnixListener::bind(&path).unwrap();

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut head = [0u8; 1024];
            conn.read_exact(&mut head).await.unwrap();
        });
        let d = UnixDialer::new(DaemonTarget::new(&path));

        let (client, proxied) = UnixStream::pair().unwrap();
        let session = tokio::spawn(async move { relay(proxied, &d).await });

        let (mut rd, mut wr) = client.into_split();
        let writer = tokio::spawn(async move {
            let chunk = vec![7u8; 64 * 1024];
            for _ in 0..128 {
                if wr.write_all(&chunk).await.is_err() {
                    break;
                }
            }
        });

        let res = tokio::time::timeout(Duration::from_secs(10), session)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(res, Err(RelayError::Io(_))));

        // Both ends of the client stream are closed with the session.
        let mut rest = Vec::new();
        let _ = rd.read_to_end(&mut rest).await;
        tokio::time::timeout(Duration::from_secs(10), writer)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_relay_daemon_closes_first() {
        let mut m_dialer = MockDialer::new();
        m_dialer.expect_dial().times(1).returning(|| {
            let (ours, theirs) = UnixStream::pair().unwrap();
            // Daemon side hangs up without answering.
            drop(theirs);
            Ok(ours)
        });

        let (mut client, proxied) = UnixStream::pair().unwrap();
        let session = tokio::spawn(async move { relay(proxied, &m_dialer).await });

        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);

        drop(client);
        tokio::time::timeout(Duration::from_secs(5), session)
            .await
            .unwrap()
            .unwrap()
            .ok();
    }
}
