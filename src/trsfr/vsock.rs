use log::info;
use std::io;

use async_trait::async_trait;
use tokio_vsock::{VsockAddr, VsockListener, VsockStream, VMADDR_CID_ANY};

use crate::trsfr::listen::transport::Transport;

/// Listens on the hypervisor socket family for connections from the host.
pub struct VsockTransport {
    listener: VsockListener,
    port: u32,
}

impl VsockTransport {
    /// Binds `port` on any CID. Fails when the port is taken or the kernel has
    /// no vsock transport (not running inside a compatible VM).
    pub fn bind(port: u32) -> io::Result<Self> {
        let listener = VsockListener::bind(VsockAddr::new(VMADDR_CID_ANY, port))?;
        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(_) => port,
        };
        info!("vsock listener bound on port {}", port);
        Ok(VsockTransport { listener, port })
    }
}

#[async_trait]
impl Transport for VsockTransport {
    type Conn = VsockStream;

    async fn accept(&mut self) -> io::Result<(Self::Conn, String)> {
        let (stream, addr) = self.listener.accept().await?;
        Ok((stream, format!("vsock:{}:{}", addr.cid(), addr.port())))
    }

    fn local_port(&self) -> Option<u32> {
        Some(self.port)
    }
}
