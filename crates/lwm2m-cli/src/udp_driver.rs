//! Production [`Driver`]: a real UDP socket, a file-backed KV store
//! standing in for flash, and logged no-op stand-ins for the modem
//! oracle's APN/IP-family controls — this machine has no cellular modem
//! to drive.

use std::{
    net::SocketAddr,
    path::PathBuf,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use lwm2m_app::{Driver, DriverError};
use tokio::net::{ToSocketAddrs, UdpSocket};

/// Max LWM2M/CoAP datagram this binary will read off the wire in one
/// call; oversized UDP reads are truncated by the kernel before we ever
/// see them, so this only bounds the read buffer.
const RECV_BUFFER_SIZE: usize = 2048;

/// UDP transport, in-process endpoint identity, and a directory of
/// one-file-per-key KV records.
pub struct UdpDriver {
    socket: UdpSocket,
    endpoint_name: String,
    kv_dir: PathBuf,
}

impl UdpDriver {
    /// Bind a UDP socket at `bind_addr` and use `kv_dir` (created if
    /// missing) to persist KV records, one file per key.
    pub async fn bind(
        bind_addr: impl ToSocketAddrs,
        endpoint_name: String,
        kv_dir: PathBuf,
    ) -> Result<Self, DriverError> {
        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| DriverError::Socket(e.to_string()))?;
        tokio::fs::create_dir_all(&kv_dir).await.map_err(|e| DriverError::Persistence(e.to_string()))?;
        Ok(Self { socket, endpoint_name, kv_dir })
    }

    fn kv_path(&self, key: u16) -> PathBuf {
        self.kv_dir.join(format!("{key:05}.bin"))
    }
}

/// Strip a `coap://`/`coaps://` scheme and split off the port, defaulting
/// to the standard CoAP/DTLS ports when the URI omits one.
fn host_port(server_uri: &str) -> Result<(String, u16), DriverError> {
    let (rest, default_port) = if let Some(rest) = server_uri.strip_prefix("coaps://") {
        (rest, 5684)
    } else if let Some(rest) = server_uri.strip_prefix("coap://") {
        (rest, 5683)
    } else {
        (server_uri, 5683)
    };
    let rest = rest.split('/').next().unwrap_or(rest);
    match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| DriverError::NetworkDown(format!("invalid port in '{server_uri}'")))?;
            Ok((host.to_string(), port))
        },
        None => Ok((rest.to_string(), default_port)),
    }
}

impl Driver for UdpDriver {
    type Error = DriverError;
    type Instant = Instant;

    async fn poll_datagram(&mut self) -> Result<Option<(Vec<u8>, SocketAddr)>, Self::Error> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        match self.socket.try_recv_from(&mut buf) {
            Ok((len, peer)) => Ok(Some((buf[..len].to_vec(), peer))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(DriverError::Socket(e.to_string())),
        }
    }

    async fn send_datagram(&mut self, bytes: &[u8], peer: SocketAddr) -> Result<(), Self::Error> {
        self.socket.send_to(bytes, peer).await.map_err(|e| DriverError::Socket(e.to_string()))?;
        Ok(())
    }

    async fn resolve_peer(&mut self, server_uri: &str) -> Result<SocketAddr, Self::Error> {
        let (host, port) = host_port(server_uri)?;
        tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| DriverError::NetworkDown(e.to_string()))?
            .next()
            .ok_or_else(|| DriverError::NetworkDown(format!("no address for '{server_uri}'")))
    }

    fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    async fn swap_apn(&mut self) -> Result<(), Self::Error> {
        tracing::warn!("swap_apn requested but no modem oracle is present on this host; ignoring");
        Ok(())
    }

    async fn toggle_ip_family(&mut self) -> Result<(), Self::Error> {
        tracing::warn!("toggle_ip_family requested but no modem oracle is present on this host; ignoring");
        Ok(())
    }

    async fn kv_get(&mut self, key: u16) -> Result<Option<Vec<u8>>, Self::Error> {
        match tokio::fs::read(self.kv_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DriverError::Persistence(e.to_string())),
        }
    }

    async fn kv_put(&mut self, key: u16, bytes: Vec<u8>) -> Result<(), Self::Error> {
        let path = self.kv_path(key);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| DriverError::Persistence(e.to_string()))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| DriverError::Persistence(e.to_string()))?;
        Ok(())
    }

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn now_unix(&self) -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
    }
}
