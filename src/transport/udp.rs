//! DNS over UDP (RFC 1035 §4.2.1). One datagram out, one datagram back.

use super::{DnsTransport, MAX_UDP_MESSAGE_SIZE};
use crate::error::TransportError;
use crate::wire::HEADER_LEN;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

const RECV_BUFFER_SIZE: usize = 65535;

#[derive(Debug, Default, Clone, Copy)]
pub struct UdpTransport;

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn send(&self, addr: SocketAddr, message: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if message.len() > MAX_UDP_MESSAGE_SIZE {
            return Err(TransportError::MessageTooLarge(message.len()));
        }
        let connection_failed = |e: std::io::Error| TransportError::ConnectionFailed { addr: addr.to_string(), source: e };

        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await.map_err(connection_failed)?;
        // connected socket: datagrams from other sources are dropped by the kernel
        socket.connect(addr).await.map_err(connection_failed)?;

        let deadline = Instant::now() + timeout;
        let sent = timeout_at(deadline, socket.send(message))
            .await
            .map_err(|_| TransportError::Timeout(addr.to_string()))?
            .map_err(connection_failed)?;
        debug!(server = %addr, bytes_sent = sent, "UDP query sent");

        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let len = timeout_at(deadline, socket.recv(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout(addr.to_string()))?
            .map_err(connection_failed)?;
        if len < HEADER_LEN {
            return Err(TransportError::CorruptResponse {
                addr: addr.to_string(),
                reason: format!("{} byte datagram carries no DNS header", len),
            });
        }
        buf.truncate(len);
        debug!(server = %addr, bytes_received = len, "UDP response received");
        Ok(buf)
    }

    fn protocol_name(&self) -> &'static str {
        "UDP"
    }
}
