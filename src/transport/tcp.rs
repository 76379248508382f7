//! DNS over TCP (RFC 7766): every message is prefixed with its length as a
//! 2-byte big-endian integer.

use super::{DnsTransport, CONNECT_TIMEOUT};
use crate::error::TransportError;
use crate::wire::HEADER_LEN;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout as with_timeout, timeout_at, Instant};
use tracing::debug;

const MAX_TCP_MESSAGE_SIZE: usize = 65535;

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

impl TcpTransport {
    async fn exchange(stream: &mut TcpStream, addr: SocketAddr, message: &[u8]) -> Result<Vec<u8>, TransportError> {
        let io_failed = |e: std::io::Error| TransportError::ConnectionFailed { addr: addr.to_string(), source: e };
        let corrupt = |reason: String| TransportError::CorruptResponse { addr: addr.to_string(), reason };

        let mut req = Vec::with_capacity(message.len() + 2);
        req.extend_from_slice(&(message.len() as u16).to_be_bytes());
        req.extend_from_slice(message);
        stream.write_all(&req).await.map_err(io_failed)?;

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => corrupt("connection closed before the length prefix".to_string()),
            _ => io_failed(e),
        })?;
        let declared = u16::from_be_bytes(len_buf) as usize;

        let mut resp = vec![0u8; declared];
        let mut received = 0;
        while received < declared {
            let n = stream.read(&mut resp[received..]).await.map_err(io_failed)?;
            if n == 0 { break; }
            received += n;
        }

        if received < HEADER_LEN {
            return Err(corrupt(format!("{} bytes received, no DNS header", received)));
        }
        if received < declared {
            return Err(corrupt(format!("declared {} bytes, received {}", declared, received)));
        }
        Ok(resp)
    }
}

#[async_trait]
impl DnsTransport for TcpTransport {
    async fn send(&self, addr: SocketAddr, message: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if message.len() > MAX_TCP_MESSAGE_SIZE {
            return Err(TransportError::MessageTooLarge(message.len()));
        }

        // connect and exchange share one budget
        let deadline = Instant::now() + timeout;
        let mut stream = with_timeout(timeout.min(CONNECT_TIMEOUT), TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout(addr.to_string()))?
            .map_err(|e| TransportError::ConnectionFailed { addr: addr.to_string(), source: e })?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::ConnectionFailed { addr: addr.to_string(), source: e })?;

        let resp = timeout_at(deadline, Self::exchange(&mut stream, addr, message))
            .await
            .map_err(|_| TransportError::Timeout(addr.to_string()))??;
        debug!(server = %addr, bytes_received = resp.len(), "TCP response received");
        Ok(resp)
    }

    fn protocol_name(&self) -> &'static str {
        "TCP"
    }
}
