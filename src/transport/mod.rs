pub mod tcp;
pub mod udp;

use crate::error::TransportError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;

pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// EDNS buffer size; anything larger must go over TCP.
pub const MAX_UDP_MESSAGE_SIZE: usize = 4096;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

/// Sends one pre-encoded message and returns the raw response bytes.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn send(&self, addr: SocketAddr, message: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError>;

    fn protocol_name(&self) -> &'static str;
}
