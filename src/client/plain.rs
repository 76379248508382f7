use super::{remaining, DnsClient};
use crate::error::{ClientResult, TransportError};
use crate::metrics::TRUNCATED_RETRIES_TOTAL;
use crate::transport::{DnsTransport, TcpTransport, UdpTransport, MAX_UDP_MESSAGE_SIZE};
use crate::types::Message;
use crate::upstream::{DnsUpstream, DEFAULT_DNS_PORT};
use crate::wire;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Classic DNS over UDP with TCP fallback.
pub struct PlainClient {
    udp: Box<dyn DnsTransport>,
    tcp: Box<dyn DnsTransport>,
}

impl Default for PlainClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PlainClient {
    pub fn new() -> Self {
        Self::with_transports(Box::new(UdpTransport), Box::new(TcpTransport))
    }

    pub fn with_transports(udp: Box<dyn DnsTransport>, tcp: Box<dyn DnsTransport>) -> Self {
        Self { udp, tcp }
    }

    async fn exchange(
        transport: &dyn DnsTransport,
        addr: SocketAddr,
        bytes: &[u8],
        request_id: u16,
        deadline: Instant,
    ) -> ClientResult<Message> {
        let target = addr.to_string();
        let raw = transport.send(addr, bytes, remaining(deadline, &target)?).await?;
        let response = wire::decode(&raw)?;
        if response.id() != request_id {
            return Err(TransportError::CorruptResponse {
                addr: target,
                reason: format!("response id {} does not match query id {}", response.id(), request_id),
            }
            .into());
        }
        Ok(response)
    }
}

#[async_trait]
impl DnsClient for PlainClient {
    fn name(&self) -> &str {
        "plain"
    }

    fn supports(&self, upstream: &DnsUpstream) -> bool {
        !upstream.is_dnscrypt() && matches!(upstream.scheme(), None | Some("udp") | Some("dns") | Some("tcp"))
    }

    async fn query(&self, upstream: &DnsUpstream, request: &Message, timeout: Duration) -> ClientResult<Message> {
        let deadline = Instant::now() + timeout;
        let request = request.with_rd(true);
        let bytes = wire::encode(&request)?;
        let addr = upstream
            .address()
            .resolve(DEFAULT_DNS_PORT, remaining(deadline, upstream.uri())?)
            .await?;

        let force_tcp = upstream.scheme() == Some("tcp") || bytes.len() > MAX_UDP_MESSAGE_SIZE;
        if !force_tcp {
            let response = Self::exchange(self.udp.as_ref(), addr, &bytes, request.id(), deadline).await?;
            if !response.is_truncated() {
                return Ok(response);
            }
            warn!(upstream = %upstream, qname = %request.qname(), "Truncated UDP response, retrying over TCP");
            TRUNCATED_RETRIES_TOTAL.with_label_values(&[self.name()]).inc();
        }

        debug!(upstream = %upstream, server = %addr, "Querying over {}", self.tcp.protocol_name());
        Self::exchange(self.tcp.as_ref(), addr, &bytes, request.id(), deadline).await
    }
}
