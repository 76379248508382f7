use super::{remaining, DnsClient};
use crate::dnscrypt::crypto::TAG_LEN;
use crate::dnscrypt::padding::{padded_len, MIN_QUERY_LEN, PADDING_BLOCK};
use crate::dnscrypt::query::{HALF_NONCE_LEN, PUBLIC_KEY_LEN};
use crate::dnscrypt::{CertificateStore, CryptoSession};
use crate::error::{ClientResult, TransportError};
use crate::metrics::TRUNCATED_RETRIES_TOTAL;
use crate::transport::{DnsTransport, TcpTransport, UdpTransport, MAX_UDP_MESSAGE_SIZE};
use crate::types::Message;
use crate::upstream::{DnsCryptUpstream, DnsUpstream, DEFAULT_DNSCRYPT_PORT};
use crate::wire;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub struct DnsCryptClient {
    certificates: CertificateStore,
    udp: UdpTransport,
    tcp: TcpTransport,
}

impl Default for DnsCryptClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsCryptClient {
    pub fn new() -> Self {
        Self::with_certificate_store(CertificateStore::new())
    }

    pub fn with_certificate_store(certificates: CertificateStore) -> Self {
        Self { certificates, udp: UdpTransport, tcp: TcpTransport }
    }

    async fn exchange(
        session: &CryptoSession,
        transport: &dyn DnsTransport,
        addr: SocketAddr,
        wire_query: &[u8],
        request_id: u16,
        deadline: Instant,
    ) -> ClientResult<Message> {
        let target = addr.to_string();
        let query = session.encrypt(wire_query)?;
        let raw = transport.send(addr, &query.to_bytes(), remaining(deadline, &target)?).await?;
        let plain = session.decrypt(&query, &raw)?;
        let response = wire::decode(&plain)?;
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

/// Size of the datagram carrying a `len`-byte wire query.
fn encrypted_query_len(len: usize) -> usize {
    8 + PUBLIC_KEY_LEN + HALF_NONCE_LEN + TAG_LEN + padded_len(len, MIN_QUERY_LEN, PADDING_BLOCK)
}

#[async_trait]
impl DnsClient for DnsCryptClient {
    fn name(&self) -> &str {
        "dnscrypt"
    }

    fn supports(&self, upstream: &DnsUpstream) -> bool {
        upstream.is_dnscrypt()
    }

    async fn query(&self, upstream: &DnsUpstream, request: &Message, timeout: Duration) -> ClientResult<Message> {
        let deadline = Instant::now() + timeout;
        let dnscrypt = DnsCryptUpstream::try_from(upstream)?;
        let cert = self
            .certificates
            .get_certificate(dnscrypt, remaining(deadline, upstream.uri())?)
            .await?;
        let session = CryptoSession::new(&cert);
        debug!(upstream = %upstream, session = ?session, "DNSCrypt session ready");

        let request = request.with_rd(true);
        let wire_query = wire::encode(&request)?;
        let addr = upstream
            .address()
            .resolve(DEFAULT_DNSCRYPT_PORT, remaining(deadline, upstream.uri())?)
            .await?;

        if encrypted_query_len(wire_query.len()) <= MAX_UDP_MESSAGE_SIZE {
            let response = Self::exchange(&session, &self.udp, addr, &wire_query, request.id(), deadline).await?;
            if !response.is_truncated() {
                return Ok(response);
            }
            warn!(upstream = %upstream, qname = %request.qname(), "Truncated DNSCrypt response, retrying over TCP");
            TRUNCATED_RETRIES_TOTAL.with_label_values(&[self.name()]).inc();
        }

        Self::exchange(&session, &self.tcp, addr, &wire_query, request.id(), deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::types::{DnsClass, RecordType};

    #[tokio::test]
    async fn test_rejects_non_dnscrypt_upstream() {
        let client = DnsCryptClient::new();
        let upstream = DnsUpstream::parse("udp://127.0.0.1:53").unwrap();
        let request = Message::query("example.com", RecordType::A, DnsClass::IN);
        let err = client.query(&upstream, &request, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }

    #[test]
    fn test_encrypted_query_len() {
        assert_eq!(encrypted_query_len(30), 52 + 16 + 256);
        assert_eq!(encrypted_query_len(300), 52 + 16 + 320);
    }

    #[test]
    fn test_supports() {
        let client = DnsCryptClient::new();
        let typed = DnsUpstream::dnscrypt("127.0.0.1:8443", "2.dnscrypt-cert.example", "00").unwrap();
        assert!(client.supports(&typed));
        assert!(!client.supports(&DnsUpstream::parse("https://dns.google/dns-query").unwrap()));
    }
}
