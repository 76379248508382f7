//! DNS-over-HTTPS (RFC 8484), POST with an `application/dns-message` body.

use super::DnsClient;
use crate::error::{ClientError, ClientResult};
use crate::types::Message;
use crate::upstream::DnsUpstream;
use crate::wire;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;
use tracing::debug;

pub const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

pub struct DohClient {
    http: reqwest::Client,
}

impl DohClient {
    pub fn new() -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(4)
            .build()
            .map_err(ClientError::HttpClient)?;
        Ok(Self { http })
    }

    /// POSTs already encoded bytes to `url` and returns the raw body.
    async fn post(&self, url: &str, body: Vec<u8>, timeout: Duration) -> ClientResult<Vec<u8>> {
        let http_error = |source: reqwest::Error| ClientError::Http { url: url.to_string(), source };

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
            .header(ACCEPT, DNS_MESSAGE_CONTENT_TYPE)
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpStatus { url: url.to_string(), status: status.as_u16() });
        }
        let bytes = response.bytes().await.map_err(http_error)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DnsClient for DohClient {
    fn name(&self) -> &str {
        "doh"
    }

    fn supports(&self, upstream: &DnsUpstream) -> bool {
        upstream.scheme() == Some("https")
    }

    async fn query(&self, upstream: &DnsUpstream, request: &Message, timeout: Duration) -> ClientResult<Message> {
        let url = upstream.address().url();
        let body = wire::encode(request)?;
        debug!(url = %url, message_len = body.len(), "Sending DoH query");

        let raw = self.post(&url, body, timeout).await?;
        debug!(url = %url, response_len = raw.len(), "DoH response received");
        Ok(wire::decode(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DnsClass, Rcode, RecordType, ResourceRecord};
    use std::net::{Ipv4Addr, SocketAddr};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP/1.1 responder: answers one POST with `status` and, on 200, the DNS answer.
    async fn serve_once(status: u16) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            let (head_end, content_length) = loop {
                let n = stream.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&raw[..pos]).to_ascii_lowercase();
                    assert!(head.starts_with("post "));
                    assert!(head.contains("content-type: application/dns-message"));
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .map(|v| v.trim().parse::<usize>().unwrap())
                        .unwrap();
                    break (pos + 4, len);
                }
            };
            while raw.len() < head_end + content_length {
                let n = stream.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
            }

            let query = wire::decode(&raw[head_end..head_end + content_length]).unwrap();
            let answer = ResourceRecord::a(query.qname(), 300, Ipv4Addr::new(192, 0, 2, 1));
            let body = wire::encode(&query.to_response(Rcode::NoError).with_answers(vec![answer])).unwrap();
            let head = if status == 200 {
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/dns-message\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                )
            } else {
                format!("HTTP/1.1 {} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status)
            };
            stream.write_all(head.as_bytes()).await.unwrap();
            if status == 200 {
                stream.write_all(&body).await.unwrap();
            }
            stream.shutdown().await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_post_exchange() {
        let addr = serve_once(200).await;
        let upstream = DnsUpstream::parse(&format!("http://{}/dns-query", addr)).unwrap();
        let request = Message::query("doh.example", RecordType::A, DnsClass::IN).with_id(0x0102);

        let client = DohClient::new().unwrap();
        let response = client.query(&upstream, &request, Duration::from_secs(5)).await.unwrap();
        assert_eq!(response.id(), 0x0102);
        assert!(response.header().qr);
        assert_eq!(response.queries(), request.queries());
        assert_eq!(response.answers()[0].ip_addr(), Some(Ipv4Addr::new(192, 0, 2, 1).into()));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let addr = serve_once(503).await;
        let upstream = DnsUpstream::parse(&format!("http://{}/dns-query", addr)).unwrap();
        let request = Message::query("doh.example", RecordType::A, DnsClass::IN).with_id(1);

        let client = DohClient::new().unwrap();
        let err = client.query(&upstream, &request, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ClientError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_connection_failure_is_wrapped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let upstream = DnsUpstream::parse(&format!("http://{}/dns-query", addr)).unwrap();
        let request = Message::query("doh.example", RecordType::A, DnsClass::IN).with_id(1);

        let client = DohClient::new().unwrap();
        let err = client.query(&upstream, &request, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, ClientError::Http { .. }));
    }

    #[test]
    fn test_supports_https_only() {
        let client = DohClient::new().unwrap();
        assert!(client.supports(&DnsUpstream::parse("https://cloudflare-dns.com/dns-query").unwrap()));
        assert!(!client.supports(&DnsUpstream::parse("udp://1.1.1.1").unwrap()));
    }
}
