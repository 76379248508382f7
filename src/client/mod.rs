pub mod dnscrypt;
pub mod doh;
pub mod plain;

use crate::error::{ClientResult, TransportError};
use crate::types::Message;
use crate::upstream::DnsUpstream;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub use self::dnscrypt::DnsCryptClient;
pub use self::doh::DohClient;
pub use self::plain::PlainClient;

/// A protocol adapter able to forward a message to some upstreams.
#[async_trait]
pub trait DnsClient: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, upstream: &DnsUpstream) -> bool;

    /// Sends `request` to `upstream` and returns the decoded response.
    /// The whole exchange, retries included, must finish within `timeout`.
    async fn query(&self, upstream: &DnsUpstream, request: &Message, timeout: Duration) -> ClientResult<Message>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Plain,
    DoH,
    DnsCrypt,
}

impl ClientKind {
    /// Registration order of the built-in clients.
    pub const ALL: [ClientKind; 3] = [ClientKind::Plain, ClientKind::DoH, ClientKind::DnsCrypt];
}

impl FromStr for ClientKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "dns" | "udp" => Ok(Self::Plain),
            "doh" | "https" => Ok(Self::DoH),
            "dnscrypt" | "sdns" => Ok(Self::DnsCrypt),
            other => Err(format!("Unknown client: {}", other)),
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::DoH => "doh",
            Self::DnsCrypt => "dnscrypt",
        })
    }
}

pub fn create_client(kind: ClientKind) -> ClientResult<Arc<dyn DnsClient>> {
    match kind {
        ClientKind::Plain => Ok(Arc::new(PlainClient::new())),
        ClientKind::DoH => Ok(Arc::new(DohClient::new()?)),
        ClientKind::DnsCrypt => Ok(Arc::new(DnsCryptClient::new())),
    }
}

/// Every built-in client, in [`ClientKind::ALL`] order.
pub fn default_clients() -> ClientResult<Vec<Arc<dyn DnsClient>>> {
    ClientKind::ALL.iter().map(|kind| create_client(*kind)).collect()
}

/// Time left before `deadline`, or a timeout error once it has passed.
pub(crate) fn remaining(deadline: Instant, target: &str) -> Result<Duration, TransportError> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(TransportError::Timeout(target.to_string()));
    }
    Ok(left)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_kind_parsing() {
        assert_eq!("plain".parse::<ClientKind>(), Ok(ClientKind::Plain));
        assert_eq!("DoH".parse::<ClientKind>(), Ok(ClientKind::DoH));
        assert_eq!("dnscrypt".parse::<ClientKind>(), Ok(ClientKind::DnsCrypt));
        assert!("google".parse::<ClientKind>().is_err());
        assert_eq!(ClientKind::DnsCrypt.to_string(), "dnscrypt");
    }

    #[test]
    fn test_default_clients_cover_every_scheme() {
        let clients = default_clients().unwrap();
        let names: Vec<_> = clients.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["plain", "doh", "dnscrypt"]);

        let cases = [
            ("udp://1.1.1.1", "plain"),
            ("tcp://1.1.1.1", "plain"),
            ("9.9.9.9", "plain"),
            ("https://dns.google/dns-query", "doh"),
            ("sdns://AQcAAAAAAAAAETUxLjE1LjEwNi4xNzY6NDQzIGcUiAnFqewnNLjh8DUYpcePX07pXc3sDOf2U-vpI55WHjIuZG5zY3J5cHQtY2VydC5hbXMuY2hhcmlzLmNvbQ", "dnscrypt"),
        ];
        for (uri, expected) in cases {
            let upstream = DnsUpstream::parse(uri).unwrap();
            let supporting: Vec<_> = clients.iter().filter(|c| c.supports(&upstream)).map(|c| c.name()).collect();
            assert_eq!(supporting, vec![expected], "{}", uri);
        }

        let dot = DnsUpstream::parse("tls://1.1.1.1:853").unwrap();
        assert!(clients.iter().all(|c| !c.supports(&dot)));
    }

    #[test]
    fn test_remaining_after_deadline() {
        let past = Instant::now() - Duration::from_millis(5);
        assert!(matches!(remaining(past, "x"), Err(TransportError::Timeout(_))));
        assert!(remaining(Instant::now() + Duration::from_secs(1), "x").is_ok());
    }
}
