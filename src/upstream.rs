//! Upstream resolver descriptors, built once from a URI or a DNS stamp.

use crate::error::{ClientError, StampError, TransportError, UpstreamError};
use crate::stamp::{is_stamp, join_host_port, split_host_port, ServerStamp, StampDetails};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_DNS_PORT: u16 = 53;
pub const DEFAULT_HTTPS_PORT: u16 = 443;
pub const DEFAULT_DNSCRYPT_PORT: u16 = 443;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamAddress {
    /// Lower-cased scheme, `None` for a bare `host[:port]`.
    pub scheme: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub path: Option<String>,
}

impl UpstreamAddress {
    pub fn parse(uri: &str) -> Result<Self, UpstreamError> {
        let invalid = |reason: String| UpstreamError::InvalidUri { uri: uri.to_string(), reason };
        let trimmed = uri.trim();
        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
            None => (None, trimmed),
        };
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], Some(rest[idx..].to_string())),
            None => (rest, None),
        };
        let (host, port) = split_host_port(authority).map_err(invalid)?;
        if host.is_empty() {
            return Err(invalid("missing host".to_string()));
        }
        Ok(Self { scheme, host, port, path })
    }

    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }

    pub fn host_port(&self, default_port: u16) -> String {
        join_host_port(&self.host, Some(self.port_or(default_port)))
    }

    /// Resolves the host (IP literal or name) to the first socket address.
    /// A name lookup gives up after `timeout`.
    pub async fn resolve(&self, default_port: u16, timeout: Duration) -> Result<SocketAddr, TransportError> {
        let target = self.host_port(default_port);
        if let Ok(addr) = target.parse::<SocketAddr>() {
            return Ok(addr);
        }
        let mut addrs = tokio::time::timeout(timeout, tokio::net::lookup_host(target.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(target.clone()))?
            .map_err(|e| TransportError::ConnectionFailed { addr: target.clone(), source: e })?;
        let first = addrs.next();
        first.ok_or_else(|| TransportError::AddressResolution(target.clone()))
    }

    /// `scheme://host[:port]path`, used as the DoH endpoint.
    pub fn url(&self) -> String {
        let scheme = self.scheme.as_deref().unwrap_or("https");
        format!("{}://{}{}", scheme, join_host_port(&self.host, self.port), self.path.as_deref().unwrap_or(""))
    }
}

/// Parameters that turn an upstream into a DNSCrypt resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsCryptProvider {
    pub provider_name: String,
    /// Hex-encoded Ed25519 provider public key.
    pub provider_public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsUpstream {
    uri: String,
    code: String,
    address: UpstreamAddress,
    dnscrypt: Option<DnsCryptProvider>,
}

impl DnsUpstream {
    /// Parses a plain URI (`udp://`, `tcp://`, `https://`, bare `host[:port]`) or an `sdns://` stamp.
    pub fn parse(uri: &str) -> Result<Self, UpstreamError> {
        if is_stamp(uri) {
            match ServerStamp::decode(uri) {
                Ok(stamp) => return Ok(Self::from_stamp(uri, &stamp)),
                // a host that merely contains "sdns" is parsed as a regular URI
                Err(StampError::NotAStamp(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        let address = UpstreamAddress::parse(uri)?;
        Ok(Self { uri: uri.to_string(), code: uri.to_string(), address, dnscrypt: None })
    }

    pub fn from_stamp(uri: &str, stamp: &ServerStamp) -> Self {
        let (address, dnscrypt) = match &stamp.details {
            StampDetails::Plain => (
                UpstreamAddress { scheme: Some("dns".to_string()), host: stamp.host.clone(), port: stamp.port, path: None },
                None,
            ),
            StampDetails::DnsCrypt { public_key, provider_name } => (
                UpstreamAddress {
                    scheme: Some("sdns".to_string()),
                    host: stamp.host.clone(),
                    port: Some(stamp.port.unwrap_or(DEFAULT_DNSCRYPT_PORT)),
                    path: None,
                },
                Some(DnsCryptProvider {
                    provider_name: provider_name.clone(),
                    provider_public_key: hex::encode(public_key),
                }),
            ),
            StampDetails::DoH { hostname, path, .. } => {
                let (host, port) = split_host_port(hostname).unwrap_or((hostname.clone(), None));
                (
                    UpstreamAddress { scheme: Some("https".to_string()), host, port, path: Some(path.clone()) },
                    None,
                )
            }
            StampDetails::DoT { hostname, .. } => {
                let (host, port) = split_host_port(hostname).unwrap_or((hostname.clone(), None));
                (UpstreamAddress { scheme: Some("tls".to_string()), host, port, path: None }, None)
            }
        };
        Self { uri: uri.to_string(), code: uri.to_string(), address, dnscrypt }
    }

    /// An explicitly typed DNSCrypt upstream at `address` (`host[:port]`).
    pub fn dnscrypt(address: &str, provider_name: &str, provider_public_key: &str) -> Result<Self, UpstreamError> {
        let mut parsed = UpstreamAddress::parse(address)?;
        parsed.port = Some(parsed.port_or(DEFAULT_DNSCRYPT_PORT));
        Ok(Self {
            uri: address.to_string(),
            code: address.to_string(),
            address: parsed,
            dnscrypt: Some(DnsCryptProvider {
                provider_name: provider_name.to_string(),
                provider_public_key: provider_public_key.to_string(),
            }),
        })
    }

    pub fn with_code(self, code: impl Into<String>) -> Self {
        Self { code: code.into(), ..self }
    }

    pub fn uri(&self) -> &str { &self.uri }
    pub fn code(&self) -> &str { &self.code }
    pub fn address(&self) -> &UpstreamAddress { &self.address }
    pub fn scheme(&self) -> Option<&str> { self.address.scheme.as_deref() }
    pub fn dnscrypt_provider(&self) -> Option<&DnsCryptProvider> { self.dnscrypt.as_ref() }
    pub fn is_dnscrypt(&self) -> bool { self.dnscrypt.is_some() }
}

impl fmt::Display for DnsUpstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// A view of an upstream that is known to carry DNSCrypt parameters.
#[derive(Debug, Clone, Copy)]
pub struct DnsCryptUpstream<'a> {
    pub upstream: &'a DnsUpstream,
    pub provider: &'a DnsCryptProvider,
}

impl<'a> TryFrom<&'a DnsUpstream> for DnsCryptUpstream<'a> {
    type Error = ClientError;

    fn try_from(upstream: &'a DnsUpstream) -> Result<Self, Self::Error> {
        match upstream.dnscrypt_provider() {
            Some(provider) => Ok(Self { upstream, provider }),
            None => Err(ClientError::InvalidArgument(format!("{} is not a DNSCrypt upstream", upstream))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_uris() {
        let up = DnsUpstream::parse("udp://185.228.168.168:53").unwrap();
        assert_eq!(up.scheme(), Some("udp"));
        assert_eq!(up.address().host, "185.228.168.168");
        assert_eq!(up.address().port, Some(53));
        assert_eq!(up.code(), "udp://185.228.168.168:53");

        let bare = DnsUpstream::parse("8.8.8.8").unwrap();
        assert_eq!(bare.scheme(), None);
        assert_eq!(bare.address().host_port(DEFAULT_DNS_PORT), "8.8.8.8:53");

        let v6 = DnsUpstream::parse("TCP://[2001:4860:4860::8888]:5353").unwrap();
        assert_eq!(v6.scheme(), Some("tcp"));
        assert_eq!(v6.address().host, "2001:4860:4860::8888");
        assert_eq!(v6.address().host_port(DEFAULT_DNS_PORT), "[2001:4860:4860::8888]:5353");
    }

    #[test]
    fn test_parse_https_uri() {
        let up = DnsUpstream::parse("https://dns.google/dns-query").unwrap().with_code("google");
        assert_eq!(up.scheme(), Some("https"));
        assert_eq!(up.address().path.as_deref(), Some("/dns-query"));
        assert_eq!(up.address().url(), "https://dns.google/dns-query");
        assert_eq!(up.to_string(), "google");
    }

    #[test]
    fn test_parse_dnscrypt_stamp() {
        let uri = "sdns://AQcAAAAAAAAAETUxLjE1LjEwNi4xNzY6NDQzIGcUiAnFqewnNLjh8DUYpcePX07pXc3sDOf2U-vpI55WHjIuZG5zY3J5cHQtY2VydC5hbXMuY2hhcmlzLmNvbQ";
        let up = DnsUpstream::parse(uri).unwrap();
        assert!(up.is_dnscrypt());
        assert_eq!(up.scheme(), Some("sdns"));
        assert_eq!(up.address().host_port(DEFAULT_DNSCRYPT_PORT), "51.15.106.176:443");
        let provider = up.dnscrypt_provider().unwrap();
        assert_eq!(provider.provider_name, "2.dnscrypt-cert.ams.charis.com");
        assert_eq!(provider.provider_public_key.len(), 64);
        assert!(DnsCryptUpstream::try_from(&up).is_ok());
    }

    #[test]
    fn test_non_dnscrypt_view_is_rejected() {
        let up = DnsUpstream::parse("udp://1.1.1.1").unwrap();
        assert!(matches!(DnsCryptUpstream::try_from(&up), Err(ClientError::InvalidArgument(_))));
    }

    #[test]
    fn test_host_containing_marker_is_not_a_stamp() {
        let up = DnsUpstream::parse("https://sdns.example.net/dns-query").unwrap();
        assert_eq!(up.scheme(), Some("https"));
        assert!(!up.is_dnscrypt());
    }

    #[test]
    fn test_rejects_missing_host() {
        assert!(DnsUpstream::parse("udp://:53").is_err());
    }

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        let up = DnsUpstream::parse("127.0.0.1:5300").unwrap();
        let addr = up.address().resolve(DEFAULT_DNS_PORT, Duration::ZERO).await.unwrap();
        assert_eq!(addr, "127.0.0.1:5300".parse().unwrap());
    }

    #[tokio::test]
    async fn test_name_lookup_is_bounded() {
        let up = DnsUpstream::parse("udp://localhost:5300").unwrap();
        let err = up.address().resolve(DEFAULT_DNS_PORT, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(target) if target == "localhost:5300"));
    }
}
