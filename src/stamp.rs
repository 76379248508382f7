//! DNS Stamps (`sdns://`) decoding.
//!
//! ```text
//! plain:    0x00 props LP(addr)
//! dnscrypt: 0x01 props LP(addr) LP(pk) LP(providerName)
//! doh:      0x02 props LP(addr) VLP(hash1, ...) LP(hostname) LP(path) [VLP(bootstrap_ip, ...)]
//! dot:      0x03 props LP(addr) VLP(hash1, ...) LP(hostname) [VLP(bootstrap_ip, ...)]
//! ```
//!
//! `props` is a little-endian 64-bit bitfield. `VLP` items carry their
//! length in the low 7 bits; the high bit is set on every item but the last.

use crate::error::StampError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

pub const STAMP_SCHEME: &str = "sdns://";

/// True iff `uri` carries the `sdns` marker, in any case.
pub fn is_stamp(uri: &str) -> bool {
    uri.to_ascii_lowercase().contains("sdns")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampProtocol { Plain, DnsCrypt, DoH, DoT }

impl StampProtocol {
    pub fn id(&self) -> u8 {
        match self { Self::Plain => 0x00, Self::DnsCrypt => 0x01, Self::DoH => 0x02, Self::DoT => 0x03 }
    }

    fn from_id(id: u8) -> Result<Self, StampError> {
        match id {
            0x00 => Ok(Self::Plain),
            0x01 => Ok(Self::DnsCrypt),
            0x02 => Ok(Self::DoH),
            0x03 => Ok(Self::DoT),
            other => Err(StampError::UnsupportedProtocol(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StampProperties(pub u64);

impl StampProperties {
    pub fn dnssec(&self) -> bool { self.0 & 1 != 0 }
    pub fn no_logs(&self) -> bool { self.0 & (1 << 1) != 0 }
    pub fn no_filter(&self) -> bool { self.0 & (1 << 2) != 0 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StampDetails {
    Plain,
    DnsCrypt { public_key: Vec<u8>, provider_name: String },
    DoH { hashes: Vec<Vec<u8>>, hostname: String, path: String, bootstrap: Vec<String> },
    DoT { hashes: Vec<Vec<u8>>, hostname: String, bootstrap: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStamp {
    pub protocol: StampProtocol,
    pub props: StampProperties,
    /// Host part of the address, IPv6 brackets stripped. May be empty for DoH/DoT.
    pub host: String,
    pub port: Option<u16>,
    pub details: StampDetails,
}

impl ServerStamp {
    pub fn decode(uri: &str) -> Result<Self, StampError> {
        let trimmed = uri.trim();
        let encoded = match trimmed.get(..STAMP_SCHEME.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(STAMP_SCHEME) => &trimmed[STAMP_SCHEME.len()..],
            _ => return Err(StampError::NotAStamp(uri.to_string())),
        };
        let bin = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| StampError::InvalidEncoding(e.to_string()))?;

        let mut cursor = Cursor { buf: &bin, pos: 0 };
        let protocol = StampProtocol::from_id(cursor.read_u8("protocol id")?)?;
        let props = StampProperties(u64::from_le_bytes(cursor.read_array::<8>("properties")?));
        let address = cursor.read_lp_string("address")?;
        let (host, port) = split_host_port(&address)
            .map_err(|reason| StampError::InvalidField { field: "address", reason })?;

        let details = match protocol {
            StampProtocol::Plain => StampDetails::Plain,
            StampProtocol::DnsCrypt => {
                let public_key = cursor.read_lp("public key")?.to_vec();
                if public_key.len() != 32 {
                    return Err(StampError::InvalidField {
                        field: "public key",
                        reason: format!("expected 32 bytes, got {}", public_key.len()),
                    });
                }
                let provider_name = cursor.read_lp_string("provider name")?;
                if provider_name.is_empty() {
                    return Err(StampError::InvalidField { field: "provider name", reason: "empty".to_string() });
                }
                StampDetails::DnsCrypt { public_key, provider_name }
            }
            StampProtocol::DoH => {
                let hashes = cursor.read_vlp("hashes")?;
                let hostname = cursor.read_lp_string("hostname")?;
                let path = cursor.read_lp_string("path")?;
                let bootstrap = cursor.read_bootstrap()?;
                StampDetails::DoH { hashes, hostname, path, bootstrap }
            }
            StampProtocol::DoT => {
                let hashes = cursor.read_vlp("hashes")?;
                let hostname = cursor.read_lp_string("hostname")?;
                let bootstrap = cursor.read_bootstrap()?;
                StampDetails::DoT { hashes, hostname, bootstrap }
            }
        };

        Ok(Self { protocol, props, host, port, details })
    }

    /// `host:port`, bracketing IPv6 hosts; just the host when no port was given.
    pub fn address(&self) -> String {
        join_host_port(&self.host, self.port)
    }

    pub fn provider_name(&self) -> Option<&str> {
        match &self.details {
            StampDetails::DnsCrypt { provider_name, .. } => Some(provider_name),
            _ => None,
        }
    }
}

pub fn join_host_port(host: &str, port: Option<u16>) -> String {
    match port {
        Some(port) if host.contains(':') => format!("[{}]:{}", host, port),
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Splits `host[:port]`, `[v6][:port]` or a bare IPv6 literal.
pub fn split_host_port(address: &str) -> Result<(String, Option<u16>), String> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(|| format!("unterminated IPv6 literal '{}'", address))?;
        let port = match after {
            "" => None,
            other => {
                let digits = other.strip_prefix(':').ok_or_else(|| format!("unexpected '{}' after IPv6 literal", other))?;
                Some(digits.parse::<u16>().map_err(|_| format!("invalid port '{}'", digits))?)
            }
        };
        return Ok((host.to_string(), port));
    }
    match address.matches(':').count() {
        0 => Ok((address.to_string(), None)),
        1 => {
            let (host, port) = address.split_once(':').unwrap_or((address, ""));
            let port = port.parse::<u16>().map_err(|_| format!("invalid port '{}'", port))?;
            Ok((host.to_string(), Some(port)))
        }
        _ => Ok((address.to_string(), None)),
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8, StampError> {
        let b = *self.buf.get(self.pos).ok_or(StampError::Truncated(field))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], StampError> {
        let bytes = self.buf.get(self.pos..self.pos + len).ok_or(StampError::Truncated(field))?;
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], StampError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N, field)?);
        Ok(out)
    }

    fn read_lp(&mut self, field: &'static str) -> Result<&'a [u8], StampError> {
        let len = self.read_u8(field)? as usize;
        self.read_bytes(len, field)
    }

    fn read_lp_string(&mut self, field: &'static str) -> Result<String, StampError> {
        let bytes = self.read_lp(field)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StampError::InvalidField { field, reason: "not UTF-8".to_string() })
    }

    fn read_vlp(&mut self, field: &'static str) -> Result<Vec<Vec<u8>>, StampError> {
        let mut items = Vec::new();
        loop {
            let len_byte = self.read_u8(field)?;
            let item = self.read_bytes((len_byte & 0x7F) as usize, field)?;
            if !item.is_empty() {
                items.push(item.to_vec());
            }
            if len_byte & 0x80 == 0 {
                return Ok(items);
            }
        }
    }

    fn read_bootstrap(&mut self) -> Result<Vec<String>, StampError> {
        if self.remaining() == 0 {
            return Ok(Vec::new());
        }
        self.read_vlp("bootstrap addresses")?
            .into_iter()
            .map(|raw| String::from_utf8(raw).map_err(|_| StampError::InvalidField {
                field: "bootstrap addresses",
                reason: "not UTF-8".to_string(),
            }))
            .collect()
    }
}
