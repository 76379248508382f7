//! Upstream list file: a JSON array of URIs or `{ "uri": ..., "code": ... }` objects.

use crate::upstream::DnsUpstream;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_UPSTREAMS: [&str; 2] = ["udp://1.1.1.1:53", "https://cloudflare-dns.com/dns-query"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpstreamEntry {
    Uri(String),
    Described {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl UpstreamEntry {
    pub fn uri(&self) -> &str {
        match self {
            Self::Uri(uri) | Self::Described { uri, .. } => uri,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Described { code: Some(code), .. } => code,
            _ => self.uri(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpstreamConfig {
    pub upstreams: Vec<UpstreamEntry>,
}

impl UpstreamConfig {
    pub fn from_uris<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { upstreams: uris.into_iter().map(|u| UpstreamEntry::Uri(u.into())).collect() }
    }

    pub fn defaults() -> Self {
        Self::from_uris(DEFAULT_UPSTREAMS)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read upstream file '{}'", path.display()))?;
        let config = Self::parse(&content).with_context(|| format!("Invalid upstream file '{}'", path.display()))?;
        info!(
            path = %path.display(),
            sha256 = %fingerprint(&content),
            upstreams = config.upstreams.len(),
            "Loaded upstream configuration"
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write upstream file '{}'", path.display()))
    }

    /// Builds upstreams in file order; the first invalid entry fails the whole list.
    pub fn into_upstreams(self) -> Result<Vec<DnsUpstream>> {
        self.upstreams
            .iter()
            .map(|entry| {
                DnsUpstream::parse(entry.uri())
                    .map(|u| u.with_code(entry.code()))
                    .with_context(|| format!("Invalid upstream '{}'", entry.uri()))
            })
            .collect()
    }
}

/// Hex SHA-256 of the configuration text.
pub fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Parses `500ms`, `5s` or `1m`; a bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(ms.parse()?))
    } else if let Some(sec) = s.strip_suffix('s') {
        Ok(Duration::from_secs(sec.parse()?))
    } else if let Some(min) = s.strip_suffix('m') {
        Ok(Duration::from_secs(min.parse::<u64>()? * 60))
    } else {
        Ok(Duration::from_secs(s.parse()?))
    }
}
