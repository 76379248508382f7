use super::cert::{select_certificate, Certificate};
use crate::client::{DnsClient, PlainClient};
use crate::error::{CertificateError, ClientError};
use crate::metrics::CERTIFICATE_FETCHES_TOTAL;
use crate::types::{DnsClass, Message, RecordType};
use crate::upstream::{DnsCryptUpstream, DnsUpstream, DEFAULT_DNSCRYPT_PORT};
use moka::sync::Cache;
use std::time::Duration;
use tracing::{debug, info};

const CACHE_CAPACITY: u64 = 1024;

/// Current Unix time as a certificate timestamp.
pub fn unix_now() -> u32 {
    chrono::Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32
}

/// Fetches resolver certificates from the provider's TXT record.
pub struct CertificateStore {
    resolver: PlainClient,
    cache: Option<Cache<String, Certificate>>,
}

impl Default for CertificateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateStore {
    pub fn new() -> Self {
        Self { resolver: PlainClient::new(), cache: None }
    }

    /// Keeps the selected certificate per provider and resolver for up to `ttl`.
    pub fn with_cache(ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(CACHE_CAPACITY).time_to_live(ttl).build();
        Self { resolver: PlainClient::new(), cache: Some(cache) }
    }

    pub async fn get_certificate(&self, upstream: DnsCryptUpstream<'_>, timeout: Duration) -> Result<Certificate, CertificateError> {
        let provider = upstream.provider;
        let server = upstream.upstream.address().host_port(DEFAULT_DNSCRYPT_PORT);
        let cache_key = format!("{}@{}", provider.provider_name, server);

        if let Some(cert) = self.cache.as_ref().and_then(|c| c.get(&cache_key)) {
            if cert.is_valid_at(unix_now()) {
                CERTIFICATE_FETCHES_TOTAL.with_label_values(&["cached"]).inc();
                return Ok(cert);
            }
            if let Some(cache) = &self.cache {
                cache.invalidate(&cache_key);
            }
        }

        let result = self.fetch(upstream, &server, timeout).await;
        CERTIFICATE_FETCHES_TOTAL
            .with_label_values(&[if result.is_ok() { "ok" } else { "error" }])
            .inc();

        let cert = result?;
        info!(
            provider = %provider.provider_name,
            serial = cert.serial,
            es_version = ?cert.es_version,
            "Selected DNSCrypt certificate"
        );
        if let Some(cache) = &self.cache {
            cache.insert(cache_key, cert.clone());
        }
        Ok(cert)
    }

    async fn fetch(&self, upstream: DnsCryptUpstream<'_>, server: &str, timeout: Duration) -> Result<Certificate, CertificateError> {
        let provider = upstream.provider;
        let provider_pk = hex::decode(&provider.provider_public_key)
            .map_err(|e| CertificateError::InvalidProviderKey(e.to_string()))?;
        let lookup_failed = |e: ClientError| CertificateError::Lookup {
            provider: provider.provider_name.clone(),
            source: Box::new(e),
        };

        let cert_server = DnsUpstream::parse(&format!("udp://{}", server))
            .map_err(|e| lookup_failed(ClientError::InvalidArgument(e.to_string())))?;
        let request = Message::query(&provider.provider_name, RecordType::TXT, DnsClass::IN).with_id(rand::random());
        debug!(provider = %provider.provider_name, server = %server, "Fetching DNSCrypt certificates");

        let response = self.resolver.query(&cert_server, &request, timeout).await.map_err(lookup_failed)?;
        select_certificate(response.answers(), &provider_pk, unix_now())
    }
}
