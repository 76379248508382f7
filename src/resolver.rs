//! Upstream pool: walks the configured upstreams in priority order and, for
//! each, the clients able to reach it.

use crate::client::DnsClient;
use crate::error::ResolveError;
use crate::metrics::{self, RESOLUTIONS_TOTAL};
use crate::types::{Message, Rcode};
use crate::upstream::DnsUpstream;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(15);

/// A request, its response and what produced it.
#[derive(Clone)]
pub struct DnsResource {
    pub request: Message,
    pub response: Message,
    pub upstream: Arc<DnsUpstream>,
    pub client: Arc<dyn DnsClient>,
}

impl fmt::Debug for DnsResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsResource")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("upstream", &self.upstream.code())
            .field("client", &self.client.name())
            .finish()
    }
}

impl DnsResource {
    /// `Cache-Control: max-age` for the response: the smallest answer TTL.
    pub fn cache_max_age(&self) -> Option<u32> {
        self.response.answers().iter().map(|r| r.ttl).min()
    }
}

pub struct UpstreamPool {
    upstreams: Vec<Arc<DnsUpstream>>,
    clients: Vec<Arc<dyn DnsClient>>,
    client_timeout: Duration,
    resolve_timeout: Duration,
}

impl UpstreamPool {
    pub fn new(upstreams: Vec<DnsUpstream>, clients: Vec<Arc<dyn DnsClient>>) -> Self {
        Self {
            upstreams: upstreams.into_iter().map(Arc::new).collect(),
            clients,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    /// Caps a single client exchange.
    pub fn with_client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = timeout;
        self
    }

    /// Caps the whole resolution, every fallback included.
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn upstreams(&self) -> &[Arc<DnsUpstream>] {
        &self.upstreams
    }

    pub fn clients(&self) -> &[Arc<dyn DnsClient>] {
        &self.clients
    }

    pub async fn resolve(&self, request: &Message) -> Result<DnsResource, ResolveError> {
        let result = self.try_resolve(request).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(ResolveError::EmptyPool) | Err(ResolveError::UpstreamNotSupported(_)) => "misconfigured",
            Err(_) => "failure",
        };
        RESOLUTIONS_TOTAL.with_label_values(&[outcome]).inc();
        result
    }

    async fn try_resolve(&self, request: &Message) -> Result<DnsResource, ResolveError> {
        if self.upstreams.is_empty() {
            return Err(ResolveError::EmptyPool);
        }
        let request = if request.id() == 0 { request.with_id(rand::random()) } else { request.clone() };
        let deadline = Instant::now() + self.resolve_timeout;
        let mut failures = Vec::new();
        let mut attempted = Vec::new();

        'upstreams: for upstream in &self.upstreams {
            let supporting: Vec<&Arc<dyn DnsClient>> = self.clients.iter().filter(|c| c.supports(upstream)).collect();
            if supporting.is_empty() {
                tracing::error!(upstream = %upstream, uri = %upstream.uri(), "No client supports upstream");
                return Err(ResolveError::UpstreamNotSupported(upstream.to_string()));
            }

            for client in supporting {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    failures.push(format!("{} via {}: resolution deadline exceeded", upstream, client.name()));
                    break 'upstreams;
                }

                if attempted.last() != Some(&upstream.to_string()) {
                    attempted.push(upstream.to_string());
                }
                debug!(upstream = %upstream, client = client.name(), qname = %request.qname(), "Trying upstream");
                let started = Instant::now();
                match client.query(upstream, &request, left.min(self.client_timeout)).await {
                    Ok(response) => {
                        let elapsed = started.elapsed().as_secs_f64();
                        metrics::observe_exchange(client.name(), upstream.code(), response.rcode(), elapsed);
                        if response.rcode() == Rcode::NxDomain {
                            debug!(upstream = %upstream, qname = %request.qname(), "NXDOMAIN, moving to next upstream");
                            failures.push(format!("{} via {}: NXDOMAIN", upstream, client.name()));
                            continue 'upstreams;
                        }
                        info!(
                            upstream = %upstream,
                            client = client.name(),
                            qname = %request.qname(),
                            rcode = response.rcode().as_str(),
                            answers = response.an_count(),
                            "Resolved"
                        );
                        return Ok(DnsResource {
                            request,
                            response,
                            upstream: upstream.clone(),
                            client: client.clone(),
                        });
                    }
                    Err(e) => {
                        warn!(upstream = %upstream, client = client.name(), error = %e, "Client failed");
                        metrics::record_failure(client.name(), upstream.code());
                        failures.push(format!("{} via {}: {}", upstream, client.name(), e));
                    }
                }
            }
        }

        Err(ResolveError::UnableToResolve {
            upstreams: attempted,
            failures,
        })
    }
}
