//! dnsproxy - forwards DNS questions to plain DNS, DNS-over-HTTPS and DNSCrypt upstreams

pub mod client;
pub mod config;
pub mod dnscrypt;
pub mod error;
pub mod metrics;
pub mod resolver;
pub mod stamp;
pub mod transport;
pub mod types;
pub mod upstream;
pub mod wire;

pub use client::{create_client, default_clients, ClientKind, DnsClient};
pub use error::ResolveError;
pub use resolver::{DnsResource, UpstreamPool};
pub use types::{DnsClass, Message, Rcode, RecordType};
pub use upstream::DnsUpstream;
