//! DNSCrypt v2: certificates, padding and the encrypted query envelope.

pub mod cert;
pub mod crypto;
pub mod padding;
pub mod query;
pub mod store;

pub use cert::{select_certificate, Certificate, EsVersion};
pub use crypto::CryptoSession;
pub use query::{DnsCryptQuery, RESOLVER_MAGIC};
pub use store::CertificateStore;
