//! Error types for every layer of the forwarder.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Malformed DNS message: {0}")]
    MalformedMessage(String),

    #[error("Invalid domain name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Record data too long: {0} bytes")]
    DataTooLong(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StampError {
    #[error("Not a DNS stamp: {0}")]
    NotAStamp(String),

    #[error("Invalid base64 in stamp: {0}")]
    InvalidEncoding(String),

    #[error("Unsupported stamp protocol id {0:#04x}")]
    UnsupportedProtocol(u8),

    #[error("Stamp truncated while reading {0}")]
    Truncated(&'static str),

    #[error("Invalid stamp field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Invalid upstream URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error(transparent)]
    Stamp(#[from] StampError),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection to {addr} failed: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Message of {0} bytes exceeds the UDP limit, TCP required")]
    MessageTooLarge(usize),

    #[error("Corrupt response from {addr}: {reason}")]
    CorruptResponse { addr: String, reason: String },

    #[error("Timed out talking to {0}")]
    Timeout(String),

    #[error("Cannot resolve upstream address {0}")]
    AddressResolution(String),
}

#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("Certificate lookup for {provider} failed: {source}")]
    Lookup {
        provider: String,
        #[source]
        source: Box<ClientError>,
    },

    #[error("Malformed certificate: {0}")]
    Malformed(String),

    #[error("Invalid provider public key: {0}")]
    InvalidProviderKey(String),

    #[error("Certificate with serial {serial} has an invalid signature")]
    InvalidSignature { serial: u32 },

    #[error("Certificate with serial {serial} is not valid before {ts_start}")]
    NotYetValid { serial: u32, ts_start: u32 },

    #[error("No valid certificate published by {0}")]
    NoValidCertificate(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptError {
    #[error("Response too short: {0} bytes")]
    TooShort(usize),

    #[error("Response does not carry the resolver magic")]
    BadMagic,

    #[error("Response nonce does not match the query nonce")]
    NonceMismatch,

    #[error("Response failed authentication")]
    Unverified,

    #[error("Response padding marker missing")]
    InvalidPadding,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Cannot build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error("Encryption failed")]
    Encrypt,
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Upstream pool is empty")]
    EmptyPool,

    #[error("No client supports upstream {0}")]
    UpstreamNotSupported(String),

    #[error("Unable to resolve using upstreams [{}]", .upstreams.join(", "))]
    UnableToResolve {
        upstreams: Vec<String>,
        failures: Vec<String>,
    },
}

pub type WireResult<T> = Result<T, WireError>;
pub type ClientResult<T> = Result<T, ClientError>;
