//! DNSCrypt resolver certificates.
//!
//! ```text
//! <cert-magic> <es-version> <protocol-minor-version> <signature>
//! <resolver-pk> <client-magic> <serial> <ts-start> <ts-end> <extensions>
//! ```
//!
//! The Ed25519 signature covers everything from `<resolver-pk>` to the end
//! of the record.

use crate::error::CertificateError;
use crate::types::{RecordType, ResourceRecord};
use ring::signature::{Ed25519KeyPair, UnparsedPublicKey, ED25519};
use tracing::warn;

pub const CERT_MAGIC: [u8; 4] = *b"DNSC";
pub const CERT_MIN_LEN: usize = 124;
const SIGNED_OFFSET: usize = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EsVersion {
    XSalsa20Poly1305,
    XChacha20Poly1305,
}

impl EsVersion {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::XSalsa20Poly1305),
            0x0002 => Some(Self::XChacha20Poly1305),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::XSalsa20Poly1305 => 0x0001,
            Self::XChacha20Poly1305 => 0x0002,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub es_version: EsVersion,
    pub minor_version: u16,
    pub signature: [u8; 64],
    pub resolver_pk: [u8; 32],
    pub client_magic: [u8; 8],
    pub serial: u32,
    pub ts_start: u32,
    pub ts_end: u32,
    pub extensions: Vec<u8>,
}

impl Certificate {
    /// An unsigned certificate; call [`Certificate::sign`] before publishing it.
    pub fn new(es_version: EsVersion, resolver_pk: [u8; 32], client_magic: [u8; 8], serial: u32, ts_start: u32, ts_end: u32) -> Self {
        Self {
            es_version,
            minor_version: 0,
            signature: [0u8; 64],
            resolver_pk,
            client_magic,
            serial,
            ts_start,
            ts_end,
            extensions: Vec::new(),
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, CertificateError> {
        if bytes.len() < CERT_MIN_LEN {
            return Err(CertificateError::Malformed(format!("{} bytes, at least {} expected", bytes.len(), CERT_MIN_LEN)));
        }
        if bytes[0..4] != CERT_MAGIC {
            return Err(CertificateError::Malformed("missing DNSC magic".to_string()));
        }
        let es = u16::from_be_bytes([bytes[4], bytes[5]]);
        let es_version = EsVersion::from_u16(es)
            .ok_or_else(|| CertificateError::Malformed(format!("unsupported es-version {:#06x}", es)))?;
        let u32_at = |at: usize| u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

        let mut signature = [0u8; 64];
        signature.copy_from_slice(&bytes[8..72]);
        let mut resolver_pk = [0u8; 32];
        resolver_pk.copy_from_slice(&bytes[72..104]);
        let mut client_magic = [0u8; 8];
        client_magic.copy_from_slice(&bytes[104..112]);

        Ok(Self {
            es_version,
            minor_version: u16::from_be_bytes([bytes[6], bytes[7]]),
            signature,
            resolver_pk,
            client_magic,
            serial: u32_at(112),
            ts_start: u32_at(116),
            ts_end: u32_at(120),
            extensions: bytes[CERT_MIN_LEN..].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CERT_MIN_LEN + self.extensions.len());
        out.extend_from_slice(&CERT_MAGIC);
        out.extend_from_slice(&self.es_version.as_u16().to_be_bytes());
        out.extend_from_slice(&self.minor_version.to_be_bytes());
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.signed_bytes());
        out
    }

    /// The bytes covered by the signature.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CERT_MIN_LEN - SIGNED_OFFSET + self.extensions.len());
        out.extend_from_slice(&self.resolver_pk);
        out.extend_from_slice(&self.client_magic);
        out.extend_from_slice(&self.serial.to_be_bytes());
        out.extend_from_slice(&self.ts_start.to_be_bytes());
        out.extend_from_slice(&self.ts_end.to_be_bytes());
        out.extend_from_slice(&self.extensions);
        out
    }

    pub fn sign(mut self, provider_key: &Ed25519KeyPair) -> Self {
        let signature = provider_key.sign(&self.signed_bytes());
        self.signature.copy_from_slice(signature.as_ref());
        self
    }

    pub fn verify(&self, provider_pk: &[u8]) -> Result<(), CertificateError> {
        UnparsedPublicKey::new(&ED25519, provider_pk)
            .verify(&self.signed_bytes(), &self.signature)
            .map_err(|_| CertificateError::InvalidSignature { serial: self.serial })
    }

    pub fn is_valid_at(&self, now: u32) -> bool {
        self.ts_start <= now && now <= self.ts_end
    }
}

/// Picks the certificate to use out of a TXT answer section.
///
/// Records that are not certificates are skipped. Every certificate must
/// carry a valid signature and must not start in the future; expired ones
/// are dropped. The highest serial wins.
pub fn select_certificate(records: &[ResourceRecord], provider_pk: &[u8], now: u32) -> Result<Certificate, CertificateError> {
    if provider_pk.len() != 32 {
        return Err(CertificateError::InvalidProviderKey(format!("{} bytes, 32 expected", provider_pk.len())));
    }

    let mut best: Option<Certificate> = None;
    for record in records.iter().filter(|r| r.rtype == RecordType::TXT) {
        let Some(data) = record.txt_data() else {
            warn!(name = %record.name, "Skipping TXT record with broken character-strings");
            continue;
        };
        let cert = match Certificate::parse(&data) {
            Ok(cert) => cert,
            Err(e) => {
                warn!(name = %record.name, error = %e, "Skipping TXT record that is not a certificate");
                continue;
            }
        };

        cert.verify(provider_pk)?;
        if cert.ts_start > now {
            return Err(CertificateError::NotYetValid { serial: cert.serial, ts_start: cert.ts_start });
        }
        if cert.ts_end < now {
            warn!(serial = cert.serial, ts_end = cert.ts_end, "Ignoring expired certificate");
            continue;
        }

        if best.as_ref().map_or(true, |b| cert.serial > b.serial) {
            best = Some(cert);
        }
    }

    best.ok_or_else(|| CertificateError::NoValidCertificate(hex::encode(provider_pk)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u32 = 1_700_000_000;

    fn provider_key() -> Ed25519KeyPair {
        Ed25519KeyPair::from_seed_unchecked(&[7u8; 32]).unwrap()
    }

    fn provider_pk() -> Vec<u8> {
        use ring::signature::KeyPair;
        provider_key().public_key().as_ref().to_vec()
    }

    fn cert(serial: u32, ts_start: u32, ts_end: u32) -> Certificate {
        Certificate::new(EsVersion::XSalsa20Poly1305, [serial as u8; 32], *b"magic-00", serial, ts_start, ts_end)
            .sign(&provider_key())
    }

    fn txt(cert: &Certificate) -> ResourceRecord {
        ResourceRecord::txt("2.dnscrypt-cert.example.com", 3600, &cert.to_bytes())
    }

    #[test]
    fn test_parse_roundtrip_with_extensions() {
        let mut original = Certificate::new(EsVersion::XChacha20Poly1305, [9u8; 32], [1, 2, 3, 4, 5, 6, 7, 8], 42, 10, 20);
        original.extensions = vec![0xAA, 0xBB];
        let original = original.sign(&provider_key());

        let bytes = original.to_bytes();
        assert_eq!(bytes.len(), CERT_MIN_LEN + 2);
        assert_eq!(&bytes[0..4], b"DNSC");
        let parsed = Certificate::parse(&bytes).unwrap();
        assert_eq!(parsed, original);
        assert!(parsed.verify(&provider_pk()).is_ok());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(Certificate::parse(b"DNSC"), Err(CertificateError::Malformed(_))));
        let mut bytes = cert(1, 0, u32::MAX).to_bytes();
        bytes[5] = 9;
        assert!(matches!(Certificate::parse(&bytes), Err(CertificateError::Malformed(_))));
    }

    #[test]
    fn test_highest_serial_wins() {
        let records: Vec<_> = [2, 3, 1].iter().map(|s| txt(&cert(*s, NOW - 100, NOW + 100))).collect();
        let selected = select_certificate(&records, &provider_pk(), NOW).unwrap();
        assert_eq!(selected.serial, 3);
    }

    #[test]
    fn test_expired_certificate_is_excluded() {
        let records = vec![txt(&cert(5, NOW - 200, NOW - 100)), txt(&cert(2, NOW - 100, NOW + 100))];
        let selected = select_certificate(&records, &provider_pk(), NOW).unwrap();
        assert_eq!(selected.serial, 2);

        let only_expired = vec![txt(&cert(5, NOW - 200, NOW - 100))];
        assert!(matches!(
            select_certificate(&only_expired, &provider_pk(), NOW),
            Err(CertificateError::NoValidCertificate(_))
        ));
    }

    #[test]
    fn test_future_certificate_fails() {
        let records = vec![txt(&cert(1, NOW - 100, NOW + 100)), txt(&cert(2, NOW + 50, NOW + 100))];
        assert!(matches!(
            select_certificate(&records, &provider_pk(), NOW),
            Err(CertificateError::NotYetValid { serial: 2, .. })
        ));
    }

    #[test]
    fn test_bad_signature_fails() {
        let mut forged = cert(4, NOW - 100, NOW + 100);
        forged.serial = 9;
        let records = vec![txt(&cert(1, NOW - 100, NOW + 100)), txt(&forged)];
        assert!(matches!(
            select_certificate(&records, &provider_pk(), NOW),
            Err(CertificateError::InvalidSignature { serial: 9 })
        ));
    }

    #[test]
    fn test_non_certificate_txt_is_skipped() {
        let records = vec![
            ResourceRecord::txt("2.dnscrypt-cert.example.com", 60, b"v=spf1 -all"),
            txt(&cert(1, NOW - 100, NOW + 100)),
        ];
        assert_eq!(select_certificate(&records, &provider_pk(), NOW).unwrap().serial, 1);
    }

    #[test]
    fn test_provider_key_length_checked() {
        assert!(matches!(
            select_certificate(&[], &[1, 2, 3], NOW),
            Err(CertificateError::InvalidProviderKey(_))
        ));
    }
}
