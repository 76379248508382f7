//! Authenticated encryption of DNSCrypt queries and responses.
//!
//! Both constructions use an ephemeral X25519 key pair per session. The
//! XSalsa20Poly1305 box derives its key with HSalsa20, the XChacha20Poly1305
//! box with HChaCha20, both over a zero nonce.

use super::cert::{Certificate, EsVersion};
use super::padding::{pad, strip, MIN_QUERY_LEN, PADDING_BLOCK};
use super::query::{DnsCryptQuery, HALF_NONCE_LEN, NONCE_LEN, RESOLVER_MAGIC};
use crate::error::{ClientError, DecryptError};
use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::rand_core::RngCore;
use crypto_box::aead::{Aead, OsRng};
use crypto_box::{ChaChaBox, PublicKey, SalsaBox, SecretKey};

/// Poly1305 tag, prepended to every ciphertext.
pub const TAG_LEN: usize = 16;
const RESPONSE_HEADER_LEN: usize = RESOLVER_MAGIC.len() + NONCE_LEN;

enum Cipher {
    Salsa(SalsaBox),
    ChaCha(ChaChaBox),
}

impl Cipher {
    fn seal(&self, nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>, ClientError> {
        let nonce = GenericArray::from_slice(nonce);
        match self {
            Self::Salsa(b) => b.encrypt(nonce, plaintext),
            Self::ChaCha(b) => b.encrypt(nonce, plaintext),
        }
        .map_err(|_| ClientError::Encrypt)
    }

    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        let nonce = GenericArray::from_slice(nonce);
        match self {
            Self::Salsa(b) => b.decrypt(nonce, ciphertext),
            Self::ChaCha(b) => b.decrypt(nonce, ciphertext),
        }
        .map_err(|_| DecryptError::Unverified)
    }
}

/// Encryption context derived from one resolver certificate.
pub struct CryptoSession {
    es_version: EsVersion,
    client_magic: [u8; 8],
    client_pk: [u8; 32],
    cipher: Cipher,
}

impl std::fmt::Debug for CryptoSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoSession")
            .field("es_version", &self.es_version)
            .field("client_magic", &hex::encode(self.client_magic))
            .field("client_pk", &hex::encode(self.client_pk))
            .finish()
    }
}

impl CryptoSession {
    pub fn new(cert: &Certificate) -> Self {
        Self::with_secret_key(cert, SecretKey::generate(&mut OsRng))
    }

    pub fn with_secret_key(cert: &Certificate, secret: SecretKey) -> Self {
        let resolver_pk = PublicKey::from(cert.resolver_pk);
        let client_pk = *secret.public_key().as_bytes();
        let cipher = match cert.es_version {
            EsVersion::XSalsa20Poly1305 => Cipher::Salsa(SalsaBox::new(&resolver_pk, &secret)),
            EsVersion::XChacha20Poly1305 => Cipher::ChaCha(ChaChaBox::new(&resolver_pk, &secret)),
        };
        Self { es_version: cert.es_version, client_magic: cert.client_magic, client_pk, cipher }
    }

    /// Pads and seals a wire message under a fresh random client nonce.
    pub fn encrypt(&self, wire_message: &[u8]) -> Result<DnsCryptQuery, ClientError> {
        let mut client_nonce = [0u8; HALF_NONCE_LEN];
        OsRng.fill_bytes(&mut client_nonce);

        let mut query = DnsCryptQuery {
            client_magic: self.client_magic,
            client_pk: self.client_pk,
            client_nonce,
            encrypted: Vec::new(),
        };
        let padded = pad(wire_message, MIN_QUERY_LEN, PADDING_BLOCK);
        query.encrypted = self.cipher.seal(&query.full_nonce(), &padded)?;
        Ok(query)
    }

    /// Opens `<resolver-magic> <nonce> <encrypted-response>` sent in reply to `query`.
    pub fn decrypt(&self, query: &DnsCryptQuery, response: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if response.len() < RESPONSE_HEADER_LEN + TAG_LEN {
            return Err(DecryptError::TooShort(response.len()));
        }
        if response[..RESOLVER_MAGIC.len()] != RESOLVER_MAGIC {
            return Err(DecryptError::BadMagic);
        }
        let nonce = &response[RESOLVER_MAGIC.len()..RESPONSE_HEADER_LEN];
        if nonce[..HALF_NONCE_LEN] != query.client_nonce {
            return Err(DecryptError::NonceMismatch);
        }

        let padded = self.cipher.open(nonce, &response[RESPONSE_HEADER_LEN..])?;
        strip(&padded).map(<[u8]>::to_vec)
    }
}
