/// Magic prefix of every resolver response.
pub const RESOLVER_MAGIC: [u8; 8] = [0x72, 0x36, 0x66, 0x6e, 0x76, 0x57, 0x6a, 0x38];
pub const NONCE_LEN: usize = 24;
pub const HALF_NONCE_LEN: usize = NONCE_LEN / 2;
pub const PUBLIC_KEY_LEN: usize = 32;

/// `<client-magic> <client-pk> <client-nonce> <encrypted-query>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsCryptQuery {
    pub client_magic: [u8; 8],
    pub client_pk: [u8; PUBLIC_KEY_LEN],
    pub client_nonce: [u8; HALF_NONCE_LEN],
    pub encrypted: Vec<u8>,
}

impl DnsCryptQuery {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + PUBLIC_KEY_LEN + HALF_NONCE_LEN + self.encrypted.len());
        out.extend_from_slice(&self.client_magic);
        out.extend_from_slice(&self.client_pk);
        out.extend_from_slice(&self.client_nonce);
        out.extend_from_slice(&self.encrypted);
        out
    }

    /// Full nonce the query was sealed with: client half followed by zeros.
    pub fn full_nonce(&self) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..HALF_NONCE_LEN].copy_from_slice(&self.client_nonce);
        nonce
    }
}
