//! Content digests and certificate thumbprints.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 digest of a package's manifest payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute the SHA-256 digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Compute the SHA-256 digest of several buffers fed in order, as if
    /// they were one concatenated buffer.
    pub fn compute_concat<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    /// Parse a 64-character hex string.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not valid hex or not exactly 32 bytes long.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut out)?;
        Ok(Self(out))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Certificate thumbprint: SHA-1 over the DER encoding of an X.509 certificate.
///
/// Used both as the publisher key hint in package metadata and as the entry
/// format of the trusted-publisher list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Thumbprint(Vec<u8>);

impl Thumbprint {
    /// Wrap raw thumbprint bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a hex thumbprint. Colons and whitespace (as printed by most
    /// certificate tools) are ignored, and case does not matter.
    ///
    /// # Errors
    ///
    /// Returns an error if the remaining characters are not valid hex.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let cleaned: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        hex::decode(cleaned).map(Self)
    }

    /// Raw thumbprint bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True if the thumbprint carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Uppercase hex encoding, the form certificate stores display.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl std::fmt::Display for Thumbprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_known_vector() {
        let hash = ContentHash::compute(b"abc");
        assert_eq!(
            hash.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn content_hash_concat_matches_joined() {
        let joined = ContentHash::compute(b"hello world");
        let parts = ContentHash::compute_concat([b"hello ".as_slice(), b"world".as_slice()]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn content_hash_hex_roundtrip() {
        let hash = ContentHash::compute(b"payload");
        assert_eq!(ContentHash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert!(ContentHash::from_hex("abcd").is_err());
    }

    #[test]
    fn thumbprint_accepts_colon_form() {
        let a = Thumbprint::from_hex("48:2C:E4:AD").unwrap();
        let b = Thumbprint::from_hex("482ce4ad").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex(), "482CE4AD");
    }
}
