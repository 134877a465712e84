//! Content-addressed hashing for artifacts.
//!
//! Every artifact byte blob is identified by its SHA-256 content hash, formatted as
//! `sha256:<64 hex characters>` per the artifact store's checksum convention.

use flowforge_core::error::{ForgeError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        Self(result.into())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let hex_str = s.strip_prefix("sha256:").unwrap_or(s);

        if hex_str.len() != 64 {
            return Err(ForgeError::Validation(format!(
                "expected 64 hex characters, got {}",
                hex_str.len()
            )));
        }

        let bytes = hex::decode(hex_str)
            .map_err(|e| ForgeError::Validation(format!("invalid hex: {}", e)))?;

        let array: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            ForgeError::Validation(format!("hash must be exactly 32 bytes, got {}", v.len()))
        })?;

        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn verify(&self, data: &[u8]) -> bool {
        Self::from_bytes(data) == *self
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self)
    }
}

impl std::str::FromStr for ContentHash {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_matches_known_sha256() {
        let hash = ContentHash::from_bytes(b"hello world");
        assert_eq!(
            hash.to_string(),
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn from_hex_round_trips_with_and_without_prefix() {
        let hex = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        assert_eq!(ContentHash::from_hex(hex).unwrap().to_hex(), hex);
        assert_eq!(
            ContentHash::from_hex(&format!("sha256:{hex}")).unwrap().to_hex(),
            hex
        );
    }

    #[test]
    fn verify_detects_mismatch() {
        let hash = ContentHash::from_bytes(b"hello world");
        assert!(hash.verify(b"hello world"));
        assert!(!hash.verify(b"hello worlD"));
    }

    #[test]
    fn invalid_hex_is_rejected() {
        assert!(ContentHash::from_hex("not-valid-hex").is_err());
        assert!(ContentHash::from_hex("sha256:abc").is_err());
    }
}
