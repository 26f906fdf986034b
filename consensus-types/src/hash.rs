use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;

use crate::error::ParseHashError;

/// A 32-byte identifier: block `header_hash`es and coin `coin_id`s are both
/// `Hash256` values, computed by hashing together their constituent fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    /// The all-zero hash, used as the placeholder previous-hash of a genesis
    /// challenge comparison point.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hashes the concatenation of `parts` with SHA3-256. Used to derive
    /// `coin_id = H(parent || puzzle_hash || amount_be_minimal)` and similar
    /// composite identifiers.
    #[must_use]
    pub fn hash_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha3_256::new();
        for part in parts {
            hasher.update(part);
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&hasher.finalize());
        Self(hash)
    }

    #[must_use]
    pub fn hash(data: &[u8]) -> Self {
        Self::hash_parts(&[data])
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<&str> for Hash256 {
    type Error = ParseHashError;

    fn try_from(hex_string: &str) -> Result<Self, Self::Error> {
        let bytes = hex::decode(hex_string).map_err(|_| ParseHashError::InvalidHex)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ParseHashError::WrongLength)?;
        Ok(Self(array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_displays_as_64_zero_hex_chars() {
        let hash = Hash256::zero();
        assert_eq!(hash.to_string(), "0".repeat(64));
    }

    #[test]
    fn hashing_is_deterministic_and_sensitive_to_input() {
        let a = Hash256::hash(b"hello world");
        let b = Hash256::hash(b"hello world");
        let c = Hash256::hash(b"hello world!");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Hash256::zero());
    }

    #[test]
    fn hash_parts_matches_manual_concatenation() {
        let parts = Hash256::hash_parts(&[b"ab", b"cd"]);
        let concatenated = Hash256::hash(b"abcd");
        assert_eq!(parts, concatenated);
    }

    #[test]
    fn try_from_roundtrips_through_display() {
        let hash = Hash256::hash(b"roundtrip");
        let hex = hash.to_string();
        let parsed = Hash256::try_from(hex.as_str()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn try_from_rejects_wrong_length() {
        assert!(matches!(
            Hash256::try_from("abcd"),
            Err(ParseHashError::WrongLength)
        ));
    }

    #[test]
    fn try_from_rejects_invalid_hex() {
        assert!(matches!(
            Hash256::try_from("not-hex-at-all-zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz"),
            Err(ParseHashError::InvalidHex)
        ));
    }
}
