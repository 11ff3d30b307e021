use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 256-bit hash identifying blocks, transactions, and other content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    /// Creates a zeroed hash (used as the genesis `previous_hash`).
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

    /// Computes the SHA-256 digest of `data`.
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Self(hash)
    }

    /// Hashes `left || right` together (the internal-node step of a
    /// Merkle tree).
    #[must_use]
    pub fn combine(left: &Self, right: &Self) -> Self {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(&left.0);
        data.extend_from_slice(&right.0);
        Self::sha256(&data)
    }

    /// Checks whether the hash's hex representation starts with
    /// `difficulty` zero nibbles, the proof-of-work condition.
    #[must_use]
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.leading_zero_nibbles() >= difficulty
    }

    /// Counts leading zero hex nibbles (4-bit groups).
    #[must_use]
    pub fn leading_zero_nibbles(&self) -> u32 {
        let mut nibbles = 0;
        for &byte in &self.0 {
            if byte == 0 {
                nibbles += 2;
            } else if byte & 0xF0 == 0 {
                nibbles += 1;
                break;
            } else {
                break;
            }
        }
        nibbles
    }

    /// Counts leading zero bits, used by the difficulty adjuster to
    /// compare relative chain work.
    #[must_use]
    pub fn leading_zero_bits(&self) -> u32 {
        let mut zeros = 0;
        for &byte in &self.0 {
            if byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros();
                break;
            }
        }
        zeros
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<&str> for Hash256 {
    type Error = crate::BlockchainError;

    fn try_from(hex_string: &str) -> Result<Self, Self::Error> {
        let bytes = hex::decode(hex_string)
            .map_err(|e| crate::BlockchainError::InvalidConfig(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(crate::BlockchainError::InvalidConfig(format!(
                "expected 32-byte hash, got {} bytes",
                bytes.len()
            )));
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes);
        Ok(Self(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_displays_as_64_zero_chars() {
        let hash = Hash256::zero();
        assert_eq!(
            hash.to_string(),
            "0000000000000000000000000000000000000000000000000000000000000000"[..64]
        );
    }

    #[test]
    fn sha256_is_deterministic_and_nonzero() {
        let a = Hash256::sha256(b"hello world");
        let b = Hash256::sha256(b"hello world");
        assert_eq!(a, b);
        assert_ne!(a, Hash256::zero());
    }

    #[test]
    fn difficulty_is_measured_in_hex_nibbles() {
        // 0x00 0x0a ... -> two leading zero nibbles
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0x00;
        bytes[1] = 0x0a;
        let hash = Hash256::from_bytes(bytes);
        assert_eq!(hash.leading_zero_nibbles(), 3);
        assert!(hash.meets_difficulty(3));
        assert!(!hash.meets_difficulty(4));
    }

    #[test]
    fn round_trips_through_hex_string() {
        let hash = Hash256::sha256(b"round trip");
        let encoded = hash.to_string();
        let decoded = Hash256::try_from(encoded.as_str()).unwrap();
        assert_eq!(hash, decoded);
    }
}
