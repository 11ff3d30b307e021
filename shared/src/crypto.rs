//! Signature algorithms backing the locking/unlocking-script contract.
//!
//! The node supports exactly the two algorithms the specification
//! names: ECDSA over secp256k1 and Ed25519. Both are exposed behind
//! the same `KeyPair`/`PublicKey`/`PrivateKey`/`Signature` shape so
//! callers (script verification, fragment signing) don't need to
//! branch on algorithm except at generation/verification time.

use crate::{BlockchainError, Hash256, Result};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use secp256k1::{ecdsa, Message, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Signature algorithms supported by the locking/unlocking-script
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    Secp256k1,
    Ed25519,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    key_data: Vec<u8>,
    algorithm: SignatureAlgorithm,
}

#[derive(Debug, Clone)]
pub struct PrivateKey {
    key_data: Vec<u8>,
    algorithm: SignatureAlgorithm,
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    data: Vec<u8>,
    public_key: PublicKey,
    algorithm: SignatureAlgorithm,
    timestamp: DateTime<Utc>,
}

impl PublicKey {
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a valid encoding for `algorithm`.
    pub fn from_bytes(bytes: Vec<u8>, algorithm: SignatureAlgorithm) -> Result<Self> {
        match algorithm {
            SignatureAlgorithm::Ed25519 => {
                let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    BlockchainError::InvalidConfig("ed25519 public key must be 32 bytes".into())
                })?;
                VerifyingKey::from_bytes(&arr)
                    .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
            }
            SignatureAlgorithm::Secp256k1 => {
                Secp256k1PublicKey::from_slice(&bytes)
                    .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
            }
        }
        Ok(Self {
            key_data: bytes,
            algorithm,
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn to_ed25519(&self) -> Result<VerifyingKey> {
        let arr: [u8; 32] = self
            .key_data
            .as_slice()
            .try_into()
            .map_err(|_| BlockchainError::CryptographicError("malformed ed25519 key".into()))?;
        VerifyingKey::from_bytes(&arr).map_err(|e| BlockchainError::CryptographicError(e.to_string()))
    }

    fn to_secp256k1(&self) -> Result<Secp256k1PublicKey> {
        Secp256k1PublicKey::from_slice(&self.key_data)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))
    }
}

impl PrivateKey {
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a valid encoding for `algorithm`.
    pub fn from_bytes(bytes: Vec<u8>, algorithm: SignatureAlgorithm) -> Result<Self> {
        match algorithm {
            SignatureAlgorithm::Ed25519 => {
                let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    BlockchainError::InvalidConfig("ed25519 secret key must be 32 bytes".into())
                })?;
                let _ = SigningKey::from_bytes(&arr);
            }
            SignatureAlgorithm::Secp256k1 => {
                SecretKey::from_slice(&bytes)
                    .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
            }
        }
        Ok(Self {
            key_data: bytes,
            algorithm,
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn to_ed25519(&self) -> Result<SigningKey> {
        let arr: [u8; 32] = self
            .key_data
            .as_slice()
            .try_into()
            .map_err(|_| BlockchainError::CryptographicError("malformed ed25519 key".into()))?;
        Ok(SigningKey::from_bytes(&arr))
    }

    fn to_secp256k1(&self) -> Result<SecretKey> {
        SecretKey::from_slice(&self.key_data)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))
    }
}

impl KeyPair {
    /// Generates a new keypair for the given algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate(algorithm: SignatureAlgorithm) -> Result<Self> {
        match algorithm {
            SignatureAlgorithm::Ed25519 => {
                let mut csprng = rand::rngs::OsRng;
                let signing_key = SigningKey::generate(&mut csprng);
                let verifying_key = signing_key.verifying_key();
                Ok(Self {
                    public_key: PublicKey {
                        key_data: verifying_key.to_bytes().to_vec(),
                        algorithm,
                    },
                    private_key: PrivateKey {
                        key_data: signing_key.to_bytes().to_vec(),
                        algorithm,
                    },
                })
            }
            SignatureAlgorithm::Secp256k1 => {
                let secp = Secp256k1::new();
                let mut rng = rand::rngs::OsRng;
                let (secret_key, public_key) = secp.generate_keypair(&mut rng);
                Ok(Self {
                    public_key: PublicKey {
                        key_data: public_key.serialize().to_vec(),
                        algorithm,
                    },
                    private_key: PrivateKey {
                        key_data: secret_key.secret_bytes().to_vec(),
                        algorithm,
                    },
                })
            }
        }
    }

    /// Signs an arbitrary message.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        let data = match self.private_key.algorithm {
            SignatureAlgorithm::Ed25519 => {
                let signing_key = self.private_key.to_ed25519()?;
                signing_key.sign(message).to_bytes().to_vec()
            }
            SignatureAlgorithm::Secp256k1 => {
                let secp = Secp256k1::new();
                let secret_key = self.private_key.to_secp256k1()?;
                let digest = Hash256::sha256(message);
                let msg = Message::from_digest_slice(digest.as_bytes())
                    .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
                secp.sign_ecdsa(&msg, &secret_key).serialize_compact().to_vec()
            }
        };

        Ok(Signature {
            data,
            public_key: self.public_key.clone(),
            algorithm: self.private_key.algorithm,
            timestamp: Utc::now(),
        })
    }
}

impl Signature {
    /// Builds a signature from raw bytes and the claimed public key,
    /// for verifying a signature received over the wire rather than
    /// one produced locally by `KeyPair::sign`.
    #[must_use]
    pub fn from_parts(data: Vec<u8>, public_key: PublicKey, algorithm: SignatureAlgorithm) -> Self {
        Self {
            data,
            public_key,
            algorithm,
            timestamp: Utc::now(),
        }
    }

    /// Verifies the signature against a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature or public key is malformed.
    pub fn verify(&self, message: &[u8]) -> Result<bool> {
        match self.algorithm {
            SignatureAlgorithm::Ed25519 => {
                let verifying_key = self.public_key.to_ed25519()?;
                let arr: [u8; 64] = self.data.as_slice().try_into().map_err(|_| {
                    BlockchainError::CryptographicError(format!(
                        "expected 64-byte ed25519 signature, got {}",
                        self.data.len()
                    ))
                })?;
                let sig = ed25519_dalek::Signature::from_bytes(&arr);
                Ok(verifying_key.verify(message, &sig).is_ok())
            }
            SignatureAlgorithm::Secp256k1 => {
                let secp = Secp256k1::new();
                let public_key = self.public_key.to_secp256k1()?;
                let digest = Hash256::sha256(message);
                let msg = Message::from_digest_slice(digest.as_bytes())
                    .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
                let sig = ecdsa::Signature::from_compact(&self.data)
                    .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
                Ok(secp.verify_ecdsa(&msg, &sig, &public_key).is_ok())
            }
        }
    }

    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl Zeroize for PrivateKey {
    fn zeroize(&mut self) {
        self.key_data.zeroize();
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Signs an arbitrary message hash with the given keypair.
///
/// # Errors
///
/// Returns an error if signing fails.
pub fn sign_message(hash: &Hash256, keypair: &KeyPair) -> Result<Signature> {
    keypair.sign(hash.as_bytes())
}

/// Verifies a signature against a message hash.
///
/// # Errors
///
/// Returns an error if verification fails.
pub fn verify_message(hash: &Hash256, signature: &Signature) -> Result<bool> {
    signature.verify(hash.as_bytes())
}

/// Creates a public key from raw bytes for the given algorithm.
///
/// # Errors
///
/// Returns an error if the bytes are invalid.
pub fn public_key_from_bytes(bytes: &[u8], algorithm: SignatureAlgorithm) -> Result<PublicKey> {
    PublicKey::from_bytes(bytes.to_vec(), algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_round_trip() {
        let keypair = KeyPair::generate(SignatureAlgorithm::Ed25519).unwrap();
        let message = b"lora mesh node";
        let signature = keypair.sign(message).unwrap();
        assert!(signature.verify(message).unwrap());
        assert!(!signature.verify(b"tampered").unwrap());
    }

    #[test]
    fn secp256k1_round_trip() {
        let keypair = KeyPair::generate(SignatureAlgorithm::Secp256k1).unwrap();
        let message = b"unlocking script input";
        let signature = keypair.sign(message).unwrap();
        assert!(signature.verify(message).unwrap());
        assert!(!signature.verify(b"tampered").unwrap());
    }

    #[test]
    fn cross_algorithm_keys_do_not_verify() {
        let ed = KeyPair::generate(SignatureAlgorithm::Ed25519).unwrap();
        let secp = KeyPair::generate(SignatureAlgorithm::Secp256k1).unwrap();
        let message = b"message";
        let sig = ed.sign(message).unwrap();
        // secp key bytes do not even parse as the wrong algorithm's key shape.
        assert_ne!(sig.public_key().as_bytes(), secp.public_key.as_bytes());
    }
}
