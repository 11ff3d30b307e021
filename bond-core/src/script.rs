//! Fixed locking/unlocking-script placeholder.
//!
//! This is deliberately not a scripting VM: every output is either a
//! genesis allocation addressed directly by a human-readable address
//! string, or a pay-to-public-key output unlocked by a single
//! signature under the configured algorithm. There is no opcode
//! interpreter, no control flow, and no multisig.

use serde::{Deserialize, Serialize};
use shared::{Hash256, PublicKey, Signature, SignatureAlgorithm};

/// Condition an output imposes on whoever wants to spend it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockingScript {
    /// A genesis-only allocation addressed directly by its address
    /// string; never validated by signature, only ever produced by
    /// `GenesisConfig::initial_allocations`.
    Address(String),
    /// Pay-to-public-key: spendable only by a valid signature from the
    /// holder of `pubkey` under `algorithm`.
    Pubkey {
        algorithm: SignatureAlgorithm,
        pubkey: Vec<u8>,
    },
}

impl LockingScript {
    /// Derives the human-readable address this script pays to.
    #[must_use]
    pub fn address(&self) -> String {
        match self {
            Self::Address(addr) => addr.clone(),
            Self::Pubkey { pubkey, .. } => derive_address(pubkey),
        }
    }
}

/// Proof that the referenced UTXO may be spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnlockingScript {
    /// No proof required (genesis allocations and coinbase inputs).
    None,
    /// Raw signature bytes over the transaction's signing hash.
    Signature(Vec<u8>),
}

/// Derives a `lora1`-prefixed address from a raw public key, the
/// first 20 bytes of its SHA-256 digest hex-encoded.
#[must_use]
pub fn derive_address(pubkey: &[u8]) -> String {
    let digest = Hash256::sha256(pubkey);
    format!("lora1{}", hex::encode(&digest.as_bytes()[..20]))
}

/// Verifies that `unlocking` satisfies `locking` over `signing_hash`.
#[must_use]
pub fn verify_unlock(locking: &LockingScript, unlocking: &UnlockingScript, signing_hash: &Hash256) -> bool {
    match (locking, unlocking) {
        (LockingScript::Address(_), _) => false,
        (LockingScript::Pubkey { algorithm, pubkey }, UnlockingScript::Signature(sig_bytes)) => {
            let Ok(public_key) = PublicKey::from_bytes(pubkey.clone(), *algorithm) else {
                return false;
            };
            let signature = Signature::from_parts(sig_bytes.clone(), public_key, *algorithm);
            signature.verify(signing_hash.as_bytes()).unwrap_or(false)
        }
        (LockingScript::Pubkey { .. }, UnlockingScript::None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::KeyPair;

    #[test]
    fn address_script_never_unlocks_by_signature() {
        let locking = LockingScript::Address("lora1test".into());
        let unlocking = UnlockingScript::Signature(vec![1, 2, 3]);
        assert!(!verify_unlock(&locking, &unlocking, &Hash256::zero()));
    }

    #[test]
    fn pubkey_script_unlocks_with_matching_signature() {
        let keypair = KeyPair::generate(SignatureAlgorithm::Ed25519).unwrap();
        let hash = Hash256::sha256(b"signing hash");
        let sig = keypair.sign(hash.as_bytes()).unwrap();

        let locking = LockingScript::Pubkey {
            algorithm: SignatureAlgorithm::Ed25519,
            pubkey: keypair.public_key.as_bytes().to_vec(),
        };
        let unlocking = UnlockingScript::Signature(sig.as_bytes().to_vec());

        assert!(verify_unlock(&locking, &unlocking, &hash));
    }

    #[test]
    fn pubkey_script_rejects_wrong_hash() {
        let keypair = KeyPair::generate(SignatureAlgorithm::Secp256k1).unwrap();
        let hash = Hash256::sha256(b"real hash");
        let sig = keypair.sign(hash.as_bytes()).unwrap();

        let locking = LockingScript::Pubkey {
            algorithm: SignatureAlgorithm::Secp256k1,
            pubkey: keypair.public_key.as_bytes().to_vec(),
        };
        let unlocking = UnlockingScript::Signature(sig.as_bytes().to_vec());

        assert!(!verify_unlock(&locking, &unlocking, &Hash256::sha256(b"other hash")));
    }
}
