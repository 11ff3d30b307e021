//! Merkle tree construction, inclusion proofs, and a compressed wire
//! encoding of those proofs.

use crate::transaction::UTXOTransaction;
use serde::{Deserialize, Serialize};
use shared::{BlockchainError, Hash256, Result};

/// Which side of the current hash a proof step's sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling_hash: Hash256,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub transaction_id: Hash256,
    pub transaction_hash: Hash256,
    pub merkle_root: Hash256,
    pub proof: Vec<ProofStep>,
    pub leaf_index: usize,
}

/// A proof with directions packed into a bit string and sibling
/// hashes concatenated, halving on-wire size relative to `MerkleProof`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedMerkleProof {
    pub transaction_id: Hash256,
    pub transaction_hash: Hash256,
    pub merkle_root: Hash256,
    pub leaf_index: usize,
    /// `0` = left, `1` = right, one bit per proof step, hex-packed.
    pub directions_hex: String,
    /// Concatenated 64-hex-digit sibling hashes, one per proof step.
    pub siblings_hex: String,
    pub step_count: usize,
}

fn combine(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(left.as_bytes());
    data.extend_from_slice(right.as_bytes());
    Hash256::sha256(&data)
}

/// The Merkle root of a transaction list: SHA-256 of the empty string
/// when there are no transactions, the lone leaf hash for a single
/// transaction, and the standard binary tree (duplicating the last
/// node at odd levels) otherwise.
#[must_use]
pub fn merkle_root(transactions: &[UTXOTransaction]) -> Hash256 {
    if transactions.is_empty() {
        return Hash256::sha256(b"");
    }

    let mut level: Vec<Hash256> = transactions.iter().map(|tx| tx.id).collect();
    if level.len() == 1 {
        return level[0];
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = if pair.len() == 2 { &pair[1] } else { &pair[0] };
            next.push(combine(&pair[0], right));
        }
        level = next;
    }
    level[0]
}

/// Builds the inclusion proof for the transaction at `leaf_index`.
///
/// # Errors
///
/// Returns `InvalidProof` if `leaf_index` is out of range.
pub fn generate_proof(transactions: &[UTXOTransaction], leaf_index: usize) -> Result<MerkleProof> {
    if leaf_index >= transactions.len() {
        return Err(BlockchainError::InvalidProof(format!(
            "leaf index {leaf_index} out of range for {} transactions",
            transactions.len()
        )));
    }

    let transaction_id = transactions[leaf_index].id;
    let transaction_hash = transaction_id;
    let root = merkle_root(transactions);

    let mut level: Vec<Hash256> = transactions.iter().map(|tx| tx.id).collect();
    let mut index = leaf_index;
    let mut steps = Vec::new();

    while level.len() > 1 {
        let pair_index = index ^ 1;
        let sibling = if pair_index < level.len() {
            level[pair_index]
        } else {
            level[index]
        };
        let direction = if index % 2 == 0 { Direction::Right } else { Direction::Left };
        steps.push(ProofStep {
            sibling_hash: sibling,
            direction,
        });

        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = if pair.len() == 2 { &pair[1] } else { &pair[0] };
            next.push(combine(&pair[0], right));
        }
        level = next;
        index /= 2;
    }

    Ok(MerkleProof {
        transaction_id,
        transaction_hash,
        merkle_root: root,
        proof: steps,
        leaf_index,
    })
}

/// Recomputes the root bottom-up from `proof.transaction_hash` and
/// checks it against `proof.merkle_root`.
#[must_use]
pub fn verify_proof(proof: &MerkleProof) -> bool {
    let mut current = proof.transaction_hash;
    for step in &proof.proof {
        current = match step.direction {
            Direction::Left => combine(&step.sibling_hash, &current),
            Direction::Right => combine(&current, &step.sibling_hash),
        };
    }
    current == proof.merkle_root
}

/// Packs a proof's directions into a hex-encoded bit string and
/// concatenates its sibling hashes.
#[must_use]
pub fn compress(proof: &MerkleProof) -> CompressedMerkleProof {
    let mut bits = String::new();
    let mut siblings_hex = String::new();
    for step in &proof.proof {
        bits.push(if step.direction == Direction::Right { '1' } else { '0' });
        siblings_hex.push_str(&step.sibling_hash.to_string());
    }

    let mut directions_hex = String::with_capacity(bits.len().div_ceil(4));
    for chunk in bits.as_bytes().chunks(4) {
        let mut nibble = 0u8;
        for (i, &bit) in chunk.iter().enumerate() {
            if bit == b'1' {
                nibble |= 1 << (3 - i);
            }
        }
        directions_hex.push(char::from_digit(u32::from(nibble), 16).unwrap_or('0'));
    }

    CompressedMerkleProof {
        transaction_id: proof.transaction_id,
        transaction_hash: proof.transaction_hash,
        merkle_root: proof.merkle_root,
        leaf_index: proof.leaf_index,
        directions_hex,
        siblings_hex,
        step_count: proof.proof.len(),
    }
}

/// Reconstructs a `MerkleProof` from its compressed form. Trailing
/// padding bits beyond `step_count` (an artifact of hex-nibble
/// packing) are ignored rather than treated as an error.
///
/// # Errors
///
/// Returns `InvalidProof` if `siblings_hex` doesn't decode into
/// exactly `step_count` 64-hex-digit hashes.
pub fn decompress(compressed: &CompressedMerkleProof) -> Result<MerkleProof> {
    if compressed.siblings_hex.len() != compressed.step_count * 64 {
        return Err(BlockchainError::InvalidProof(
            "sibling hash data does not match step count".into(),
        ));
    }

    let mut bits = String::new();
    for ch in compressed.directions_hex.chars() {
        let nibble = ch.to_digit(16).ok_or_else(|| {
            BlockchainError::InvalidProof("non-hex character in packed directions".into())
        })?;
        bits.push_str(&format!("{nibble:04b}"));
    }
    // Clamp to the true proof length: packing always rounds up to a
    // whole nibble, so up to 3 padding bits may trail.
    let bits = &bits[..compressed.step_count.min(bits.len())];

    let mut steps = Vec::with_capacity(compressed.step_count);
    for (i, bit) in bits.chars().enumerate() {
        let start = i * 64;
        let hash_hex = &compressed.siblings_hex[start..start + 64];
        let sibling_hash = Hash256::try_from(hash_hex)
            .map_err(|_| BlockchainError::InvalidProof("malformed sibling hash hex".into()))?;
        let direction = if bit == '1' { Direction::Right } else { Direction::Left };
        steps.push(ProofStep { sibling_hash, direction });
    }

    Ok(MerkleProof {
        transaction_id: compressed.transaction_id,
        transaction_hash: compressed.transaction_hash,
        merkle_root: compressed.merkle_root,
        proof: steps,
        leaf_index: compressed.leaf_index,
    })
}
