//! Blocks: the unit of consensus, committing to an ordered transaction
//! list via both a direct hash preimage and a Merkle root.

use crate::merkle;
use crate::transaction::UTXOTransaction;
use crate::utxo::{Utxo, UtxoSet};
use serde::{Deserialize, Serialize};
use shared::{Hash256, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64,
    pub previous_hash: Hash256,
    pub hash: Hash256,
    pub nonce: u64,
    pub difficulty: u32,
    pub merkle_root: Hash256,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub validator: Option<String>,
    pub transactions: Vec<UTXOTransaction>,
}

/// The fields a block's hash commits to, in the normative field
/// order: `index, timestamp, transactions, previous_hash, nonce,
/// merkle_root, difficulty, validator`. `hash` itself is excluded.
#[derive(Serialize)]
struct BlockPreimage<'a> {
    index: u64,
    timestamp: i64,
    transactions: &'a [UTXOTransaction],
    previous_hash: Hash256,
    nonce: u64,
    merkle_root: Hash256,
    difficulty: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    validator: Option<&'a str>,
}

impl Block {
    /// Builds an unmined block: `hash` and `nonce` are the caller's
    /// starting point (use `mining::mine` to find a nonce that
    /// satisfies `difficulty`, or call `recompute_hash` directly for
    /// the genesis block, which requires no proof of work).
    #[must_use]
    pub fn new(
        index: u64,
        timestamp: i64,
        previous_hash: Hash256,
        difficulty: u32,
        validator: Option<String>,
        transactions: Vec<UTXOTransaction>,
    ) -> Self {
        let merkle_root = merkle::merkle_root(&transactions);
        let mut block = Self {
            index,
            timestamp,
            previous_hash,
            hash: Hash256::zero(),
            nonce: 0,
            difficulty,
            merkle_root,
            validator,
            transactions,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Recomputes the hash from the current field values; does not
    /// mutate `self.hash`.
    #[must_use]
    pub fn compute_hash(&self) -> Hash256 {
        let preimage = BlockPreimage {
            index: self.index,
            timestamp: self.timestamp,
            transactions: &self.transactions,
            previous_hash: self.previous_hash,
            nonce: self.nonce,
            merkle_root: self.merkle_root,
            difficulty: self.difficulty,
            validator: self.validator.as_deref(),
        };
        let bytes = shared::canonical::to_preimage(&preimage).expect("block preimage always serializes");
        Hash256::sha256(&bytes)
    }

    #[must_use]
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Builds the genesis block: index 0, zero previous hash, no
    /// proof-of-work required regardless of `difficulty`.
    #[must_use]
    pub fn genesis(timestamp: i64, difficulty: u32, transactions: Vec<UTXOTransaction>) -> Self {
        Self::new(0, timestamp, Hash256::zero(), difficulty, None, transactions)
    }

    /// Structural validation that doesn't require the previous block
    /// or the UTXO set: recomputed hash and Merkle root match, and
    /// (for non-genesis blocks) the hash meets `difficulty`.
    ///
    /// Accumulates every violation rather than stopping at the first.
    #[must_use]
    pub fn validate_basic(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.difficulty < 1 {
            errors.push("difficulty must be at least 1".to_string());
        }

        if self.compute_hash() != self.hash {
            errors.push("stored hash does not match recomputed hash".to_string());
        }

        if merkle::merkle_root(&self.transactions) != self.merkle_root {
            errors.push("stored merkle root does not match recomputed root".to_string());
        }

        if !self.is_genesis() && !self.hash.meets_difficulty(self.difficulty) {
            errors.push(format!(
                "hash does not meet difficulty {}: {}",
                self.difficulty, self.hash
            ));
        }

        for tx in &self.transactions {
            if let Err(e) = tx.validate_basic() {
                errors.push(format!("transaction {}: {e}", tx.id));
            }
        }

        errors
    }

    /// Validation against the block that precedes this one:
    /// sequential index and matching previous-hash linkage.
    #[must_use]
    pub fn validate_against_previous(&self, previous: &Self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.index != previous.index + 1 {
            errors.push(format!(
                "index {} is not sequential after previous index {}",
                self.index, previous.index
            ));
        }
        if self.previous_hash != previous.hash {
            errors.push("previous_hash does not match previous block's hash".to_string());
        }
        errors
    }

    /// Applies every transaction in the block to `utxo_set`: spent
    /// inputs are removed, new outputs are added.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if a non-coinbase input references a UTXO
    /// that doesn't exist in `utxo_set`.
    pub fn apply_to_utxo_set(&self, utxo_set: &mut UtxoSet) -> Result<()> {
        for tx in &self.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    utxo_set.mark_spent(&input.previous_tx_id, input.output_index)?;
                }
            }
            for output in &tx.outputs {
                utxo_set.put(Utxo::new(
                    tx.id,
                    output.output_index,
                    output.value,
                    output.locking_script.clone(),
                    self.index,
                    tx.is_coinbase(),
                ));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        shared::canonical::to_preimage(self).map(|b| b.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn exceeds_max_size(&self, max_block_size: usize) -> bool {
        self.size() > max_block_size
    }
}

/// Non-short-circuiting validation result, accumulating every defect
/// a block exhibits rather than stopping at the first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::LockingScript;

    fn coinbase(addr: &str, value: u64) -> UTXOTransaction {
        UTXOTransaction::coinbase(LockingScript::Address(addr.to_string()), value, 1_700_000_000)
    }

    #[test]
    fn genesis_skips_difficulty_check() {
        let genesis = Block::genesis(1_700_000_000_000, 5, vec![coinbase("lora1test", 1_000_000)]);
        assert!(genesis.is_genesis());
        assert_eq!(genesis.previous_hash, Hash256::zero());
        assert!(genesis.validate_basic().is_empty());
    }

    #[test]
    fn hash_is_deterministic_and_sensitive_to_every_field() {
        let block = Block::genesis(1_700_000_000_000, 1, vec![coinbase("lora1a", 10)]);
        assert_eq!(block.compute_hash(), block.hash);

        let mut tampered = block.clone();
        tampered.nonce += 1;
        assert_ne!(tampered.compute_hash(), block.hash);
    }

    #[test]
    fn validate_basic_accumulates_multiple_errors() {
        let mut block = Block::genesis(1_700_000_000_000, 0, vec![coinbase("lora1a", 10)]);
        block.merkle_root = Hash256::sha256(b"wrong");
        block.hash = Hash256::sha256(b"also wrong");

        let errors = block.validate_basic();
        assert!(errors.len() >= 3, "expected difficulty, hash, and merkle errors, got {errors:?}");
    }

    #[test]
    fn sequential_linkage_is_checked_against_previous_block() {
        let genesis = Block::genesis(1_700_000_000_000, 1, vec![coinbase("lora1a", 10)]);
        let next = Block::new(1, 1_700_000_001_000, genesis.hash, 1, None, vec![coinbase("lora1b", 10)]);
        assert!(next.validate_against_previous(&genesis).is_empty());

        let wrong_index = Block::new(5, 1_700_000_001_000, genesis.hash, 1, None, vec![coinbase("lora1b", 10)]);
        assert!(!wrong_index.validate_against_previous(&genesis).is_empty());
    }

    #[test]
    fn apply_to_utxo_set_creates_coinbase_output() {
        let genesis = Block::genesis(1_700_000_000_000, 1, vec![coinbase("lora1test", 1_000_000)]);
        let mut utxo_set = UtxoSet::new();
        genesis.apply_to_utxo_set(&mut utxo_set).unwrap();

        assert_eq!(utxo_set.count(), 1);
        assert_eq!(utxo_set.total_value("lora1test"), 1_000_000);
    }
}
