//! Whole-block validation: combines structural checks, chain linkage,
//! and per-transaction UTXO checks into one non-short-circuiting result.

use crate::block::{Block, ValidationResult};
use crate::utxo::UtxoSet;

/// Validates `block` against its predecessor (if any, `None` only
/// for genesis) and the UTXO set it would be applied to. Every
/// detectable defect is reported; the function never stops at the
/// first violation.
#[must_use]
pub fn validate_block(block: &Block, previous: Option<&Block>, utxo_set: &UtxoSet) -> ValidationResult {
    let mut errors = block.validate_basic();

    match previous {
        Some(previous) => errors.extend(block.validate_against_previous(previous)),
        None => {
            if !block.is_genesis() {
                errors.push("non-genesis block has no previous block to validate against".to_string());
            }
        }
    }

    for tx in &block.transactions {
        if tx.is_coinbase() {
            continue;
        }
        if let Err(e) = tx.validate_against_utxo_set(utxo_set) {
            errors.push(format!("transaction {} failed UTXO validation: {e}", tx.id));
        }
    }

    ValidationResult::from_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::LockingScript;
    use crate::transaction::UTXOTransaction;
    use shared::Hash256;

    #[test]
    fn valid_genesis_block_has_no_errors() {
        let tx = UTXOTransaction::coinbase(LockingScript::Address("lora1a".into()), 1000, 1_700_000_000_000);
        let block = Block::genesis(1_700_000_000_000, 1, vec![tx]);
        let result = validate_block(&block, None, &UtxoSet::new());
        assert!(result.valid, "unexpected errors: {:?}", result.errors);
    }

    #[test]
    fn missing_previous_for_non_genesis_is_reported() {
        let tx = UTXOTransaction::coinbase(LockingScript::Address("lora1a".into()), 1000, 1_700_000_000_000);
        let block = Block::new(1, 1_700_000_000_000, Hash256::zero(), 1, None, vec![tx]);
        let result = validate_block(&block, None, &UtxoSet::new());
        assert!(!result.valid);
    }

    #[test]
    fn three_distinct_defects_yield_at_least_three_errors() {
        let tx = UTXOTransaction::coinbase(LockingScript::Address("lora1a".into()), 1000, 1_700_000_000_000);
        let mut block = Block::genesis(1_700_000_000_000, 0, vec![tx]);
        block.merkle_root = Hash256::sha256(b"wrong");
        block.hash = Hash256::sha256(b"also wrong");

        let result = validate_block(&block, None, &UtxoSet::new());
        assert!(!result.valid);
        assert!(result.errors.len() >= 3, "{:?}", result.errors);
    }
}
