//! UTXO-model transactions: inputs spend prior outputs by unlocking
//! script, outputs create new ones locked to an address or pubkey.

use crate::script::{verify_unlock, LockingScript, UnlockingScript};
use crate::utxo::UtxoSet;
use serde::{Deserialize, Serialize};
use shared::canonical::to_preimage;
use shared::{BlockchainError, Hash256, Result};
use std::collections::HashSet;

/// The sentinel previous-output used by coinbase inputs.
const COINBASE_VOUT: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_tx_id: Hash256,
    pub output_index: u32,
    pub unlocking_script: UnlockingScript,
    pub sequence: u32,
}

impl TxInput {
    #[must_use]
    pub fn new(previous_tx_id: Hash256, output_index: u32, unlocking_script: UnlockingScript, sequence: u32) -> Self {
        Self {
            previous_tx_id,
            output_index,
            unlocking_script,
            sequence,
        }
    }

    #[must_use]
    pub fn coinbase() -> Self {
        Self {
            previous_tx_id: Hash256::zero(),
            output_index: COINBASE_VOUT,
            unlocking_script: UnlockingScript::None,
            sequence: COINBASE_VOUT,
        }
    }

    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.previous_tx_id == Hash256::zero() && self.output_index == COINBASE_VOUT
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub locking_script: LockingScript,
    pub output_index: u32,
}

impl TxOutput {
    #[must_use]
    pub fn new(value: u64, locking_script: LockingScript, output_index: u32) -> Self {
        Self {
            value,
            locking_script,
            output_index,
        }
    }
}

/// The preimage committed to by a transaction's id — everything
/// except the id and the fee, which is derived rather than carried.
#[derive(Serialize)]
struct TxPreimage<'a> {
    inputs: &'a [TxInput],
    outputs: &'a [TxOutput],
    lock_time: u64,
    timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UTXOTransaction {
    pub id: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u64,
    pub timestamp: i64,
    pub fee: u64,
}

impl UTXOTransaction {
    /// Builds a coinbase transaction: one coinbase input, one output
    /// paying `reward` to `reward_script`.
    #[must_use]
    pub fn coinbase(reward_script: LockingScript, reward: u64, timestamp: i64) -> Self {
        let inputs = vec![TxInput::coinbase()];
        let outputs = vec![TxOutput::new(reward, reward_script, 0)];
        let id = Self::compute_id(&inputs, &outputs, 0, timestamp);
        Self {
            id,
            inputs,
            outputs,
            lock_time: 0,
            timestamp,
            fee: 0,
        }
    }

    /// Builds a regular transaction, deriving its id from the given
    /// fields and its fee from `total_input_value - total_output_value`.
    #[must_use]
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>, lock_time: u64, timestamp: i64, input_value: u64) -> Self {
        let output_value: u64 = outputs.iter().map(|o| o.value).sum();
        let fee = input_value.saturating_sub(output_value);
        let id = Self::compute_id(&inputs, &outputs, lock_time, timestamp);
        Self {
            id,
            inputs,
            outputs,
            lock_time,
            timestamp,
            fee,
        }
    }

    fn compute_id(inputs: &[TxInput], outputs: &[TxOutput], lock_time: u64, timestamp: i64) -> Hash256 {
        let preimage = TxPreimage {
            inputs,
            outputs,
            lock_time,
            timestamp,
        };
        let bytes = to_preimage(&preimage).expect("transaction preimage is always serializable");
        Hash256::sha256(&bytes)
    }

    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    #[must_use]
    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Sums the value of every UTXO this transaction's inputs spend.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if an input references a UTXO that doesn't
    /// exist in `utxo_set`.
    pub fn total_input_value(&self, utxo_set: &UtxoSet) -> Result<u64> {
        let mut total = 0u64;
        for input in &self.inputs {
            if input.is_coinbase() {
                continue;
            }
            let utxo = utxo_set
                .get(&input.previous_tx_id, input.output_index)
                .ok_or_else(|| BlockchainError::NotFound(format!("utxo {}:{}", input.previous_tx_id, input.output_index)))?;
            total = total.checked_add(utxo.value).ok_or_else(|| {
                BlockchainError::InvalidTransaction("input value overflow".into())
            })?;
        }
        Ok(total)
    }

    /// Structural checks that don't need the UTXO set: non-empty
    /// inputs/outputs (unless coinbase), positive values, and no
    /// input spending the same outpoint twice.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransaction` describing the first violation found.
    pub fn validate_basic(&self) -> Result<()> {
        if self.outputs.is_empty() {
            return Err(BlockchainError::InvalidTransaction("transaction has no outputs".into()));
        }
        if !self.is_coinbase() && self.inputs.is_empty() {
            return Err(BlockchainError::InvalidTransaction("non-coinbase transaction has no inputs".into()));
        }
        if self.outputs.iter().any(|o| o.value == 0) {
            return Err(BlockchainError::InvalidTransaction("output value must be positive".into()));
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if input.is_coinbase() {
                continue;
            }
            if !seen.insert((input.previous_tx_id, input.output_index)) {
                return Err(BlockchainError::InvalidTransaction("duplicate input in transaction".into()));
            }
        }
        Ok(())
    }

    /// Verifies that every non-coinbase input's unlocking script
    /// satisfies the locking script of the UTXO it spends, and that
    /// total input value covers total output value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransaction` if a signature fails to verify or
    /// inputs don't cover outputs, `NotFound` if an input references
    /// a nonexistent UTXO.
    pub fn validate_against_utxo_set(&self, utxo_set: &UtxoSet) -> Result<()> {
        self.validate_basic()?;

        if self.is_coinbase() {
            return Ok(());
        }

        for input in &self.inputs {
            let utxo = utxo_set
                .get(&input.previous_tx_id, input.output_index)
                .ok_or_else(|| BlockchainError::NotFound(format!("utxo {}:{}", input.previous_tx_id, input.output_index)))?;

            if !verify_unlock(&utxo.locking_script, &input.unlocking_script, &self.id) {
                return Err(BlockchainError::InvalidTransaction(format!(
                    "unlocking script failed for input {}:{}",
                    input.previous_tx_id, input.output_index
                )));
            }
        }

        let input_value = self.total_input_value(utxo_set)?;
        let output_value = self.total_output_value();
        if input_value < output_value {
            return Err(BlockchainError::InvalidTransaction(format!(
                "inputs ({input_value}) do not cover outputs ({output_value})"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utxo::Utxo;
    use shared::KeyPair;
    use shared::SignatureAlgorithm;

    #[test]
    fn coinbase_transaction_has_no_real_inputs() {
        let tx = UTXOTransaction::coinbase(LockingScript::Address("lora1miner".into()), 5000, 1700000000);
        assert!(tx.is_coinbase());
        assert_eq!(tx.total_output_value(), 5000);
        assert!(tx.validate_basic().is_ok());
    }

    #[test]
    fn spending_transaction_verifies_signature_against_utxo_set() {
        let keypair = KeyPair::generate(SignatureAlgorithm::Ed25519).unwrap();
        let locking = LockingScript::Pubkey {
            algorithm: SignatureAlgorithm::Ed25519,
            pubkey: keypair.public_key.as_bytes().to_vec(),
        };
        let funding_txid = Hash256::sha256(b"funding tx");

        let mut utxo_set = UtxoSet::new();
        utxo_set.put(Utxo::new(funding_txid, 0, 1000, locking, 10, false));

        let unsigned_inputs = vec![TxInput::new(funding_txid, 0, UnlockingScript::None, 0)];
        let outputs = vec![TxOutput::new(900, LockingScript::Address("lora1bob".into()), 0)];
        let unsigned = UTXOTransaction::new(unsigned_inputs, outputs.clone(), 0, 1700000001, 1000);

        let signature = keypair.sign(unsigned.id.as_bytes()).unwrap();
        let signed_inputs = vec![TxInput::new(
            funding_txid,
            0,
            UnlockingScript::Signature(signature.as_bytes().to_vec()),
            0,
        )];
        let signed = UTXOTransaction::new(signed_inputs, outputs, 0, 1700000001, 1000);

        assert_eq!(signed.fee, 100);
        assert!(signed.validate_against_utxo_set(&utxo_set).is_ok());
    }

    #[test]
    fn spending_transaction_rejects_bad_signature() {
        let keypair = KeyPair::generate(SignatureAlgorithm::Secp256k1).unwrap();
        let other = KeyPair::generate(SignatureAlgorithm::Secp256k1).unwrap();
        let locking = LockingScript::Pubkey {
            algorithm: SignatureAlgorithm::Secp256k1,
            pubkey: keypair.public_key.as_bytes().to_vec(),
        };
        let funding_txid = Hash256::sha256(b"funding tx 2");

        let mut utxo_set = UtxoSet::new();
        utxo_set.put(Utxo::new(funding_txid, 0, 1000, locking, 10, false));

        let outputs = vec![TxOutput::new(900, LockingScript::Address("lora1bob".into()), 0)];
        let placeholder = UTXOTransaction::new(
            vec![TxInput::new(funding_txid, 0, UnlockingScript::None, 0)],
            outputs.clone(),
            0,
            1700000002,
            1000,
        );
        let wrong_signature = other.sign(placeholder.id.as_bytes()).unwrap();
        let tx = UTXOTransaction::new(
            vec![TxInput::new(
                funding_txid,
                0,
                UnlockingScript::Signature(wrong_signature.as_bytes().to_vec()),
                0,
            )],
            outputs,
            0,
            1700000002,
            1000,
        );

        assert!(tx.validate_against_utxo_set(&utxo_set).is_err());
    }

    #[test]
    fn duplicate_inputs_are_rejected() {
        let txid = Hash256::sha256(b"dup");
        let inputs = vec![
            TxInput::new(txid, 0, UnlockingScript::None, 0),
            TxInput::new(txid, 0, UnlockingScript::None, 1),
        ];
        let outputs = vec![TxOutput::new(1, LockingScript::Address("lora1x".into()), 0)];
        let tx = UTXOTransaction::new(inputs, outputs, 0, 0, 1);
        assert!(tx.validate_basic().is_err());
    }
}
