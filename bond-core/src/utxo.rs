//! The UTXO ledger: every unspent output, keyed by its own identity.

use crate::block::Block;
use crate::script::LockingScript;
use persistence::{Store, Sublevel};
use serde::{Deserialize, Serialize};
use shared::types::OutPoint;
use shared::{BlockchainError, Hash256, Result};
use std::collections::HashMap;

/// An unspent transaction output together with the context needed to
/// judge its spendability (coinbase maturity) and ownership (address).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub value: u64,
    pub locking_script: LockingScript,
    pub block_height: u64,
    pub is_coinbase: bool,
}

impl Utxo {
    #[must_use]
    pub fn new(
        txid: Hash256,
        vout: u32,
        value: u64,
        locking_script: LockingScript,
        block_height: u64,
        is_coinbase: bool,
    ) -> Self {
        Self {
            outpoint: OutPoint::new(txid, vout),
            value,
            locking_script,
            block_height,
            is_coinbase,
        }
    }

    #[must_use]
    pub fn address(&self) -> String {
        self.locking_script.address()
    }

    /// Coinbase outputs mature after 100 confirmations; every other
    /// output is spendable as soon as it lands in a block.
    #[must_use]
    pub fn is_mature(&self, current_height: u64) -> bool {
        if self.is_coinbase {
            current_height >= self.block_height + 100
        } else {
            true
        }
    }
}

/// The full set of unspent outputs, indexed by `OutPoint`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtxoSet {
    utxos: HashMap<OutPoint, Utxo>,
}

impl UtxoSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, utxo: Utxo) {
        self.utxos.insert(utxo.outpoint, utxo);
    }

    #[must_use]
    pub fn get(&self, txid: &Hash256, vout: u32) -> Option<&Utxo> {
        self.utxos.get(&OutPoint::new(*txid, vout))
    }

    /// Removes and returns the UTXO being spent.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such UTXO exists (a double-spend or a
    /// reference to an output that was never created).
    pub fn mark_spent(&mut self, txid: &Hash256, vout: u32) -> Result<Utxo> {
        self.utxos
            .remove(&OutPoint::new(*txid, vout))
            .ok_or_else(|| BlockchainError::NotFound(format!("utxo {txid}:{vout}")))
    }

    #[must_use]
    pub fn contains(&self, txid: &Hash256, vout: u32) -> bool {
        self.utxos.contains_key(&OutPoint::new(*txid, vout))
    }

    /// All UTXOs owned by `address`, sorted by value descending (the
    /// order a coin selector wants them in).
    #[must_use]
    pub fn utxos_for_address(&self, address: &str) -> Vec<&Utxo> {
        let mut matches: Vec<&Utxo> = self
            .utxos
            .values()
            .filter(|utxo| utxo.address() == address)
            .collect();
        matches.sort_by(|a, b| b.value.cmp(&a.value));
        matches
    }

    #[must_use]
    pub fn total_value(&self, address: &str) -> u64 {
        self.utxos_for_address(address).iter().map(|u| u.value).sum()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.utxos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    /// Rebuilds the set from scratch by replaying every block's
    /// transactions in order: each input removes the UTXO it spends,
    /// each output creates a new one. Used after a reorg, where
    /// replaying is simpler and less error-prone than diffing.
    ///
    /// # Errors
    ///
    /// Returns an error if a block spends an output that doesn't
    /// exist at the point it is replayed (an internally inconsistent
    /// chain).
    pub fn rebuild_from_blocks(blocks: &[Block]) -> Result<Self> {
        let mut set = Self::new();
        for block in blocks {
            for tx in &block.transactions {
                for input in &tx.inputs {
                    if !input.is_coinbase() {
                        set.mark_spent(&input.previous_tx_id, input.output_index)?;
                    }
                }
                for output in &tx.outputs {
                    set.put(Utxo::new(
                        tx.id,
                        output.output_index,
                        output.value,
                        output.locking_script.clone(),
                        block.index,
                        tx.is_coinbase(),
                    ));
                }
            }
        }
        Ok(set)
    }

    /// Persists the whole set as a single snapshot under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn persist<S: Store>(&self, store: &S, key: &str) -> Result<()> {
        store.put_typed(Sublevel::UtxoSet, key, self, true).await
    }

    /// Loads a previously-persisted snapshot from `key`, or `None` if
    /// it has never been written.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read itself fails.
    pub async fn load<S: Store>(store: &S, key: &str) -> Result<Option<Self>> {
        store.get_typed(Sublevel::UtxoSet, key).await
    }
}
