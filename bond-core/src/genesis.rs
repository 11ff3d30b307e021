//! Genesis configuration: the one-time parameters that seed a chain
//! and the construction of its first block.

use crate::block::Block;
use crate::script::LockingScript;
use crate::transaction::{TxInput, UTXOTransaction};
use persistence::{Store, Sublevel};
use serde::{Deserialize, Serialize};
use shared::types::NetworkType;
use shared::{BlockchainError, Result};
use std::collections::HashSet;

const GENESIS_CONFIG_KEY: &str = "config";
const GENESIS_METADATA_KEY: &str = "metadata";
const GENESIS_ALLOCATIONS_KEY: &str = "initial_allocations";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialAllocation {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkParams {
    pub initial_difficulty: u32,
    pub target_block_time_secs: u64,
    pub adjustment_period: u64,
    pub max_difficulty_ratio: f64,
    pub max_block_size: usize,
    pub mining_reward: u64,
    pub halving_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisMetadata {
    pub timestamp: i64,
    pub description: String,
    pub creator: String,
    pub network_type: NetworkType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub chain_id: String,
    pub network_name: String,
    pub version: String,
    pub total_supply: u64,
    pub initial_allocations: Vec<InitialAllocation>,
    pub network_params: NetworkParams,
    pub metadata: GenesisMetadata,
}

impl GenesisConfig {
    /// Validates every normative constraint on the config, collecting
    /// every violation rather than stopping at the first.
    #[must_use]
    pub fn validate(&self, now: i64) -> Vec<String> {
        let mut errors = Vec::new();

        if self.chain_id.len() < 3 {
            errors.push("chain_id must be at least 3 characters".to_string());
        }

        let mut seen_addresses = HashSet::new();
        let mut allocated = 0u64;
        for allocation in &self.initial_allocations {
            if !seen_addresses.insert(&allocation.address) {
                errors.push(format!("duplicate allocation address {}", allocation.address));
            }
            if allocation.amount == 0 {
                errors.push(format!("allocation to {} must be positive", allocation.address));
            }
            allocated = allocated.saturating_add(allocation.amount);
        }
        if allocated > self.total_supply {
            errors.push(format!(
                "allocations sum to {allocated}, exceeding total_supply {}",
                self.total_supply
            ));
        }

        if self.network_params.initial_difficulty < 1 {
            errors.push("network_params.initial_difficulty must be at least 1".to_string());
        }
        if !(60..=1800).contains(&self.network_params.target_block_time_secs) {
            errors.push("network_params.target_block_time_secs must be in 60..=1800".to_string());
        }
        if !(1..=100).contains(&self.network_params.adjustment_period) {
            errors.push("network_params.adjustment_period must be in 1..=100".to_string());
        }
        if !(2.0..=10.0).contains(&self.network_params.max_difficulty_ratio) {
            errors.push("network_params.max_difficulty_ratio must be in 2.0..=10.0".to_string());
        }
        const KIB: usize = 1024;
        if !((KIB)..=(32 * KIB * KIB)).contains(&self.network_params.max_block_size) {
            errors.push("network_params.max_block_size must be in 1 KiB..=32 MiB".to_string());
        }
        if self.network_params.mining_reward == 0 {
            errors.push("network_params.mining_reward must be positive".to_string());
        }

        if self.metadata.timestamp > now {
            errors.push("metadata.timestamp must not be in the future".to_string());
        }
        if self.metadata.description.len() < 10 {
            errors.push("metadata.description must be at least 10 characters".to_string());
        }
        if self.metadata.creator.len() < 3 {
            errors.push("metadata.creator must be at least 3 characters".to_string());
        }

        errors
    }

    /// Builds the genesis block: one coinbase-shaped transaction
    /// allocating each configured address its amount, at index 0 with
    /// no previous hash and no proof-of-work.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if validation against `now` fails.
    pub fn build_block(&self, now: i64) -> Result<Block> {
        let errors = self.validate(now);
        if !errors.is_empty() {
            return Err(BlockchainError::InvalidConfig(errors.join("; ")));
        }

        let outputs = self
            .initial_allocations
            .iter()
            .enumerate()
            .map(|(i, allocation)| {
                crate::transaction::TxOutput::new(
                    allocation.amount,
                    LockingScript::Address(allocation.address.clone()),
                    i as u32,
                )
            })
            .collect::<Vec<_>>();

        let genesis_tx = UTXOTransaction::new(vec![TxInput::coinbase()], outputs, 0, self.metadata.timestamp, 0);

        Ok(Block::genesis(
            self.metadata.timestamp,
            self.network_params.initial_difficulty,
            vec![genesis_tx],
        ))
    }

    /// Loads a previously-persisted genesis config from `store`, or
    /// persists `fallback` as the config of record if none exists yet.
    ///
    /// The metadata and initial allocations are additionally persisted
    /// under their own sublevels so a partial reader (e.g. a
    /// lightweight status tool) can fetch them without decoding the
    /// whole config.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read/write itself fails.
    pub async fn load_or_persist<S: Store>(store: &S, fallback: Self) -> Result<Self> {
        if let Some(existing) = store.get_typed::<Self>(Sublevel::Genesis, GENESIS_CONFIG_KEY).await? {
            return Ok(existing);
        }

        store.put_typed(Sublevel::Genesis, GENESIS_CONFIG_KEY, &fallback, false).await?;
        store.put_typed(Sublevel::GenMeta, GENESIS_METADATA_KEY, &fallback.metadata, false).await?;
        store
            .put_typed(Sublevel::GenUtxo, GENESIS_ALLOCATIONS_KEY, &fallback.initial_allocations, false)
            .await?;
        Ok(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> GenesisConfig {
        GenesisConfig {
            chain_id: "block-test-v1".to_string(),
            network_name: "lora-utxo-devnet".to_string(),
            version: "0.1.0".to_string(),
            total_supply: 21_000_000,
            initial_allocations: vec![InitialAllocation {
                address: "lora1test0000000000000000000000000".to_string(),
                amount: 1_000_000,
            }],
            network_params: NetworkParams {
                initial_difficulty: 1,
                target_block_time_secs: 600,
                adjustment_period: 10,
                max_difficulty_ratio: 4.0,
                max_block_size: 4 * 1024 * 1024,
                mining_reward: 5000,
                halving_interval: 210_000,
            },
            metadata: GenesisMetadata {
                timestamp: 1_700_000_000_000,
                description: "devnet genesis for local testing".to_string(),
                creator: "node-dev-team".to_string(),
                network_type: NetworkType::Devnet,
            },
        }
    }

    #[test]
    fn s1_genesis_produces_expected_block_and_utxo() {
        let config = sample_config();
        let block = config.build_block(1_700_000_000_001).unwrap();

        assert_eq!(block.index, 0);
        assert_eq!(block.previous_hash, shared::Hash256::zero());
        assert_eq!(block.difficulty, 1);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].outputs.len(), 1);
        assert_eq!(block.transactions[0].outputs[0].value, 1_000_000);

        let hash_again = block.compute_hash();
        assert_eq!(hash_again, block.hash);
    }

    #[test]
    fn allocations_exceeding_total_supply_are_rejected() {
        let mut config = sample_config();
        config.total_supply = 100;
        let errors = config.validate(1_700_000_000_001);
        assert!(errors.iter().any(|e| e.contains("total_supply")));
    }

    #[test]
    fn future_timestamp_is_rejected() {
        let config = sample_config();
        let errors = config.validate(1_600_000_000_000);
        assert!(errors.iter().any(|e| e.contains("future")));
    }

    #[tokio::test]
    async fn load_or_persist_writes_fallback_once_then_returns_it_stably() {
        let store = persistence::MemoryStore::new();

        let first = GenesisConfig::load_or_persist(&store, sample_config()).await.unwrap();
        assert_eq!(first.chain_id, "block-test-v1");

        let mut different = sample_config();
        different.chain_id = "should-not-win".to_string();
        let second = GenesisConfig::load_or_persist(&store, different).await.unwrap();
        assert_eq!(second.chain_id, "block-test-v1");

        let metadata = store
            .get_typed::<GenesisMetadata>(persistence::Sublevel::GenMeta, GENESIS_METADATA_KEY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(metadata.creator, "node-dev-team");
    }
}
