//! Top-level chain state: the ordered block list, the UTXO set it
//! produces, and the operations that keep them in sync.

use crate::block::Block;
use crate::genesis::GenesisConfig;
use crate::mining::{DifficultyAdjuster, Miner, MiningResult};
use crate::script::LockingScript;
use crate::transaction::UTXOTransaction;
use crate::utxo::UtxoSet;
use crate::validation::validate_block;
use persistence::{value, BatchOp, Store, Sublevel};
use serde::{Deserialize, Serialize};
use shared::{BlockchainError, Result};

const UTXO_SNAPSHOT_KEY: &str = "tip";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStats {
    pub height: u64,
    pub current_difficulty: u32,
    pub utxo_count: usize,
    pub total_transactions: u64,
}

pub struct Chain {
    pub blocks: Vec<Block>,
    pub utxo_set: UtxoSet,
    pub genesis_config: GenesisConfig,
}

impl Chain {
    /// Builds a chain from its genesis configuration, validating and
    /// applying the genesis block.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the genesis config fails validation.
    pub fn new(genesis_config: GenesisConfig, now: i64) -> Result<Self> {
        let genesis = genesis_config.build_block(now)?;
        let mut utxo_set = UtxoSet::new();
        genesis.apply_to_utxo_set(&mut utxo_set)?;

        Ok(Self {
            blocks: vec![genesis],
            utxo_set,
            genesis_config,
        })
    }

    #[must_use]
    pub fn latest_block(&self) -> &Block {
        self.blocks.last().expect("chain always has at least the genesis block")
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.latest_block().index
    }

    fn difficulty_adjuster(&self) -> DifficultyAdjuster {
        DifficultyAdjuster::new(
            self.genesis_config.network_params.target_block_time_secs,
            self.genesis_config.network_params.adjustment_period,
            self.genesis_config.network_params.max_difficulty_ratio,
        )
    }

    #[must_use]
    pub fn next_difficulty(&self) -> u32 {
        self.difficulty_adjuster()
            .calculate_new_difficulty(self.latest_block().difficulty, &self.blocks)
            .unwrap_or(self.latest_block().difficulty)
    }

    /// The block subsidy at `height`, halving every `halving_interval`
    /// blocks.
    #[must_use]
    pub fn block_reward_at(&self, height: u64) -> u64 {
        let halvings = height / self.genesis_config.network_params.halving_interval.max(1);
        if halvings >= 64 {
            0
        } else {
            self.genesis_config.network_params.mining_reward >> halvings
        }
    }

    /// Validates `block` against the current tip and UTXO set, then
    /// appends it and applies its transactions.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBlock` describing every violation found, or a
    /// UTXO-application error if validation passed but application
    /// still fails (an internal inconsistency).
    pub fn add_block(&mut self, block: Block) -> Result<()> {
        let result = validate_block(&block, Some(self.latest_block()), &self.utxo_set);
        if !result.valid {
            return Err(BlockchainError::InvalidBlock(result.errors.join("; ")));
        }

        block.apply_to_utxo_set(&mut self.utxo_set)?;
        self.blocks.push(block);
        Ok(())
    }

    /// Builds and mines the next block over `transactions`, crediting
    /// the block reward plus collected fees to `reward_script`.
    ///
    /// # Errors
    ///
    /// Returns an error if mining fails to find a nonce.
    pub fn mine_next_block(
        &self,
        transactions: Vec<UTXOTransaction>,
        reward_script: LockingScript,
        timestamp: i64,
        miner: &Miner,
    ) -> Result<MiningResult> {
        let height = self.height() + 1;
        let fees: u64 = transactions.iter().map(|tx| tx.fee).sum();
        let reward = self.block_reward_at(height).saturating_add(fees);
        let coinbase = UTXOTransaction::coinbase(reward_script, reward, timestamp);

        let mut all_transactions = vec![coinbase];
        all_transactions.extend(transactions);

        let block = Block::new(
            height,
            timestamp,
            self.latest_block().hash,
            self.next_difficulty(),
            None,
            all_transactions,
        );

        miner.mine(block)
    }

    #[must_use]
    pub fn get_balance(&self, address: &str) -> u64 {
        self.utxo_set.total_value(address)
    }

    #[must_use]
    pub fn stats(&self) -> ChainStats {
        ChainStats {
            height: self.height(),
            current_difficulty: self.latest_block().difficulty,
            utxo_count: self.utxo_set.count(),
            total_transactions: self.blocks.iter().map(|b| b.transactions.len() as u64).sum(),
        }
    }

    /// Persists a single block under its own index-keyed entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn persist_block<S: Store>(store: &S, block: &Block) -> Result<()> {
        store.put_typed(Sublevel::Blocks, &block.index.to_string(), block, false).await
    }

    /// Loads every persisted block, ordered by index.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read itself fails. Individually
    /// corrupt block records are skipped rather than failing the
    /// whole load, matching the store's corrupt-read contract.
    pub async fn load_blocks<S: Store>(store: &S) -> Result<Vec<Block>> {
        let entries = store.iterate(Sublevel::Blocks, None, None, usize::MAX, false).await?;
        let mut blocks: Vec<Block> = entries.iter().filter_map(|kv| value::decode::<Block>(&kv.value).ok()).collect();
        blocks.sort_by_key(|b| b.index);
        Ok(blocks)
    }

    /// Persists every block plus the current UTXO-set snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if any store write fails.
    pub async fn persist_all<S: Store>(&self, store: &S) -> Result<()> {
        let ops = self
            .blocks
            .iter()
            .map(|block| {
                let bytes = value::encode(block, false)?;
                Ok(BatchOp::put(Sublevel::Blocks, &block.index.to_string(), bytes))
            })
            .collect::<Result<Vec<_>>>()?;
        store.batch(ops).await?;
        self.utxo_set.persist(store, UTXO_SNAPSHOT_KEY).await
    }

    /// Loads a chain from `store` if one was previously persisted,
    /// otherwise builds it fresh from `fallback_genesis` and persists
    /// it so the next run finds it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a freshly-built genesis fails
    /// validation, or an error if any store access fails.
    pub async fn load_or_init<S: Store>(store: &S, fallback_genesis: GenesisConfig, now: i64) -> Result<Self> {
        let genesis_config = GenesisConfig::load_or_persist(store, fallback_genesis).await?;
        let blocks = Self::load_blocks(store).await?;

        if blocks.is_empty() {
            let chain = Self::new(genesis_config, now)?;
            chain.persist_all(store).await?;
            return Ok(chain);
        }

        let utxo_set = match UtxoSet::load(store, UTXO_SNAPSHOT_KEY).await? {
            Some(set) => set,
            None => UtxoSet::rebuild_from_blocks(&blocks)?,
        };

        Ok(Self { blocks, utxo_set, genesis_config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::{GenesisMetadata, InitialAllocation, NetworkParams};
    use crate::mining::MinerConfig;
    use shared::types::NetworkType;

    fn test_config() -> GenesisConfig {
        GenesisConfig {
            chain_id: "block-test-v1".to_string(),
            network_name: "lora-utxo-devnet".to_string(),
            version: "0.1.0".to_string(),
            total_supply: 21_000_000,
            initial_allocations: vec![InitialAllocation {
                address: "lora1test".to_string(),
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
    fn s2_mine_block_at_difficulty_two() {
        let chain = Chain::new(test_config(), 1_700_000_000_001).unwrap();
        let miner = Miner::new(MinerConfig { threads: 2 });

        let mut block = Block::new(1, 1_700_000_060_000, chain.latest_block().hash, 2, None, vec![]);
        block.difficulty = 2;
        block.hash = block.compute_hash();
        let mined = miner.mine(block).unwrap();

        assert!(mined.block.hash.meets_difficulty(2));
        assert!(mined.block.nonce > 0);
    }

    #[test]
    fn add_block_updates_height_and_utxo_set() {
        let mut chain = Chain::new(test_config(), 1_700_000_000_001).unwrap();
        let miner = Miner::new(MinerConfig { threads: 1 });
        let result = chain
            .mine_next_block(vec![], LockingScript::Address("lora1miner".into()), 1_700_000_060_000, &miner)
            .unwrap();

        chain.add_block(result.block).unwrap();
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.get_balance("lora1miner"), 5000);
    }

    #[tokio::test]
    async fn load_or_init_persists_a_fresh_chain_then_reloads_it_unchanged() {
        let store = persistence::MemoryStore::new();

        let first = Chain::load_or_init(&store, test_config(), 1_700_000_000_001).await.unwrap();
        assert_eq!(first.height(), 0);

        let reloaded = Chain::load_or_init(&store, test_config(), 1_700_000_000_001).await.unwrap();
        assert_eq!(reloaded.height(), 0);
        assert_eq!(reloaded.blocks[0].hash, first.blocks[0].hash);
        assert_eq!(reloaded.get_balance("lora1test"), 1_000_000);
    }

    #[tokio::test]
    async fn persist_all_and_load_or_init_survive_an_added_block() {
        let store = persistence::MemoryStore::new();
        let mut chain = Chain::load_or_init(&store, test_config(), 1_700_000_000_001).await.unwrap();

        let miner = Miner::new(MinerConfig { threads: 1 });
        let result = chain
            .mine_next_block(vec![], LockingScript::Address("lora1miner".into()), 1_700_000_060_000, &miner)
            .unwrap();
        chain.add_block(result.block).unwrap();
        chain.persist_all(&store).await.unwrap();

        let reloaded = Chain::load_or_init(&store, test_config(), 1_700_000_000_001).await.unwrap();
        assert_eq!(reloaded.height(), 1);
        assert_eq!(reloaded.get_balance("lora1miner"), 5000);
    }
}
