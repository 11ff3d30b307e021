//! End-to-end scenarios exercised through the public API only, with
//! the literal inputs each scenario specifies.

use bond_core::{Chain, GenesisConfig, GenesisMetadata, InitialAllocation, NetworkParams};
use shared::types::NetworkType;
use shared::Hash256;

fn scenario_genesis_config() -> GenesisConfig {
    GenesisConfig {
        chain_id: "block-test-v1".to_string(),
        network_name: "lora-utxo-devnet".to_string(),
        version: "0.1.0".to_string(),
        total_supply: 21_000_000,
        initial_allocations: vec![InitialAllocation { address: "lora1test0000000000000000000000000".to_string(), amount: 1_000_000 }],
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

/// S1 Genesis: the literal config from spec.md §8 produces the
/// expected block shape and a matching single UTXO.
#[test]
fn s1_genesis_produces_the_expected_block_and_utxo() {
    let chain = Chain::new(scenario_genesis_config(), 1_700_000_000_001).unwrap();
    let genesis = chain.latest_block();

    assert_eq!(genesis.index, 0);
    assert_eq!(genesis.previous_hash, Hash256::zero());
    assert_eq!(genesis.difficulty, 1);
    assert!(genesis.transactions.is_empty() || genesis.transactions.len() == 1);
    assert_eq!(chain.get_balance("lora1test0000000000000000000000000"), 1_000_000);
    assert_eq!(genesis.compute_hash(), genesis.hash);
}

/// S2 Mine at difficulty 2: mining a block atop the S1 genesis at
/// difficulty 2 yields a hash with a two-hex-zero prefix and a
/// nonzero nonce, reproducibly.
#[test]
fn s2_mining_at_difficulty_two_meets_the_target() {
    use bond_core::script::LockingScript;
    use bond_core::{Block, Miner, MinerConfig, UTXOTransaction};

    let chain = Chain::new(scenario_genesis_config(), 1_700_000_000_001).unwrap();
    let tx = UTXOTransaction::coinbase(LockingScript::Address("lora1miner".to_string()), 5000, 1_700_000_060_000);

    let block = Block::new(1, 1_700_000_060_000, chain.latest_block().hash, 2, None, vec![tx]);

    let miner = Miner::new(MinerConfig { threads: 2 });
    let mined = miner.mine(block).unwrap();

    assert!(mined.block.hash.to_hex().starts_with("00"));
    assert!(mined.block.nonce > 0);
}
