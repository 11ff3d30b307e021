pub mod block;
pub mod blockchain;
pub mod error;
pub mod genesis;
pub mod merkle;
pub mod mining;
pub mod script;
pub mod transaction;
pub mod utxo;
pub mod validation;

pub use block::{Block, ValidationResult};
pub use blockchain::{Chain, ChainStats};
pub use error::{BondError, BondResult};
pub use genesis::{GenesisConfig, GenesisMetadata, InitialAllocation, NetworkParams};
pub use merkle::{compress, decompress, generate_proof, merkle_root, verify_proof, CompressedMerkleProof, MerkleProof};
pub use mining::{DifficultyAdjuster, Miner, MinerConfig, MiningResult};
pub use script::{derive_address, verify_unlock, LockingScript, UnlockingScript};
pub use transaction::{TxInput, TxOutput, UTXOTransaction};
pub use utxo::{Utxo, UtxoSet};
pub use validation::validate_block;

pub use shared::{BlockchainError, Hash256, Result};
