//! Header/UTXO/block/mempool synchronization state machine.

use bond_core::Block;
use persistence::{Store, Sublevel};
use serde::{Deserialize, Serialize};
use shared::types::NetworkType;
use shared::{BlockchainError, Result};
use std::time::{Duration, Instant};

const SYNC_CHECKPOINT_KEY: &str = "sync_checkpoint";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Discovering,
    Negotiating,
    HeaderSync,
    UtxoSetSync,
    BlockSync,
    MempoolSync,
    Synchronized,
    ReorgHandling,
}

impl SyncState {
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SyncState::{BlockSync, Discovering, HeaderSync, MempoolSync, Negotiating, ReorgHandling, Synchronized, UtxoSetSync};
        match (self, next) {
            (Discovering, Negotiating)
            | (Negotiating, HeaderSync)
            | (HeaderSync, UtxoSetSync)
            | (UtxoSetSync, BlockSync)
            | (BlockSync, MempoolSync)
            | (MempoolSync, Synchronized)
            | (ReorgHandling, HeaderSync) => true,
            (_, ReorgHandling) => true,
            _ => false,
        }
    }
}

/// Recorded progress a paused sync resumes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub header_height: u64,
    pub utxo_delta_cursor: u64,
}

#[derive(Debug, Clone)]
pub struct UtxoSnapshot {
    pub height: u64,
    pub merkle_root: String,
    pub utxo_count: u64,
    pub total_value: u64,
    pub compressed_utxo_batches: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct UtxoDelta {
    pub from_height: u64,
    pub to_height: u64,
    pub created: Vec<Vec<u8>>,
    pub spent: Vec<Vec<u8>>,
}

pub struct SyncConfig {
    pub header_batch_size: u64,
    pub negotiating_timeout: Duration,
    pub min_peers_to_negotiate: usize,
    pub required_protocol_version: String,
    pub required_capability: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            header_batch_size: 100,
            negotiating_timeout: Duration::from_secs(30),
            min_peers_to_negotiate: 3,
            required_protocol_version: "2.0.0".to_string(),
            required_capability: "utxo_sync".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeerAnnouncement {
    pub peer_id: String,
    pub protocol_version: String,
    pub capabilities: Vec<String>,
    pub height: u64,
    pub network_type: NetworkType,
}

/// Drives the node through header, UTXO-set, block, and mempool
/// synchronization, one phase at a time.
pub struct SyncMachine {
    state: SyncState,
    config: SyncConfig,
    checkpoint: SyncCheckpoint,
    negotiating_since: Option<Instant>,
}

impl SyncMachine {
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self { state: SyncState::Discovering, config, checkpoint: SyncCheckpoint::default(), negotiating_since: None }
    }

    #[must_use]
    pub const fn state(&self) -> SyncState {
        self.state
    }

    fn transition(&mut self, next: SyncState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(BlockchainError::InvalidConfig(format!("cannot transition from {:?} to {:?}", self.state, next)));
        }
        self.state = next;
        Ok(())
    }

    /// Begins negotiation once at least `min_peers_to_negotiate` peers
    /// are known. Fails (without transitioning) if called again after
    /// `negotiating_timeout` has elapsed without enough peers.
    pub fn begin_negotiating(&mut self, known_peers: usize) -> Result<()> {
        if self.state == SyncState::Discovering {
            self.negotiating_since = Some(Instant::now());
        }
        if known_peers < self.config.min_peers_to_negotiate {
            if let Some(started) = self.negotiating_since {
                if started.elapsed() > self.config.negotiating_timeout {
                    return Err(BlockchainError::Timeout("negotiating phase exceeded peer-discovery timeout".to_string()));
                }
            }
            return Err(BlockchainError::InvalidConfig(format!(
                "need at least {} peers to negotiate, have {known_peers}",
                self.config.min_peers_to_negotiate
            )));
        }
        self.transition(SyncState::Negotiating)
    }

    /// Moves into header sync once a qualifying peer announcement is
    /// present (matching protocol version and required capability).
    pub fn begin_header_sync(&mut self, announcements: &[PeerAnnouncement]) -> Result<()> {
        let qualifies = announcements
            .iter()
            .any(|a| a.protocol_version == self.config.required_protocol_version && a.capabilities.iter().any(|c| c == &self.config.required_capability));
        if !qualifies {
            return Err(BlockchainError::InvalidConfig(
                "no peer announces the required protocol version and utxo_sync capability".to_string(),
            ));
        }
        self.transition(SyncState::HeaderSync)
    }

    /// Validates one header batch as a chain before it would be
    /// appended: sequential index, linked `previous_hash`, and
    /// proof-of-work for non-genesis, non-zero-difficulty blocks.
    pub fn validate_header_batch(&self, tip: &Block, batch: &[Block]) -> Result<()> {
        let mut previous = tip;
        for header in batch {
            let errors = header.validate_against_previous(previous);
            if !errors.is_empty() {
                return Err(BlockchainError::InvalidBlock(errors.join("; ")));
            }
            if header.difficulty > 0 && !header.is_genesis() && !header.hash.meets_difficulty(header.difficulty) {
                return Err(BlockchainError::InvalidBlock(format!("header {} does not meet its own difficulty", header.index)));
            }
            previous = header;
        }
        Ok(())
    }

    pub fn advance_header_checkpoint(&mut self, height: u64) {
        self.checkpoint.header_height = height;
    }

    pub fn begin_utxo_set_sync(&mut self) -> Result<()> {
        self.transition(SyncState::UtxoSetSync)
    }

    pub fn begin_block_sync(&mut self) -> Result<()> {
        self.transition(SyncState::BlockSync)
    }

    pub fn begin_mempool_sync(&mut self) -> Result<()> {
        self.transition(SyncState::MempoolSync)
    }

    /// The set of mempool transaction ids present remotely but not
    /// locally, which must still be pulled.
    #[must_use]
    pub fn mempool_diff(local: &[String], remote: &[String]) -> Vec<String> {
        let local: std::collections::HashSet<&String> = local.iter().collect();
        remote.iter().filter(|id| !local.contains(id)).cloned().collect()
    }

    pub fn finish(&mut self) -> Result<()> {
        self.transition(SyncState::Synchronized)
    }

    /// Enters reorg handling from any state, always returning to
    /// `HEADER_SYNC` afterward.
    pub fn begin_reorg(&mut self) {
        self.state = SyncState::ReorgHandling;
    }

    pub fn resume_after_reorg(&mut self) -> Result<()> {
        self.transition(SyncState::HeaderSync)
    }

    /// Returns to `DISCOVERING`, abandoning any in-flight phase.
    pub fn stop_sync(&mut self) {
        self.state = SyncState::Discovering;
        self.negotiating_since = None;
    }

    #[must_use]
    pub const fn checkpoint(&self) -> &SyncCheckpoint {
        &self.checkpoint
    }

    pub fn resume_from_checkpoint(&mut self, checkpoint: SyncCheckpoint) {
        self.checkpoint = checkpoint;
        self.state = SyncState::HeaderSync;
    }

    /// Persists the current checkpoint so a restart can resume sync
    /// instead of starting over from `DISCOVERING`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn persist_checkpoint<S: Store>(&self, store: &S) -> Result<()> {
        store.put_typed(Sublevel::Metadata, SYNC_CHECKPOINT_KEY, &self.checkpoint, false).await
    }

    /// Loads a previously-persisted checkpoint and resumes from it, if
    /// one exists. Leaves the machine untouched otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read itself fails.
    pub async fn load_and_resume<S: Store>(&mut self, store: &S) -> Result<bool> {
        match store.get_typed::<SyncCheckpoint>(Sublevel::Metadata, SYNC_CHECKPOINT_KEY).await? {
            Some(checkpoint) => {
                self.resume_from_checkpoint(checkpoint);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bond_core::script::LockingScript;
    use bond_core::{Block as B, UTXOTransaction};

    fn genesis() -> B {
        let coinbase = UTXOTransaction::coinbase(LockingScript::Address("lora1a".to_string()), 10, 0);
        B::genesis(0, 1, vec![coinbase])
    }

    #[test]
    fn negotiating_requires_minimum_peer_count() {
        let mut machine = SyncMachine::new(SyncConfig::default());
        assert!(machine.begin_negotiating(1).is_err());
        assert!(machine.begin_negotiating(3).is_ok());
        assert_eq!(machine.state(), SyncState::Negotiating);
    }

    #[test]
    fn header_sync_requires_qualifying_peer_announcement() {
        let mut machine = SyncMachine::new(SyncConfig::default());
        machine.begin_negotiating(3).unwrap();
        let bad = vec![PeerAnnouncement { peer_id: "p".to_string(), protocol_version: "1.0.0".to_string(), capabilities: vec![], height: 5, network_type: NetworkType::Devnet }];
        assert!(machine.begin_header_sync(&bad).is_err());

        let good = vec![PeerAnnouncement { peer_id: "p".to_string(), protocol_version: "2.0.0".to_string(), capabilities: vec!["utxo_sync".to_string()], height: 5, network_type: NetworkType::Devnet }];
        assert!(machine.begin_header_sync(&good).is_ok());
        assert_eq!(machine.state(), SyncState::HeaderSync);
    }

    #[test]
    fn full_happy_path_reaches_synchronized() {
        let mut machine = SyncMachine::new(SyncConfig::default());
        machine.begin_negotiating(3).unwrap();
        let good = vec![PeerAnnouncement { peer_id: "p".to_string(), protocol_version: "2.0.0".to_string(), capabilities: vec!["utxo_sync".to_string()], height: 5, network_type: NetworkType::Devnet }];
        machine.begin_header_sync(&good).unwrap();
        machine.begin_utxo_set_sync().unwrap();
        machine.begin_block_sync().unwrap();
        machine.begin_mempool_sync().unwrap();
        machine.finish().unwrap();
        assert_eq!(machine.state(), SyncState::Synchronized);
    }

    #[test]
    fn reorg_can_be_entered_from_any_state_and_returns_to_header_sync() {
        let mut machine = SyncMachine::new(SyncConfig::default());
        machine.begin_reorg();
        assert_eq!(machine.state(), SyncState::ReorgHandling);
        machine.resume_after_reorg().unwrap();
        assert_eq!(machine.state(), SyncState::HeaderSync);
    }

    #[test]
    fn stop_sync_returns_to_discovering() {
        let mut machine = SyncMachine::new(SyncConfig::default());
        machine.begin_negotiating(3).unwrap();
        machine.stop_sync();
        assert_eq!(machine.state(), SyncState::Discovering);
    }

    #[test]
    fn header_batch_must_link_sequentially() {
        let machine = SyncMachine::new(SyncConfig::default());
        let tip = genesis();
        let coinbase = UTXOTransaction::coinbase(LockingScript::Address("lora1b".to_string()), 10, 1);
        let wrong_index = B::new(5, 1, tip.hash, 1, None, vec![coinbase]);
        assert!(machine.validate_header_batch(&tip, &[wrong_index]).is_err());
    }

    #[test]
    fn mempool_diff_returns_only_missing_ids() {
        let local = vec!["a".to_string(), "b".to_string()];
        let remote = vec!["a".to_string(), "c".to_string()];
        assert_eq!(SyncMachine::mempool_diff(&local, &remote), vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn checkpoint_persists_across_a_fresh_machine() {
        let store = persistence::MemoryStore::new();
        let mut machine = SyncMachine::new(SyncConfig::default());
        machine.advance_header_checkpoint(42);
        machine.persist_checkpoint(&store).await.unwrap();

        let mut resumed = SyncMachine::new(SyncConfig::default());
        assert!(resumed.load_and_resume(&store).await.unwrap());
        assert_eq!(resumed.state(), SyncState::HeaderSync);
        assert_eq!(resumed.checkpoint().header_height, 42);
    }

    #[tokio::test]
    async fn load_and_resume_is_a_no_op_when_nothing_was_persisted() {
        let store = persistence::MemoryStore::new();
        let mut machine = SyncMachine::new(SyncConfig::default());
        assert!(!machine.load_and_resume(&store).await.unwrap());
        assert_eq!(machine.state(), SyncState::Discovering);
    }
}
