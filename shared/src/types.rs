//! Wire-safe types shared across the workspace.

use serde::{Deserialize, Serialize};

pub type TxId = crate::Hash256;
pub type BlockId = crate::Hash256;
pub type Amount = u64;
pub type Timestamp = i64;
pub type BlockHeight = u64;
pub type OutputIndex = u32;

/// Reference to a transaction output (the UTXO primary key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub vout: OutputIndex,
}

impl OutPoint {
    #[must_use]
    pub const fn new(txid: TxId, vout: OutputIndex) -> Self {
        Self { txid, vout }
    }
}

/// Network type, carried in `GenesisConfig.metadata.network_type`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Mainnet,
    Testnet,
    #[default]
    Devnet,
    Private,
}

/// Radio regulatory region, one of the closed set named in the
/// environment/config contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    Eu,
    Us,
    Ca,
    Mx,
    Au,
    Nz,
    Jp,
    In,
    Cn,
    Kr,
    Br,
    Ar,
    Ru,
    Za,
    Custom,
}

impl Default for Region {
    fn default() -> Self {
        Self::Eu
    }
}

/// Global node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub network: NetworkType,
    pub region: Region,
    pub p2p_port: u16,
    pub bind_address: String,
    pub bootstrap_peers: Vec<String>,
    pub data_dir: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: NetworkType::Devnet,
            region: Region::Eu,
            p2p_port: 8333,
            bind_address: "127.0.0.1".to_string(),
            bootstrap_peers: vec![],
            data_dir: "./data".to_string(),
        }
    }
}

/// Information about a mesh or internet peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: String,
    pub address: String,
    pub height: BlockHeight,
    pub protocol_version: String,
    pub last_seen: Timestamp,
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outpoint_round_trips() {
        let txid = crate::Hash256::zero();
        let outpoint = OutPoint::new(txid, 3);
        assert_eq!(outpoint.txid, txid);
        assert_eq!(outpoint.vout, 3);
    }

    #[test]
    fn node_config_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.network, NetworkType::Devnet);
        assert_eq!(config.p2p_port, 8333);
    }

    #[test]
    fn network_type_serializes_lowercase() {
        let json = serde_json::to_string(&NetworkType::Mainnet).unwrap();
        assert_eq!(json, "\"mainnet\"");
    }
}
