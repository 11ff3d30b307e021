//! The fixed, closed set of storage sublevels and their normative key
//! prefixes.

/// A namespace within the store. Each sublevel maps to its own
/// physical tree (disk) or map (memory), so batches within a single
/// sublevel are atomic independent of what happens in any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sublevel {
    Blocks,
    UtxoTransactions,
    UtxoSet,
    PendingUtxoTx,
    Metadata,
    Config,
    Nodes,
    CryptoKeys,
    Genesis,
    GenMeta,
    GenUtxo,
}

impl Sublevel {
    /// The tree/map name this sublevel is stored under.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::UtxoTransactions => "utxo_transactions",
            Self::UtxoSet => "utxo_set",
            Self::PendingUtxoTx => "pending_utxo_tx",
            Self::Metadata => "metadata",
            Self::Config => "config",
            Self::Nodes => "nodes",
            Self::CryptoKeys => "crypto_keys",
            Self::Genesis => "genesis",
            Self::GenMeta => "gen_meta",
            Self::GenUtxo => "gen_utxo",
        }
    }

    /// The normative key prefix used for keys stored in this sublevel.
    #[must_use]
    pub const fn key_prefix(self) -> &'static str {
        match self {
            Self::Blocks => "block:",
            Self::UtxoTransactions => "utxo_tx:",
            Self::UtxoSet => "utxo:",
            Self::PendingUtxoTx => "pending:",
            Self::Metadata => "meta:",
            Self::Config => "config:",
            Self::Nodes => "node:",
            Self::CryptoKeys => "keypair:",
            Self::Genesis => "genesis:",
            Self::GenMeta => "gen_meta:",
            Self::GenUtxo => "gen_utxo:",
        }
    }

    /// Prefixes a bare key with this sublevel's normative prefix,
    /// unless it is already prefixed.
    #[must_use]
    pub fn namespaced_key(self, key: &str) -> String {
        if key.starts_with(self.key_prefix()) {
            key.to_string()
        } else {
            format!("{}{key}", self.key_prefix())
        }
    }

    pub const ALL: [Self; 11] = [
        Self::Blocks,
        Self::UtxoTransactions,
        Self::UtxoSet,
        Self::PendingUtxoTx,
        Self::Metadata,
        Self::Config,
        Self::Nodes,
        Self::CryptoKeys,
        Self::Genesis,
        Self::GenMeta,
        Self::GenUtxo,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_key_applies_prefix_once() {
        assert_eq!(Sublevel::Blocks.namespaced_key("42"), "block:42");
        assert_eq!(Sublevel::Blocks.namespaced_key("block:42"), "block:42");
    }

    #[test]
    fn every_sublevel_has_a_distinct_prefix() {
        let prefixes: std::collections::HashSet<_> = Sublevel::ALL.iter().map(|s| s.key_prefix()).collect();
        assert_eq!(prefixes.len(), Sublevel::ALL.len());
    }
}
