//! Disk-backed store on top of `sled`, one tree per sublevel.

use crate::kv::{BatchOp, KeyValue};
use crate::store::Store;
use crate::sublevel::Sublevel;
use async_trait::async_trait;
use shared::{BlockchainError, Result};
use std::collections::HashMap;

pub struct SledStore {
    db: sled::Db,
    trees: HashMap<Sublevel, sled::Tree>,
}

impl SledStore {
    /// Opens (creating if needed) a sled database at `path`, pre-opening
    /// the tree for every sublevel in the fixed, closed set.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| BlockchainError::IoFailure(e.to_string()))?;
        let mut trees = HashMap::new();
        for sublevel in Sublevel::ALL {
            let tree = db
                .open_tree(sublevel.name())
                .map_err(|e| BlockchainError::IoFailure(e.to_string()))?;
            trees.insert(sublevel, tree);
        }
        Ok(Self { db, trees })
    }

    /// Flushes every tree to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| BlockchainError::IoFailure(e.to_string()))?;
        Ok(())
    }

    fn tree(&self, sublevel: Sublevel) -> &sled::Tree {
        self.trees.get(&sublevel).expect("every sublevel is pre-opened in SledStore::open")
    }
}

#[async_trait]
impl Store for SledStore {
    async fn get(&self, sublevel: Sublevel, key: &str) -> Result<Option<Vec<u8>>> {
        let key = sublevel.namespaced_key(key);
        let tree = self.tree(sublevel);
        let value = tree
            .get(key.as_bytes())
            .map_err(|e| BlockchainError::IoFailure(e.to_string()))?;
        Ok(value.map(|ivec| ivec.to_vec()))
    }

    async fn put(&self, sublevel: Sublevel, key: &str, value: Vec<u8>) -> Result<()> {
        let key = sublevel.namespaced_key(key);
        self.tree(sublevel)
            .insert(key.as_bytes(), value)
            .map_err(|e| BlockchainError::IoFailure(e.to_string()))?;
        Ok(())
    }

    async fn del(&self, sublevel: Sublevel, key: &str) -> Result<()> {
        let key = sublevel.namespaced_key(key);
        self.tree(sublevel)
            .remove(key.as_bytes())
            .map_err(|e| BlockchainError::IoFailure(e.to_string()))?;
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let mut by_sublevel: HashMap<Sublevel, sled::Batch> = HashMap::new();
        for op in ops {
            let sublevel = op.sublevel();
            let batch = by_sublevel.entry(sublevel).or_default();
            match op {
                BatchOp::Put { key, value, .. } => {
                    batch.insert(sublevel.namespaced_key(&key).into_bytes(), value);
                }
                BatchOp::Delete { key, .. } => {
                    batch.remove(sublevel.namespaced_key(&key).into_bytes());
                }
            }
        }
        for (sublevel, batch) in by_sublevel {
            self.tree(sublevel)
                .apply_batch(batch)
                .map_err(|e| BlockchainError::IoFailure(e.to_string()))?;
        }
        Ok(())
    }

    async fn iterate(
        &self,
        sublevel: Sublevel,
        start: Option<&str>,
        end: Option<&str>,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<KeyValue>> {
        let tree = self.tree(sublevel);
        let start = start.map(|s| sublevel.namespaced_key(s));
        let end = end.map(|s| sublevel.namespaced_key(s));
        let mut collected = Vec::new();

        // Forward: [start, end). Reverse: (end, start], walked from the
        // high end down, so `start` acts as the inclusive upper bound.
        let lower = if reverse { end.clone().unwrap_or_default() } else { start.clone().unwrap_or_default() };
        let iter: Box<dyn Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>> = if reverse {
            Box::new(tree.range(lower.into_bytes()..).rev())
        } else {
            Box::new(tree.range(lower.into_bytes()..))
        };

        for entry in iter {
            let (k, v) = entry.map_err(|e| BlockchainError::IoFailure(e.to_string()))?;
            let key = String::from_utf8_lossy(&k).to_string();
            if reverse {
                if let Some(start) = &start {
                    if &key > start {
                        continue;
                    }
                }
            } else if let Some(end) = &end {
                if &key >= end {
                    break;
                }
            }
            collected.push(KeyValue { key, value: v.to_vec() });
            if collected.len() >= limit {
                break;
            }
        }
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_del_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store.put(Sublevel::Blocks, "7", b"block-7".to_vec()).await.unwrap();
        assert_eq!(store.get(Sublevel::Blocks, "7").await.unwrap(), Some(b"block-7".to_vec()));
        store.del(Sublevel::Blocks, "7").await.unwrap();
        assert_eq!(store.get(Sublevel::Blocks, "7").await.unwrap(), None);
    }

    #[tokio::test]
    async fn batch_is_atomic_per_sublevel() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store
            .batch(vec![
                BatchOp::put(Sublevel::UtxoSet, "a", b"1".to_vec()),
                BatchOp::put(Sublevel::UtxoSet, "b", b"2".to_vec()),
                BatchOp::put(Sublevel::Metadata, "height", b"9".to_vec()),
            ])
            .await
            .unwrap();
        assert_eq!(store.get(Sublevel::UtxoSet, "a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(Sublevel::Metadata, "height").await.unwrap(), Some(b"9".to_vec()));
    }

    #[tokio::test]
    async fn iterate_forward_respects_limit_and_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        for i in 0..5u32 {
            store.put(Sublevel::Blocks, &format!("{i:03}"), vec![i as u8]).await.unwrap();
        }
        let page = store.iterate(Sublevel::Blocks, None, Some("003"), 10, false).await.unwrap();
        assert_eq!(page.len(), 3);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.put(Sublevel::Config, "network", b"mainnet".to_vec()).await.unwrap();
            store.flush().unwrap();
        }
        let reopened = SledStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(Sublevel::Config, "network").await.unwrap(), Some(b"mainnet".to_vec()));
    }
}
