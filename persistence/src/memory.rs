//! In-memory store with the same semantics as the disk-backed one,
//! used for tests and for nodes that opt out of persistence.

use crate::kv::{BatchOp, KeyValue};
use crate::store::Store;
use crate::sublevel::Sublevel;
use async_trait::async_trait;
use shared::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    trees: RwLock<HashMap<Sublevel, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, sublevel: Sublevel, key: &str) -> Result<Option<Vec<u8>>> {
        let key = sublevel.namespaced_key(key);
        let trees = self.trees.read().expect("memory store lock poisoned");
        Ok(trees.get(&sublevel).and_then(|tree| tree.get(&key)).cloned())
    }

    async fn put(&self, sublevel: Sublevel, key: &str, value: Vec<u8>) -> Result<()> {
        let key = sublevel.namespaced_key(key);
        let mut trees = self.trees.write().expect("memory store lock poisoned");
        trees.entry(sublevel).or_default().insert(key, value);
        Ok(())
    }

    async fn del(&self, sublevel: Sublevel, key: &str) -> Result<()> {
        let key = sublevel.namespaced_key(key);
        let mut trees = self.trees.write().expect("memory store lock poisoned");
        if let Some(tree) = trees.get_mut(&sublevel) {
            tree.remove(&key);
        }
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let mut trees = self.trees.write().expect("memory store lock poisoned");
        for op in ops {
            match op {
                BatchOp::Put { sublevel, key, value } => {
                    let key = sublevel.namespaced_key(&key);
                    trees.entry(sublevel).or_default().insert(key, value);
                }
                BatchOp::Delete { sublevel, key } => {
                    let key = sublevel.namespaced_key(&key);
                    if let Some(tree) = trees.get_mut(&sublevel) {
                        tree.remove(&key);
                    }
                }
            }
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
        let trees = self.trees.read().expect("memory store lock poisoned");
        let Some(tree) = trees.get(&sublevel) else {
            return Ok(Vec::new());
        };

        let start = start.map(|s| sublevel.namespaced_key(s));
        let end = end.map(|s| sublevel.namespaced_key(s));

        let mut entries: Vec<KeyValue> = tree
            .iter()
            .filter(|(k, _)| start.as_ref().map_or(true, |s| *k >= s))
            .filter(|(k, _)| end.as_ref().map_or(true, |e| *k < e))
            .map(|(k, v)| KeyValue { key: k.clone(), value: v.clone() })
            .collect();

        if reverse {
            entries.reverse();
        }
        entries.truncate(limit);
        Ok(entries)
    }
}
