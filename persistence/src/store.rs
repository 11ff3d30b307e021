//! The sublevel-scoped key-value store contract.

use crate::kv::{BatchOp, KeyValue};
use crate::sublevel::Sublevel;
use crate::value;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use shared::Result;

/// A sublevel-scoped, batch-capable key-value store.
///
/// Implementations guarantee atomicity of a [`Store::batch`] call only
/// within a single sublevel: a batch spanning several sublevels is
/// applied as one atomic write per sublevel, not as one atomic write
/// across all of them.
///
/// `iterate` returns a bounded page rather than a true lazy stream;
/// callers page through a sublevel by re-issuing it with `start` set
/// to the key just past the last one returned, which is the same
/// restartable-cursor shape a true async iterator would expose.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, sublevel: Sublevel, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, sublevel: Sublevel, key: &str, value: Vec<u8>) -> Result<()>;

    async fn del(&self, sublevel: Sublevel, key: &str) -> Result<()>;

    /// Applies every operation, grouped and committed atomically per
    /// sublevel.
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()>;

    /// Returns up to `limit` entries from `sublevel` with keys in
    /// `[start, end)` (or `(end, start]` when `reverse` is set),
    /// ordered by key.
    async fn iterate(
        &self,
        sublevel: Sublevel,
        start: Option<&str>,
        end: Option<&str>,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<KeyValue>>;

    /// Reads and deserializes a bincode-encoded value. A deserialization
    /// failure is logged and downgraded to `Ok(None)` rather than
    /// propagated, per the store's corrupt-read contract: a single
    /// damaged record must not make an otherwise-healthy sublevel
    /// unreadable.
    async fn get_typed<T: DeserializeOwned + Send>(&self, sublevel: Sublevel, key: &str) -> Result<Option<T>>
    where
        Self: Sized,
    {
        let Some(bytes) = self.get(sublevel, key).await? else {
            return Ok(None);
        };
        match value::decode::<T>(&bytes) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                tracing::warn!(sublevel = sublevel.name(), key, error = %e, "corrupt record downgraded to not-found");
                Ok(None)
            }
        }
    }

    async fn put_typed<T: Serialize + Sync>(
        &self,
        sublevel: Sublevel,
        key: &str,
        value: &T,
        compress: bool,
    ) -> Result<()>
    where
        Self: Sized,
    {
        let bytes = value::encode(value, compress)?;
        self.put(sublevel, key, bytes).await
    }
}
