//! Sublevel-scoped key-value persistence for the node: a fixed,
//! closed namespace of sublevels, each backed by its own tree with its
//! own atomic batches, sitting behind a disk (`sled`) or in-memory
//! implementation of the same [`Store`] trait.

pub mod kv;
pub mod memory;
pub mod sled_store;
pub mod store;
pub mod sublevel;
pub mod value;

pub use kv::{BatchOp, KeyValue};
pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use store::Store;
pub use sublevel::Sublevel;
