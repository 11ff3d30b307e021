//! Canonical serialization used everywhere a hash preimage is produced.
//!
//! Hashes must be byte-identical across platforms, so the encoding is
//! pinned rather than left to serde's defaults: struct field order is
//! the order fields are declared (serde_json preserves this for
//! structs, never reorders to lexicographic key order), output is
//! compact (no pretty-printing, no trailing whitespace), integers are
//! written as plain decimal, and any field that should vanish when
//! absent — the block header's `validator` — is annotated
//! `#[serde(skip_serializing_if = "Option::is_none")]` so it never
//! renders `null`.

use crate::BlockchainError;
use serde::Serialize;

/// Serializes `value` to the canonical compact JSON byte form used as
/// a hash preimage.
///
/// # Errors
///
/// Returns an error if `value`'s `Serialize` implementation fails.
pub fn to_preimage<T: Serialize>(value: &T) -> Result<Vec<u8>, BlockchainError> {
    serde_json::to_vec(value).map_err(|e| BlockchainError::SerializationError(e.to_string()))
}
