//! Value encoding: bincode, optionally gzip-framed.

use serde::{de::DeserializeOwned, Serialize};
use shared::{BlockchainError, Result};
use std::io::{Read, Write};

/// Magic byte prepended to gzip-framed values so a reader can tell a
/// compressed value from a raw bincode one without an out-of-band flag.
const GZIP_MAGIC: u8 = 0x1f;

/// Encodes a value as bincode, gzip-framing it when `compress` is set.
pub fn encode<T: Serialize>(value: &T, compress: bool) -> Result<Vec<u8>> {
    let raw = bincode::serialize(value).map_err(|e| BlockchainError::SerializationError(e.to_string()))?;
    if !compress {
        return Ok(raw);
    }
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&raw)
        .map_err(|e| BlockchainError::IoFailure(e.to_string()))?;
    let framed = encoder.finish().map_err(|e| BlockchainError::IoFailure(e.to_string()))?;
    Ok(framed)
}

/// Decodes a value previously produced by [`encode`], transparently
/// detecting the gzip frame by its magic byte.
///
/// # Errors
///
/// Returns `Corrupt` if the bytes are neither valid bincode nor a
/// valid gzip-framed bincode payload. Callers reading from the store
/// are expected to downgrade `Corrupt` to a logged warning and a
/// not-found result rather than propagate it as fatal.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let raw = if bytes.first() == Some(&GZIP_MAGIC) {
        let mut decoder = flate2::read::GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| BlockchainError::Corrupt(format!("gzip frame: {e}")))?;
        out
    } else {
        bytes.to_vec()
    };
    bincode::deserialize(&raw).map_err(|e| BlockchainError::Corrupt(format!("bincode payload: {e}")))
}
