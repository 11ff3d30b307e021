//! The normative sync wire protocol v2.0.0 envelope: every message
//! exchanged between nodes carries this shape, separate from the
//! lighter `protocol::Envelope` used purely for loop-prevention
//! metadata around a forwarded `MeshPayload`.

use crate::priority::Priority;
use crate::protocol::MeshPayload;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use shared::crypto::{KeyPair, PublicKey, Signature, SignatureAlgorithm};
use shared::{BlockchainError, Result};
use std::io::{Read, Write};

pub const WIRE_PROTOCOL_VERSION: &str = "2.0.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePayload {
    /// Compression applied to `data`: `"gzip"` or `"none"`.
    pub algorithm: String,
    pub original_size: usize,
    pub compressed_size: usize,
    pub data: Vec<u8>,
    pub dictionary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentInfo {
    pub message_id: String,
    pub sequence_number: u16,
    pub total_fragments: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutyCycleInfo {
    pub current_duty_cycle: f64,
    pub region_max_duty_cycle: Option<f64>,
}

/// The wire-level envelope. Signature covers the canonical
/// serialization of every other field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub version: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: i64,
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
    pub payload: WirePayload,
    pub priority: Priority,
    pub fragment_info: Option<FragmentInfo>,
    pub duty_cycle_info: Option<DutyCycleInfo>,
}

#[derive(Serialize)]
struct SignedFields<'a> {
    version: &'a str,
    message_type: &'a str,
    timestamp: i64,
    public_key: &'a [u8],
    payload: &'a WirePayload,
    priority: Priority,
    fragment_info: &'a Option<FragmentInfo>,
    duty_cycle_info: &'a Option<DutyCycleInfo>,
}

fn ser_err(e: impl std::fmt::Display) -> BlockchainError {
    BlockchainError::SerializationError(e.to_string())
}

/// Ed25519 public keys are 32 bytes; secp256k1 compressed public keys
/// are 33. There is no third option in this node's signature stack.
fn algorithm_from_public_key_len(len: usize) -> Result<SignatureAlgorithm> {
    match len {
        32 => Ok(SignatureAlgorithm::Ed25519),
        33 => Ok(SignatureAlgorithm::Secp256k1),
        other => Err(BlockchainError::InvalidConfig(format!("cannot infer a signature algorithm from a {other}-byte public key"))),
    }
}

fn gzip(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw).map_err(ser_err)?;
    encoder.finish().map_err(ser_err)
}

fn gunzip(compressed: &[u8], original_size: usize) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::with_capacity(original_size);
    decoder.read_to_end(&mut out).map_err(|e| BlockchainError::Corrupt(e.to_string()))?;
    Ok(out)
}

impl WireEnvelope {
    /// Builds and signs an envelope carrying `mesh_payload`, gzip-compressing
    /// the serialized payload whenever that is smaller than leaving it raw.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, compression, or signing fails.
    pub fn encode(
        mesh_payload: &MeshPayload,
        keypair: &KeyPair,
        priority: Priority,
        timestamp: i64,
        fragment_info: Option<FragmentInfo>,
        duty_cycle_info: Option<DutyCycleInfo>,
    ) -> Result<Self> {
        let raw = bincode::serialize(mesh_payload).map_err(ser_err)?;
        let original_size = raw.len();
        let compressed = gzip(&raw)?;

        let (algorithm, data, compressed_size) = if compressed.len() < original_size {
            let len = compressed.len();
            ("gzip".to_string(), compressed, len)
        } else {
            ("none".to_string(), raw, original_size)
        };

        let wire_payload = WirePayload { algorithm, original_size, compressed_size, data, dictionary: None };
        let message_type = mesh_payload.kind_name().to_string();
        let public_key = keypair.public_key.as_bytes().to_vec();

        let signed = SignedFields {
            version: WIRE_PROTOCOL_VERSION,
            message_type: &message_type,
            timestamp,
            public_key: &public_key,
            payload: &wire_payload,
            priority,
            fragment_info: &fragment_info,
            duty_cycle_info: &duty_cycle_info,
        };
        let preimage = bincode::serialize(&signed).map_err(ser_err)?;
        let signature = keypair.sign(&preimage)?;

        Ok(Self {
            version: WIRE_PROTOCOL_VERSION.to_string(),
            message_type,
            timestamp,
            signature: signature.as_bytes().to_vec(),
            public_key,
            payload: wire_payload,
            priority,
            fragment_info,
            duty_cycle_info,
        })
    }

    /// Verifies the envelope's protocol version and signature, then
    /// decodes its payload back into a `MeshPayload`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an unsupported protocol version,
    /// `Unauthorized` if the signature does not verify, or `Corrupt`
    /// if decompression or deserialization of the payload fails.
    pub fn decode_and_verify(&self) -> Result<MeshPayload> {
        if self.version != WIRE_PROTOCOL_VERSION {
            return Err(BlockchainError::InvalidConfig(format!("unsupported wire protocol version {}", self.version)));
        }

        let algorithm = algorithm_from_public_key_len(self.public_key.len())?;
        let public_key = PublicKey::from_bytes(self.public_key.clone(), algorithm)?;

        let signed = SignedFields {
            version: &self.version,
            message_type: &self.message_type,
            timestamp: self.timestamp,
            public_key: &self.public_key,
            payload: &self.payload,
            priority: self.priority,
            fragment_info: &self.fragment_info,
            duty_cycle_info: &self.duty_cycle_info,
        };
        let preimage = bincode::serialize(&signed).map_err(ser_err)?;
        let signature = Signature::from_parts(self.signature.clone(), public_key, algorithm);
        if !signature.verify(&preimage)? {
            return Err(BlockchainError::Unauthorized("wire envelope signature does not verify".to_string()));
        }

        let raw = match self.payload.algorithm.as_str() {
            "gzip" => gunzip(&self.payload.data, self.payload.original_size)?,
            _ => self.payload.data.clone(),
        };
        bincode::deserialize(&raw).map_err(|e| BlockchainError::Corrupt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bond_core::UTXOTransaction;
    use shared::crypto::SignatureAlgorithm as Algo;

    #[test]
    fn encode_then_decode_round_trips_a_payload() {
        let keypair = KeyPair::generate(Algo::Ed25519).unwrap();
        let payload = MeshPayload::Transaction(UTXOTransaction::coinbase(bond_core::script::LockingScript::Address("lora1a".to_string()), 10, 0));

        let envelope = WireEnvelope::encode(&payload, &keypair, Priority::Normal, 1_700_000_000, None, None).unwrap();
        assert_eq!(envelope.version, WIRE_PROTOCOL_VERSION);
        assert_eq!(envelope.message_type, "transaction");

        let decoded = envelope.decode_and_verify().unwrap();
        match decoded {
            MeshPayload::Transaction(tx) => assert_eq!(tx.id, match &payload { MeshPayload::Transaction(t) => t.id, _ => unreachable!() }),
            _ => panic!("expected a transaction payload"),
        }
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let keypair = KeyPair::generate(Algo::Ed25519).unwrap();
        let payload = MeshPayload::PeerListRequest;
        let mut envelope = WireEnvelope::encode(&payload, &keypair, Priority::Low, 1_700_000_000, None, None).unwrap();
        envelope.timestamp += 1;
        assert!(envelope.decode_and_verify().is_err());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let keypair = KeyPair::generate(Algo::Ed25519).unwrap();
        let mut envelope = WireEnvelope::encode(&MeshPayload::PeerListRequest, &keypair, Priority::Low, 0, None, None).unwrap();
        envelope.version = "1.0.0".to_string();
        assert!(envelope.decode_and_verify().is_err());
    }
}
