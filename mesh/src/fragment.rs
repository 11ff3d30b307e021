//! Wire fragment format and the fragmenter that chops an arbitrary
//! payload into sub-256-byte authenticated pieces.

use shared::crypto::{KeyPair, SignatureAlgorithm};
use shared::{BlockchainError, Result};

/// Fixed header size in bytes (everything before the payload).
pub const HEADER_LEN: usize = 59;
/// Hard cap on a full frame (header + payload) enforced by the radio link.
pub const MAX_FRAME_LEN: usize = 256;
/// Largest payload a single fragment can carry.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - HEADER_LEN;

const FLAG_LAST: u8 = 0b01;
const FLAG_REQUIRES_ACK: u8 = 0b10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentHeader {
    pub message_id: [u8; 16],
    pub sequence_number: u16,
    pub total_fragments: u16,
    pub fragment_size: u16,
    pub flags: u8,
    pub checksum: u32,
    /// First 32 bytes of a 64-byte Ed25519 signature over
    /// `message_id || sequence_number || payload`. Truncated to fit the
    /// header budget: this halves the forgery-resistance of a full
    /// signature and is not a substitute for verifying the
    /// reassembled message at a higher layer.
    pub signature: [u8; 32],
}

impl FragmentHeader {
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.flags & FLAG_LAST != 0
    }

    #[must_use]
    pub const fn requires_ack(&self) -> bool {
        self.flags & FLAG_REQUIRES_ACK != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub header: FragmentHeader,
    pub payload: Vec<u8>,
}

impl Fragment {
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.header.message_id);
        out.extend_from_slice(&self.header.sequence_number.to_le_bytes());
        out.extend_from_slice(&self.header.total_fragments.to_le_bytes());
        out.extend_from_slice(&self.header.fragment_size.to_le_bytes());
        out.push(self.header.flags);
        out.extend_from_slice(&self.header.checksum.to_le_bytes());
        out.extend_from_slice(&self.header.signature);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parses a wire frame into a fragment, returning `None` if the
    /// frame is too short or internally inconsistent (the frame is
    /// then treated as a self-contained JSON message instead).
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }

        let message_id: [u8; 16] = bytes[0..16].try_into().ok()?;
        let sequence_number = u16::from_le_bytes(bytes[16..18].try_into().ok()?);
        let total_fragments = u16::from_le_bytes(bytes[18..20].try_into().ok()?);
        let fragment_size = u16::from_le_bytes(bytes[20..22].try_into().ok()?);
        let flags = bytes[22];
        let checksum = u32::from_le_bytes(bytes[23..27].try_into().ok()?);
        let signature: [u8; 32] = bytes[27..59].try_into().ok()?;
        let payload = bytes[HEADER_LEN..].to_vec();

        if total_fragments == 0 || sequence_number >= total_fragments {
            return None;
        }
        if fragment_size == 0 || fragment_size as usize > MAX_FRAME_LEN {
            return None;
        }
        if fragment_size as usize != payload.len() {
            return None;
        }

        Some(Self {
            header: FragmentHeader { message_id, sequence_number, total_fragments, fragment_size, flags, checksum, signature },
            payload,
        })
    }

    #[must_use]
    pub fn checksum_matches(&self) -> bool {
        crc32fast::hash(&self.payload) == self.header.checksum
    }

    #[must_use]
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

fn signing_message(message_id: &[u8; 16], sequence_number: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + 2 + payload.len());
    buf.extend_from_slice(message_id);
    buf.extend_from_slice(&sequence_number.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Splits a payload into an ordered run of authenticated fragments
/// sharing one random `message_id`.
pub struct Fragmenter;

impl Fragmenter {
    /// Fragments `payload` under `keypair`, which must be an Ed25519
    /// key pair (the fragment signature field is sized for Ed25519's
    /// 64-byte signature, truncated to 32 bytes).
    ///
    /// # Errors
    ///
    /// Returns `InvalidFragment` if `keypair` is not Ed25519, or
    /// `Exhausted` if `payload` would require more than `u16::MAX`
    /// fragments.
    pub fn fragment(payload: &[u8], keypair: &KeyPair, requires_ack: bool) -> Result<Vec<Fragment>> {
        if keypair.private_key.algorithm() != SignatureAlgorithm::Ed25519 {
            return Err(BlockchainError::InvalidFragment(
                "fragment signatures require an Ed25519 key pair".to_string(),
            ));
        }

        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![&payload[0..0]]
        } else {
            payload.chunks(MAX_PAYLOAD_LEN).collect()
        };

        let total_fragments =
            u16::try_from(chunks.len()).map_err(|_| BlockchainError::Exhausted("payload needs too many fragments".to_string()))?;

        let message_id: [u8; 16] = rand::random();
        let mut fragments = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let sequence_number = i as u16;
            let checksum = crc32fast::hash(chunk);
            let message = signing_message(&message_id, sequence_number, chunk);
            let full_signature = keypair.sign(&message)?;
            let mut signature = [0u8; 32];
            signature.copy_from_slice(&full_signature.as_bytes()[..32]);

            let mut flags = 0u8;
            if i + 1 == chunks.len() {
                flags |= FLAG_LAST;
            }
            if requires_ack {
                flags |= FLAG_REQUIRES_ACK;
            }

            fragments.push(Fragment {
                header: FragmentHeader {
                    message_id,
                    sequence_number,
                    total_fragments,
                    fragment_size: chunk.len() as u16,
                    flags,
                    checksum,
                    signature,
                },
                payload: chunk.to_vec(),
            });
        }

        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> KeyPair {
        KeyPair::generate(SignatureAlgorithm::Ed25519).unwrap()
    }

    #[test]
    fn every_fragment_fits_the_frame_budget() {
        let payload = vec![7u8; 1000];
        let fragments = Fragmenter::fragment(&payload, &keypair(), false).unwrap();
        assert!(fragments.len() > 1);
        for fragment in &fragments {
            assert!(fragment.frame_len() <= MAX_FRAME_LEN);
        }
    }

    #[test]
    fn only_the_last_fragment_is_flagged_last() {
        let payload = vec![1u8; 500];
        let fragments = Fragmenter::fragment(&payload, &keypair(), false).unwrap();
        for (i, fragment) in fragments.iter().enumerate() {
            assert_eq!(fragment.header.is_last(), i + 1 == fragments.len());
        }
    }

    #[test]
    fn wire_round_trip_preserves_every_field() {
        let payload = vec![42u8; 50];
        let fragments = Fragmenter::fragment(&payload, &keypair(), true).unwrap();
        let bytes = fragments[0].to_bytes();
        let parsed = Fragment::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, fragments[0]);
        assert!(parsed.header.requires_ack());
        assert!(parsed.checksum_matches());
    }

    #[test]
    fn short_frames_are_not_fragments() {
        assert!(Fragment::from_bytes(&[1, 2, 3]).is_none());
    }

    #[test]
    fn size_inconsistent_frame_is_rejected() {
        let payload = vec![9u8; 10];
        let fragments = Fragmenter::fragment(&payload, &keypair(), false).unwrap();
        let mut bytes = fragments[0].to_bytes();
        bytes.push(0xff); // trailing byte payload no longer matches fragment_size
        assert!(Fragment::from_bytes(&bytes).is_none());
    }
}
