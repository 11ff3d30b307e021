pub mod canonical;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use crypto::{
    public_key_from_bytes, sign_message, verify_message, KeyPair, PrivateKey, PublicKey,
    Signature, SignatureAlgorithm,
};
pub use error::{BlockchainError, ErrorCode};
pub use hash::Hash256;

pub type Result<T> = std::result::Result<T, BlockchainError>;
