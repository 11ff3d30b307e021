use shared::BlockchainError;
use thiserror::Error;

/// Crate-local errors for `bond-core`, converting from the shared
/// cross-cutting taxonomy where the crate doesn't need a dedicated
/// variant.
#[derive(Error, Debug)]
pub enum BondError {
    #[error("script error: {0}")]
    Script(String),

    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
}

pub type BondResult<T> = std::result::Result<T, BondError>;
