use thiserror::Error;

/// Machine-readable error codes surfaced alongside every user-visible
/// failure, independent of the human-readable message carried by the
/// variant itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    InvalidBlock,
    InvalidTransaction,
    InvalidFragment,
    InvalidConfig,
    InvalidProof,
    InvalidAddress,
    IntegrityViolation,
    Exhausted,
    Timeout,
    Unauthorized,
    IoFailure,
    Corrupt,
    Internal,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidBlock => "INVALID_BLOCK",
            Self::InvalidTransaction => "INVALID_TRANSACTION",
            Self::InvalidFragment => "INVALID_FRAGMENT",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::InvalidProof => "INVALID_PROOF",
            Self::InvalidAddress => "INVALID_ADDRESS",
            Self::IntegrityViolation => "INTEGRITY_VIOLATION",
            Self::Exhausted => "EXHAUSTED",
            Self::Timeout => "TIMEOUT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::IoFailure => "IO_FAILURE",
            Self::Corrupt => "CORRUPT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cross-cutting error taxonomy shared by every crate in the workspace.
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid fragment: {0}")]
    InvalidFragment(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("resource exhausted: {0}")]
    Exhausted(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("cryptographic error: {0}")]
    CryptographicError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BlockchainError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidBlock(_) => ErrorCode::InvalidBlock,
            Self::InvalidTransaction(_) => ErrorCode::InvalidTransaction,
            Self::InvalidFragment(_) => ErrorCode::InvalidFragment,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::InvalidProof(_) => ErrorCode::InvalidProof,
            Self::InvalidAddress(_) => ErrorCode::InvalidAddress,
            Self::IntegrityViolation(_) => ErrorCode::IntegrityViolation,
            Self::Exhausted(_) => ErrorCode::Exhausted,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::IoFailure(_) | Self::NetworkError(_) => ErrorCode::IoFailure,
            Self::Corrupt(_) => ErrorCode::Corrupt,
            Self::CryptographicError(_) | Self::SerializationError(_) | Self::Internal(_) => {
                ErrorCode::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_matches_variant() {
        let err = BlockchainError::NotFound("utxo".into());
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.code().as_str(), "NOT_FOUND");
    }

    #[test]
    fn corrupt_and_timeout_codes() {
        assert_eq!(
            BlockchainError::Corrupt("bad msgpack".into()).code(),
            ErrorCode::Corrupt
        );
        assert_eq!(
            BlockchainError::Timeout("sync phase".into()).code(),
            ErrorCode::Timeout
        );
    }
}
