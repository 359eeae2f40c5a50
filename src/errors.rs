//! Error types for escrowsign

use thiserror::Error;

/// Main error type for escrowsign operations
#[derive(Error, Debug)]
pub enum EscrowSignError {
    // Key management errors
    #[error("Key generation failed: {0}")]
    GenerationFailed(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Key already exists: {0}")]
    KeyAlreadyExists(String),

    // Secret sharing errors
    #[error("Insufficient shares: have {have}, need {need}")]
    InsufficientShares { have: usize, need: usize },

    #[error("Corrupt share: {0}")]
    Corrupt(String),

    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    // Cryptographic errors
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    // Chain-specific errors
    #[error("Unsupported operation: {kind} on {chain}")]
    UnsupportedOperation { kind: String, chain: String },

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    // Storage errors
    #[error("Storage error: {0}")]
    StorageError(String),

    // Security errors
    #[error("Memory lock failed: {0}")]
    MemoryLockFailed(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for EscrowSignError {
    fn from(err: std::io::Error) -> Self {
        EscrowSignError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for EscrowSignError {
    fn from(err: serde_json::Error) -> Self {
        EscrowSignError::InvalidData(format!("JSON error: {}", err))
    }
}

impl From<hex::FromHexError> for EscrowSignError {
    fn from(err: hex::FromHexError) -> Self {
        EscrowSignError::InvalidKeyFormat(format!("Hex decode error: {}", err))
    }
}

impl From<base64::DecodeError> for EscrowSignError {
    fn from(err: base64::DecodeError) -> Self {
        EscrowSignError::InvalidData(format!("Base64 decode error: {}", err))
    }
}

impl EscrowSignError {
    /// True for failures that mean a recovered key must not be trusted
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            EscrowSignError::InvalidSecretKey(_)
                | EscrowSignError::Corrupt(_)
                | EscrowSignError::InvalidData(_)
                | EscrowSignError::DecryptionFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EscrowSignError>;
