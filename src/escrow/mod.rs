//! Deal secret management
//!
//! - Content key creation, 2-of-2 distribution and verified recovery
//! - Deal content sealing under the recovered key
//! - Out-of-band share payloads

pub mod content;
pub mod coordinator;
pub mod shareable;

pub use coordinator::{
    checksum, ContentKey, EncryptedSecretEnvelope, EscrowKeyCoordinator, EscrowSecret,
    ResharedSecret, SecretState,
};
pub use shareable::{ShareableCommand, ShareableDeal};
