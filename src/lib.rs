//! escrowsign - escrow key recovery and multi-chain transaction signing
//!
//! The core of an escrow marketplace client:
//! - Solana and BSC account creation and restore
//! - 2-of-2 threshold sharing of each deal's content key, with a
//!   self-addressed envelope so the owner can always re-share
//! - Checksum-gated recovery of the content key by the counterparty
//! - Partial signing of multi-signer Solana transactions and hash signing
//!   of BSC transactions
//!
//! # Security
//!
//! - Private keys, shares and content keys are zeroed on drop
//! - Recovered content keys can be held in memory-locked pages
//! - Account backups are encrypted with AES-256-GCM under an Argon2id key
//! - A recovered key is never returned unless its checksum matches

pub mod config;
pub mod crypto;
pub mod errors;
pub mod escrow;
pub mod keystore;
pub mod security;
pub mod signer;

pub use config::Config;
pub use errors::{EscrowSignError, Result};
pub use escrow::{
    ContentKey, EncryptedSecretEnvelope, EscrowKeyCoordinator, EscrowSecret, ResharedSecret,
    SecretState, ShareableDeal,
};
pub use keystore::{Account, Chain, KeyManager};
pub use signer::{SignedTransaction, TransactionKind, TransactionRequest, TransactionSigner, TxSignature};
