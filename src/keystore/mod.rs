//! Account and key management
//!
//! This module provides:
//! - Account creation and restore for Solana and BSC
//! - In-memory account store
//! - Password-encrypted backups on disk
//! - Sealed per-deal client shares

pub mod account;
pub mod deal_shares;
pub mod encrypted;
pub mod loader;
pub mod memory;

pub use account::{Account, Chain, KeyManager};
pub use deal_shares::{DealShareRecord, DealShareStore};
pub use encrypted::{EncryptedKeyFile, EncryptedStorage, KdfParams};
pub use loader::BackupLoader;
pub use memory::{AccountInfo, AccountStore};
