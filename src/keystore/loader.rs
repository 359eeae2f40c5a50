//! Backup loader
//!
//! Moves accounts between password-encrypted backups on disk and the
//! in-memory account store.

use crate::errors::{EscrowSignError, Result};
use crate::keystore::account::KeyManager;
use crate::keystore::encrypted::{EncryptedKeyFile, EncryptedStorage, KdfParams};
use crate::keystore::memory::{AccountInfo, AccountStore};
use crate::keystore::Account;
use secrecy::SecretString;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Bridges encrypted backup storage and the in-memory store
pub struct BackupLoader {
    storage: EncryptedStorage,
    account_store: Arc<AccountStore>,
    kdf: KdfParams,
}

impl BackupLoader {
    pub fn new(
        storage_path: impl AsRef<Path>,
        account_store: Arc<AccountStore>,
        kdf: KdfParams,
    ) -> Result<Self> {
        kdf.validate()?;
        let storage = EncryptedStorage::new(storage_path)?;
        Ok(Self {
            storage,
            account_store,
            kdf,
        })
    }

    /// Write an encrypted backup of `account`
    pub fn backup(&self, account: &Account, password: &SecretString) -> Result<()> {
        if self.storage.exists(account.public_key()) {
            return Err(EscrowSignError::KeyAlreadyExists(account.public_key().to_string()));
        }

        let encrypted = EncryptedKeyFile::seal(account, password, self.kdf)?;
        self.storage.store(&encrypted)?;

        info!("Backed up {} account {}", account.chain(), account.public_key());
        Ok(())
    }

    /// Decrypt one backup and place the account in the store
    pub fn restore(&self, public_key: &str, password: &SecretString) -> Result<AccountInfo> {
        debug!("Restoring backup: {}", public_key);

        let encrypted = self.storage.load(public_key)?;
        let private_key = encrypted.decrypt(password)?;
        let account = KeyManager::from_private_key_bytes(&private_key, encrypted.chain)?;

        if account.public_key() != encrypted.public_key {
            return Err(EscrowSignError::InvalidPublicKey(format!(
                "Backup {} decrypts to a different account {}",
                encrypted.public_key,
                account.public_key()
            )));
        }

        self.account_store.insert(account)
    }

    /// Restore every backup that opens with `password`
    ///
    /// Backups that fail are logged and skipped.
    pub fn restore_all(&self, password: &SecretString) -> Result<Vec<AccountInfo>> {
        let public_keys = self.storage.list()?;
        let mut loaded = Vec::new();
        let mut failed = Vec::new();

        info!("Found {} account backups to restore", public_keys.len());

        for public_key in &public_keys {
            match self.restore(public_key, password) {
                Ok(info) => loaded.push(info),
                Err(e) => {
                    error!("Failed to restore backup {}: {}", public_key, e);
                    failed.push(public_key.clone());
                }
            }
        }

        if !failed.is_empty() {
            warn!("Failed to restore {} backups: {:?}", failed.len(), failed);
        }

        info!("Restored {}/{} backups", loaded.len(), public_keys.len());
        Ok(loaded)
    }

    pub fn remove_backup(&self, public_key: &str) -> Result<()> {
        self.storage.delete(public_key)?;
        info!("Removed backup: {}", public_key);
        Ok(())
    }

    pub fn exists_in_backup(&self, public_key: &str) -> bool {
        self.storage.exists(public_key)
    }

    pub fn list_backups(&self) -> Result<Vec<String>> {
        self.storage.list()
    }

    pub fn account_store(&self) -> &Arc<AccountStore> {
        &self.account_store
    }
}
