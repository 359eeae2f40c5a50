//! In-memory account store
//!
//! Holds the accounts the local holder has unlocked, keyed by public key,
//! along with which one is currently selected.

use crate::errors::{EscrowSignError, Result};
use crate::keystore::account::{Account, Chain};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Public metadata about a stored account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub public_key: String,
    pub chain: Chain,
}

impl From<&Account> for AccountInfo {
    fn from(account: &Account) -> Self {
        Self {
            public_key: account.public_key().to_string(),
            chain: account.chain(),
        }
    }
}

/// In-memory account store
pub struct AccountStore {
    /// Map of public key -> account
    accounts: RwLock<HashMap<String, Account>>,
    /// Public key of the selected account
    current: RwLock<Option<String>>,
}

fn poisoned<T>(_: PoisonError<T>) -> EscrowSignError {
    EscrowSignError::InternalError("Account store lock poisoned".to_string())
}

impl AccountStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
        }
    }

    /// Add an account, replacing any account with the same public key
    pub fn insert(&self, account: Account) -> Result<AccountInfo> {
        let info = AccountInfo::from(&account);
        self.accounts
            .write()
            .map_err(poisoned)?
            .insert(info.public_key.clone(), account);

        debug!("Stored {} account {}", info.chain, info.public_key);
        Ok(info)
    }

    /// Get a copy of an account
    pub fn get(&self, public_key: &str) -> Result<Account> {
        self.accounts
            .read()
            .map_err(poisoned)?
            .get(public_key)
            .cloned()
            .ok_or_else(|| EscrowSignError::KeyNotFound(public_key.to_string()))
    }

    /// Remove an account, clearing the selection if it pointed at it
    pub fn remove(&self, public_key: &str) -> Result<()> {
        let removed = self.accounts.write().map_err(poisoned)?.remove(public_key);
        if removed.is_none() {
            return Err(EscrowSignError::KeyNotFound(public_key.to_string()));
        }

        let mut current = self.current.write().map_err(poisoned)?;
        if current.as_deref() == Some(public_key) {
            *current = None;
        }

        debug!("Removed account {}", public_key);
        Ok(())
    }

    /// List all stored accounts
    pub fn list(&self) -> Result<Vec<AccountInfo>> {
        let accounts = self.accounts.read().map_err(poisoned)?;
        let mut infos: Vec<AccountInfo> = accounts.values().map(AccountInfo::from).collect();
        infos.sort_by(|a, b| a.public_key.cmp(&b.public_key));
        Ok(infos)
    }

    pub fn contains(&self, public_key: &str) -> Result<bool> {
        Ok(self.accounts.read().map_err(poisoned)?.contains_key(public_key))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.accounts.read().map_err(poisoned)?.len())
    }

    /// Select the current account
    pub fn set_current(&self, public_key: &str) -> Result<()> {
        if !self.contains(public_key)? {
            return Err(EscrowSignError::KeyNotFound(public_key.to_string()));
        }
        *self.current.write().map_err(poisoned)? = Some(public_key.to_string());
        Ok(())
    }

    /// The selected account, if any
    pub fn current(&self) -> Result<Option<Account>> {
        let current = self.current.read().map_err(poisoned)?;
        match current.as_deref() {
            Some(public_key) => self.get(public_key).map(Some),
            None => Ok(None),
        }
    }
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::account::KeyManager;

    #[test]
    fn test_insert_and_get() {
        let store = AccountStore::new();
        let account = KeyManager::create(Chain::Solana).unwrap();

        let info = store.insert(account.clone()).unwrap();
        assert_eq!(info.chain, Chain::Solana);
        assert_eq!(store.len().unwrap(), 1);

        let loaded = store.get(account.public_key()).unwrap();
        assert_eq!(loaded.private_key(), account.private_key());
    }

    #[test]
    fn test_missing_account() {
        let store = AccountStore::new();
        assert!(matches!(store.get("nope"), Err(EscrowSignError::KeyNotFound(_))));
        assert!(matches!(store.remove("nope"), Err(EscrowSignError::KeyNotFound(_))));
        assert!(matches!(store.set_current("nope"), Err(EscrowSignError::KeyNotFound(_))));
    }

    #[test]
    fn test_current_selection() {
        let store = AccountStore::new();
        assert!(store.current().unwrap().is_none());

        let sol = KeyManager::create(Chain::Solana).unwrap();
        let bsc = KeyManager::create(Chain::Bsc).unwrap();
        store.insert(sol.clone()).unwrap();
        store.insert(bsc.clone()).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);

        store.set_current(bsc.public_key()).unwrap();
        let current = store.current().unwrap().unwrap();
        assert_eq!(current.public_key(), bsc.public_key());

        store.remove(bsc.public_key()).unwrap();
        assert!(store.current().unwrap().is_none());
        assert!(store.contains(sol.public_key()).unwrap());
    }
}
