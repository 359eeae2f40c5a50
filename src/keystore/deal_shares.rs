//! Per-deal storage of the counterparty's share
//!
//! A counterparty keeps the client share it received for each deal so the
//! content key can be recovered again later. Shares are sealed to the local
//! account and written one file per deal, named after the hex of the deal id.

use crate::crypto::envelope;
use crate::crypto::sss::Share;
use crate::errors::{EscrowSignError, Result};
use crate::keystore::{Account, Chain};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FORMAT_VERSION: u32 = 1;

const SHARE_DOMAIN: &[u8] = b"escrowsign/deal-share/v1";

const FILE_PREFIX: &str = "deal_";

/// A deal's client share as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealShareRecord {
    pub version: u32,
    pub deal_id: String,

    /// Account the share is sealed to
    pub owner: String,
    pub chain: Chain,

    /// base64(nonce || AES-256-GCM ciphertext)
    pub sealed_share: String,

    pub created_at: i64,
}

/// Directory of sealed client shares, keyed by deal id
pub struct DealShareStore {
    base_path: PathBuf,
}

impl DealShareStore {
    /// Open (creating if needed) share storage at the given path
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path)?;
        }

        Ok(Self { base_path })
    }

    fn share_path(&self, deal_id: &str) -> Result<PathBuf> {
        if deal_id.is_empty() {
            return Err(EscrowSignError::InvalidData("Deal id is empty".to_string()));
        }
        Ok(self
            .base_path
            .join(format!("{}{}.json", FILE_PREFIX, hex::encode(deal_id))))
    }

    /// Seal `share` to `owner` and store it under `deal_id`, replacing any previous one
    pub fn save(&self, deal_id: &str, share: &Share, owner: &Account) -> Result<()> {
        let key = envelope::derive_key(SHARE_DOMAIN, owner.secret_seed());
        let record = DealShareRecord {
            version: FORMAT_VERSION,
            deal_id: deal_id.to_string(),
            owner: owner.public_key().to_string(),
            chain: owner.chain(),
            sealed_share: envelope::seal_with_key(&key, share.as_bytes())?,
            created_at: chrono::Utc::now().timestamp(),
        };

        let path = self.share_path(deal_id)?;
        fs::write(path, serde_json::to_string_pretty(&record)?)?;

        info!("Stored client share for deal {}", deal_id);
        Ok(())
    }

    /// The share stored for `deal_id`, or `None` when there is none
    pub fn get(&self, deal_id: &str, owner: &Account) -> Result<Option<Share>> {
        let path = self.share_path(deal_id)?;
        if !path.exists() {
            return Ok(None);
        }

        let record: DealShareRecord = serde_json::from_str(&fs::read_to_string(path)?)?;
        if record.version != FORMAT_VERSION {
            return Err(EscrowSignError::DecryptionFailed(format!(
                "Unsupported share record version {}",
                record.version
            )));
        }
        if record.owner != owner.public_key() || record.deal_id != deal_id {
            return Err(EscrowSignError::DecryptionFailed(format!(
                "Share for deal {} belongs to another account",
                deal_id
            )));
        }

        let key = envelope::derive_key(SHARE_DOMAIN, owner.secret_seed());
        let bytes = envelope::open_with_key(&key, &record.sealed_share)?;
        debug!("Loaded client share for deal {}", deal_id);
        Ok(Some(Share::from_bytes(bytes.to_vec())))
    }

    /// Remove the share for `deal_id`; removing a missing share is not an error
    pub fn delete(&self, deal_id: &str) -> Result<()> {
        let path = self.share_path(deal_id)?;
        if path.exists() {
            fs::remove_file(path)?;
            info!("Deleted client share for deal {}", deal_id);
        }
        Ok(())
    }

    pub fn contains(&self, deal_id: &str) -> bool {
        self.share_path(deal_id).map(|p| p.exists()).unwrap_or(false)
    }

    /// Deal ids with a stored share
    pub fn list(&self) -> Result<Vec<String>> {
        let mut deals = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(encoded) = stem.strip_prefix(FILE_PREFIX) else {
                continue;
            };
            if let Ok(Ok(id)) = hex::decode(encoded).map(String::from_utf8) {
                deals.push(id);
            }
        }

        deals.sort();
        Ok(deals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sss;
    use crate::keystore::KeyManager;
    use tempfile::tempdir;

    #[test]
    fn test_save_get_delete() {
        let dir = tempdir().unwrap();
        let store = DealShareStore::new(dir.path()).unwrap();
        let account = KeyManager::create(Chain::Solana).unwrap();
        let shares = sss::split(b"content key for deal 42, padded out", 2, 2).unwrap();

        assert_eq!(store.get("deal-42", &account).unwrap(), None);

        store.save("deal-42", &shares[1], &account).unwrap();
        assert!(store.contains("deal-42"));
        assert_eq!(store.get("deal-42", &account).unwrap().as_ref(), Some(&shares[1]));
        assert_eq!(store.list().unwrap(), vec!["deal-42".to_string()]);

        store.delete("deal-42").unwrap();
        assert!(!store.contains("deal-42"));
        assert_eq!(store.get("deal-42", &account).unwrap(), None);
        store.delete("deal-42").unwrap();
    }

    #[test]
    fn test_share_is_sealed_on_disk() {
        let dir = tempdir().unwrap();
        let store = DealShareStore::new(dir.path()).unwrap();
        let account = KeyManager::create(Chain::Bsc).unwrap();
        let shares = sss::split(b"content key for a bsc deal", 2, 2).unwrap();

        store.save("7f3c", &shares[0], &account).unwrap();
        let raw = fs::read_to_string(store.share_path("7f3c").unwrap()).unwrap();
        assert!(!raw.contains(&shares[0].to_base64()));
    }

    #[test]
    fn test_other_account_cannot_read() {
        let dir = tempdir().unwrap();
        let store = DealShareStore::new(dir.path()).unwrap();
        let owner = KeyManager::create(Chain::Solana).unwrap();
        let other = KeyManager::create(Chain::Solana).unwrap();
        let shares = sss::split(b"content key", 2, 2).unwrap();

        store.save("deal-1", &shares[1], &owner).unwrap();
        assert!(matches!(
            store.get("deal-1", &other),
            Err(EscrowSignError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_deal_ids_never_escape_directory() {
        let dir = tempdir().unwrap();
        let store = DealShareStore::new(dir.path()).unwrap();
        let account = KeyManager::create(Chain::Solana).unwrap();
        let shares = sss::split(b"content key", 2, 2).unwrap();

        store.save("../../etc/passwd", &shares[0], &account).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(store.list().unwrap(), vec!["../../etc/passwd".to_string()]);

        assert!(store.save("", &shares[0], &account).is_err());
    }
}
