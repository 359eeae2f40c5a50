//! Encrypted account backups
//!
//! Handles encryption/decryption of account private keys using AES-256-GCM
//! with Argon2id key derivation. One JSON file per account, named after the
//! account's public key.

use crate::errors::{EscrowSignError, Result};
use crate::keystore::account::{Account, Chain};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Salt size for Argon2
const SALT_SIZE: usize = 16;

/// Nonce size for AES-GCM
const NONCE_SIZE: usize = 12;

/// Current backup file format
const FORMAT_VERSION: u32 = 1;

/// Argon2id cost parameters, stored alongside each backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MB
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, Some(32))
            .map_err(|e| EscrowSignError::ConfigError(format!("Invalid KDF parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    pub fn validate(&self) -> Result<()> {
        self.argon2().map(|_| ())
    }
}

/// Encrypted account backup file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKeyFile {
    /// Version of the encryption format
    pub version: u32,

    pub chain: Chain,

    /// Public key (base58 for Solana, checksummed address for BSC)
    pub public_key: String,

    pub kdf: KdfParams,

    /// Salt for key derivation (base64)
    pub salt: String,

    /// Nonce for AES-GCM (base64)
    pub nonce: String,

    /// Encrypted private key (base64)
    pub ciphertext: String,

    /// Creation timestamp
    pub created_at: i64,
}

impl EncryptedKeyFile {
    /// Encrypt an account's private key under `password`
    pub fn seal(account: &Account, password: &SecretString, kdf: KdfParams) -> Result<Self> {
        let mut salt_bytes = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt_bytes);

        let encryption_key = derive_key(password, &salt_bytes, &kdf)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(encryption_key.as_slice())
            .map_err(|e| EscrowSignError::EncryptionFailed(e.to_string()))?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), account.private_key())
            .map_err(|e| EscrowSignError::EncryptionFailed(e.to_string()))?;

        Ok(Self {
            version: FORMAT_VERSION,
            chain: account.chain(),
            public_key: account.public_key().to_string(),
            kdf,
            salt: BASE64.encode(salt_bytes),
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
            created_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Decrypt the private key bytes
    pub fn decrypt(&self, password: &SecretString) -> Result<Zeroizing<Vec<u8>>> {
        if self.version != FORMAT_VERSION {
            return Err(EscrowSignError::DecryptionFailed(format!(
                "Unsupported backup version {}",
                self.version
            )));
        }

        let salt_bytes = BASE64
            .decode(&self.salt)
            .map_err(|e| EscrowSignError::DecryptionFailed(format!("Invalid salt: {}", e)))?;

        let decryption_key = derive_key(password, &salt_bytes, &self.kdf)?;

        let nonce_bytes = BASE64
            .decode(&self.nonce)
            .map_err(|e| EscrowSignError::DecryptionFailed(format!("Invalid nonce: {}", e)))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(EscrowSignError::DecryptionFailed("Invalid nonce length".to_string()));
        }

        let ciphertext = BASE64
            .decode(&self.ciphertext)
            .map_err(|e| EscrowSignError::DecryptionFailed(format!("Invalid ciphertext: {}", e)))?;

        let cipher = Aes256Gcm::new_from_slice(decryption_key.as_slice())
            .map_err(|e| EscrowSignError::DecryptionFailed(e.to_string()))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| {
                EscrowSignError::DecryptionFailed("Decryption failed - wrong password?".to_string())
            })?;

        Ok(Zeroizing::new(plaintext))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let file: Self = serde_json::from_str(&json)?;
        Ok(file)
    }
}

/// Derive an encryption key from a password using Argon2id
fn derive_key(password: &SecretString, salt: &[u8], kdf: &KdfParams) -> Result<Zeroizing<[u8; 32]>> {
    let mut output = Zeroizing::new([0u8; 32]);
    kdf.argon2()?
        .hash_password_into(password.expose_secret().as_bytes(), salt, output.as_mut_slice())
        .map_err(|e| EscrowSignError::EncryptionFailed(e.to_string()))?;

    Ok(output)
}

/// Directory of encrypted account backups
pub struct EncryptedStorage {
    base_path: PathBuf,
}

impl EncryptedStorage {
    /// Open (creating if needed) backup storage at the given path
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path)?;
        }

        Ok(Self { base_path })
    }

    fn key_path(&self, public_key: &str) -> Result<PathBuf> {
        if public_key.is_empty() || !public_key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(EscrowSignError::InvalidPublicKey(format!(
                "Not usable as a backup name: {}",
                public_key
            )));
        }
        Ok(self.base_path.join(format!("{}.json", public_key)))
    }

    pub fn store(&self, file: &EncryptedKeyFile) -> Result<()> {
        let path = self.key_path(&file.public_key)?;
        file.save(&path)
    }

    pub fn load(&self, public_key: &str) -> Result<EncryptedKeyFile> {
        let path = self.key_path(public_key)?;
        if !path.exists() {
            return Err(EscrowSignError::KeyNotFound(public_key.to_string()));
        }
        EncryptedKeyFile::load(&path)
    }

    pub fn delete(&self, public_key: &str) -> Result<()> {
        let path = self.key_path(public_key)?;
        if !path.exists() {
            return Err(EscrowSignError::KeyNotFound(public_key.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// List the public keys of all backups
    pub fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();

            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(stem) = path.file_stem() {
                    keys.push(stem.to_string_lossy().to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    pub fn exists(&self, public_key: &str) -> bool {
        self.key_path(public_key).map(|p| p.exists()).unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::keystore::account::KeyManager;
    use tempfile::tempdir;

    /// Cheap parameters so tests don't spend seconds in Argon2
    pub(crate) fn test_kdf() -> KdfParams {
        KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn password(s: &str) -> SecretString {
        SecretString::new(s.to_string())
    }

    #[test]
    fn test_encrypt_decrypt() {
        let account = KeyManager::create(Chain::Bsc).unwrap();
        let pw = password("test_password_123");

        let encrypted = EncryptedKeyFile::seal(&account, &pw, test_kdf()).unwrap();
        assert_eq!(encrypted.public_key, account.public_key());

        let decrypted = encrypted.decrypt(&pw).unwrap();
        assert_eq!(decrypted.as_slice(), account.private_key());
    }

    #[test]
    fn test_wrong_password() {
        let account = KeyManager::create(Chain::Solana).unwrap();
        let encrypted =
            EncryptedKeyFile::seal(&account, &password("correct_password"), test_kdf()).unwrap();

        let result = encrypted.decrypt(&password("wrong_password"));
        assert!(matches!(result, Err(EscrowSignError::DecryptionFailed(_))));
    }

    #[test]
    fn test_storage() {
        let dir = tempdir().unwrap();
        let storage = EncryptedStorage::new(dir.path()).unwrap();
        let account = KeyManager::create(Chain::Solana).unwrap();
        let pw = password("test_password");

        let encrypted = EncryptedKeyFile::seal(&account, &pw, test_kdf()).unwrap();
        storage.store(&encrypted).unwrap();
        assert!(storage.exists(account.public_key()));
        assert_eq!(storage.list().unwrap(), vec![account.public_key().to_string()]);

        let loaded = storage.load(account.public_key()).unwrap();
        assert_eq!(loaded.chain, Chain::Solana);
        assert_eq!(loaded.decrypt(&pw).unwrap().as_slice(), account.private_key());

        storage.delete(account.public_key()).unwrap();
        assert!(!storage.exists(account.public_key()));
        assert!(matches!(
            storage.load(account.public_key()),
            Err(EscrowSignError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = EncryptedStorage::new(dir.path()).unwrap();
        assert!(storage.load("../etc/passwd").is_err());
        assert!(!storage.exists("../x"));
    }

    #[test]
    fn test_invalid_kdf_params() {
        let kdf = KdfParams {
            memory_kib: 1,
            iterations: 0,
            parallelism: 0,
        };
        assert!(kdf.validate().is_err());
        assert!(KdfParams::default().validate().is_ok());
    }
}
