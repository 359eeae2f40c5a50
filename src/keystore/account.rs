//! Accounts and key management for both chain families
//!
//! Solana accounts hold the 64-byte secret (seed || public key) and are
//! identified by the base58 public key. BSC accounts hold the 32-byte
//! secp256k1 secret and are identified by the EIP-55 checksummed address.

use crate::crypto::bsc::{self, BscKeyPair};
use crate::crypto::sol::{self, SolKeyPair};
use crate::errors::{EscrowSignError, Result};
use crate::security::SecureBytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use zeroize::Zeroizing;

/// Chain family an account or transaction belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Ed25519 accounts, multi-signer transactions
    Solana,
    /// secp256k1 accounts, single-signer transactions
    Bsc,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Solana => "solana",
            Chain::Bsc => "bsc",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = EscrowSignError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "solana" | "sol" => Ok(Chain::Solana),
            "bsc" | "bnb" => Ok(Chain::Bsc),
            _ => Err(EscrowSignError::UnsupportedChain(s.to_string())),
        }
    }
}

/// A blockchain account: public identity plus its private key
///
/// Immutable once created. The private key is zeroed on drop and never
/// printed by `Debug`.
#[derive(Clone)]
pub struct Account {
    public_key: String,
    private_key: SecureBytes,
    chain: Chain,
}

impl Account {
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn private_key(&self) -> &[u8] {
        self.private_key.expose()
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// The 32 secret bytes the account's own encryption keys derive from
    pub fn secret_seed(&self) -> &[u8] {
        &self.private_key.expose()[..32]
    }

    /// Private key in the chain's restore format (base58 or hex)
    pub fn export_private_key(&self) -> String {
        match self.chain {
            Chain::Solana => bs58::encode(self.private_key.expose()).into_string(),
            Chain::Bsc => hex::encode(self.private_key.expose()),
        }
    }

    /// Sign arbitrary bytes, e.g. to authenticate an API request
    ///
    /// Solana: detached Ed25519 signature (64 bytes). BSC: recoverable
    /// signature over keccak256(data) as `r || s || v` with v in 27/28 (65 bytes).
    pub fn sign_message(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.chain {
            Chain::Solana => Ok(self.sol_keypair()?.sign(data).to_bytes().to_vec()),
            Chain::Bsc => {
                let signature = self.bsc_keypair()?.sign_hash(&bsc::keccak256(data))?;
                Ok(signature.to_bytes().to_vec())
            }
        }
    }

    pub(crate) fn sol_keypair(&self) -> Result<SolKeyPair> {
        match self.chain {
            Chain::Solana => SolKeyPair::from_keypair_bytes(self.private_key.expose()),
            Chain::Bsc => Err(EscrowSignError::InvalidKeyFormat(
                "Expected Solana key, got BSC".to_string(),
            )),
        }
    }

    pub(crate) fn bsc_keypair(&self) -> Result<BscKeyPair> {
        match self.chain {
            Chain::Bsc => BscKeyPair::from_bytes(self.private_key.expose()),
            Chain::Solana => Err(EscrowSignError::InvalidKeyFormat(
                "Expected BSC key, got Solana".to_string(),
            )),
        }
    }

    fn from_sol(keypair: &SolKeyPair) -> Self {
        Self {
            public_key: keypair.public_key_base58(),
            private_key: keypair.keypair_bytes(),
            chain: Chain::Solana,
        }
    }

    fn from_bsc(keypair: &BscKeyPair) -> Self {
        Self {
            public_key: keypair.address_checksum(),
            private_key: keypair.private_key_bytes(),
            chain: Chain::Bsc,
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("public_key", &self.public_key)
            .field("chain", &self.chain)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Creates and restores accounts
pub struct KeyManager;

impl KeyManager {
    /// Generate a fresh account on `chain`
    pub fn create(chain: Chain) -> Result<Account> {
        let account = match chain {
            Chain::Solana => Account::from_sol(&SolKeyPair::generate()?),
            Chain::Bsc => Account::from_bsc(&BscKeyPair::generate()?),
        };

        debug!("Created {} account {}", chain, account.public_key);
        Ok(account)
    }

    /// Restore an account from user input
    ///
    /// Solana accepts a JSON byte array (`[12, 250, ...]`) or a base58 string,
    /// either holding a 32-byte seed or the 64-byte secret. BSC accepts a hex
    /// string with or without `0x`.
    pub fn restore(input: &str, chain: Chain) -> Result<Account> {
        let input = input.trim();
        if input.is_empty() {
            return Err(EscrowSignError::InvalidKeyFormat("Empty private key".to_string()));
        }

        let bytes = match chain {
            Chain::Solana if input.starts_with('[') => {
                let parsed: Vec<u8> = serde_json::from_str(input).map_err(|e| {
                    EscrowSignError::InvalidKeyFormat(format!("Invalid byte array: {}", e))
                })?;
                Zeroizing::new(parsed)
            }
            Chain::Solana => Zeroizing::new(bs58::decode(input).into_vec().map_err(|e| {
                EscrowSignError::InvalidKeyFormat(format!("Invalid base58: {}", e))
            })?),
            Chain::Bsc => {
                let hex_str = input.strip_prefix("0x").unwrap_or(input);
                Zeroizing::new(hex::decode(hex_str)?)
            }
        };

        let account = Self::from_private_key_bytes(&bytes, chain)?;
        debug!("Restored {} account {}", chain, account.public_key);
        Ok(account)
    }

    /// Build an account from raw private key bytes
    pub fn from_private_key_bytes(bytes: &[u8], chain: Chain) -> Result<Account> {
        match chain {
            Chain::Solana => Ok(Account::from_sol(&SolKeyPair::from_secret_bytes(bytes)?)),
            Chain::Bsc => Ok(Account::from_bsc(&BscKeyPair::from_bytes(bytes)?)),
        }
    }

    /// Whether `public_key` is a well-formed identity on `chain`
    pub fn is_valid_public_key(public_key: &str, chain: Chain) -> bool {
        match chain {
            Chain::Solana => sol::parse_pubkey(public_key)
                .map(|bytes| sol::is_on_curve(&bytes))
                .unwrap_or(false),
            Chain::Bsc => bsc::verify_checksum(public_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_restore_solana_base58() {
        let account = KeyManager::create(Chain::Solana).unwrap();
        assert_eq!(account.private_key().len(), 64);

        let restored = KeyManager::restore(&account.export_private_key(), Chain::Solana).unwrap();
        assert_eq!(restored.public_key(), account.public_key());
        assert_eq!(restored.private_key(), account.private_key());
    }

    #[test]
    fn test_restore_solana_json_array() {
        let account = KeyManager::create(Chain::Solana).unwrap();
        let json = serde_json::to_string(account.private_key()).unwrap();
        assert!(json.starts_with('['));

        let restored = KeyManager::restore(&json, Chain::Solana).unwrap();
        assert_eq!(restored.public_key(), account.public_key());

        let seed_json = serde_json::to_string(account.secret_seed()).unwrap();
        let restored = KeyManager::restore(&seed_json, Chain::Solana).unwrap();
        assert_eq!(restored.public_key(), account.public_key());
    }

    #[test]
    fn test_restore_solana_rejects_bad_input() {
        let result = KeyManager::restore("[1, 2, 300]", Chain::Solana);
        assert!(matches!(result, Err(EscrowSignError::InvalidKeyFormat(_))));

        let result = KeyManager::restore("not-base58-0OIl", Chain::Solana);
        assert!(matches!(result, Err(EscrowSignError::InvalidKeyFormat(_))));

        let short = bs58::encode([5u8; 16]).into_string();
        let result = KeyManager::restore(&short, Chain::Solana);
        assert!(matches!(result, Err(EscrowSignError::InvalidKeyFormat(_))));

        let account = KeyManager::create(Chain::Solana).unwrap();
        let mut tampered = account.private_key().to_vec();
        tampered[63] ^= 0x01;
        let result = KeyManager::restore(&bs58::encode(tampered).into_string(), Chain::Solana);
        assert!(matches!(result, Err(EscrowSignError::InvalidPublicKey(_))));
    }

    #[test]
    fn test_create_and_restore_bsc_hex() {
        let account = KeyManager::create(Chain::Bsc).unwrap();
        assert!(account.public_key().starts_with("0x"));

        let exported = account.export_private_key();
        let restored = KeyManager::restore(&exported, Chain::Bsc).unwrap();
        assert_eq!(restored.public_key(), account.public_key());

        let prefixed = KeyManager::restore(&format!("0x{}", exported), Chain::Bsc).unwrap();
        assert_eq!(prefixed.public_key(), account.public_key());
    }

    #[test]
    fn test_restore_bsc_rejects_bad_input() {
        let result = KeyManager::restore("zz", Chain::Bsc);
        assert!(matches!(result, Err(EscrowSignError::InvalidKeyFormat(_))));

        let zero = "00".repeat(32);
        let result = KeyManager::restore(&zero, Chain::Bsc);
        assert!(matches!(result, Err(EscrowSignError::InvalidKeyFormat(_))));

        let result = KeyManager::restore("", Chain::Bsc);
        assert!(matches!(result, Err(EscrowSignError::InvalidKeyFormat(_))));
    }

    #[test]
    fn test_public_key_validation() {
        let sol = KeyManager::create(Chain::Solana).unwrap();
        assert!(KeyManager::is_valid_public_key(sol.public_key(), Chain::Solana));
        assert!(!KeyManager::is_valid_public_key("abc", Chain::Solana));
        assert!(!KeyManager::is_valid_public_key(sol.public_key(), Chain::Bsc));

        let bsc = KeyManager::create(Chain::Bsc).unwrap();
        assert!(KeyManager::is_valid_public_key(bsc.public_key(), Chain::Bsc));
        assert!(!KeyManager::is_valid_public_key(bsc.public_key(), Chain::Solana));
    }

    #[test]
    fn test_chain_parsing_and_debug() {
        assert_eq!("SOL".parse::<Chain>().unwrap(), Chain::Solana);
        assert_eq!("bsc".parse::<Chain>().unwrap(), Chain::Bsc);
        assert!("ethereum".parse::<Chain>().is_err());

        let account = KeyManager::create(Chain::Bsc).unwrap();
        let printed = format!("{:?}", account);
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains(&account.export_private_key()));
    }

    #[test]
    fn test_wrong_chain_keypair() {
        let account = KeyManager::create(Chain::Solana).unwrap();
        assert!(account.bsc_keypair().is_err());
        assert!(account.sol_keypair().is_ok());
    }

    #[test]
    fn test_sign_message_solana_is_detached_ed25519() {
        let account = KeyManager::create(Chain::Solana).unwrap();
        let signature = account.sign_message(b"GET /deals").unwrap();
        assert_eq!(signature.len(), 64);

        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&signature);
        let pubkey = sol::parse_pubkey(account.public_key()).unwrap();
        assert!(sol::verify_signature(&pubkey, b"GET /deals", &bytes).unwrap());
        assert!(!sol::verify_signature(&pubkey, b"GET /deal", &bytes).unwrap());
    }

    #[test]
    fn test_sign_message_bsc_recovers_address() {
        use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

        let account = KeyManager::create(Chain::Bsc).unwrap();
        let signature = account.sign_message(b"GET /deals").unwrap();
        assert_eq!(signature.len(), 65);
        assert!(signature[64] == 27 || signature[64] == 28);

        let sig = Signature::from_slice(&signature[..64]).unwrap();
        let recid = RecoveryId::from_byte(signature[64] - 27).unwrap();
        let key = VerifyingKey::recover_from_prehash(&bsc::keccak256(b"GET /deals"), &sig, recid).unwrap();

        let point = key.to_encoded_point(false);
        let mut address = [0u8; 20];
        address.copy_from_slice(&bsc::keccak256(&point.as_bytes()[1..])[12..]);
        assert_eq!(bsc::checksum_address(&address), account.public_key());
    }
}
