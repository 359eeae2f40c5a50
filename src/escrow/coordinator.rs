//! Escrow key coordinator
//!
//! Creates a deal's content key, splits it 2-of-2 between server custody and
//! the counterparty, seals a copy to the owner, and recovers it again. A
//! recovered key is only handed out after its checksum matches.

use crate::config::{EscrowConfig, MIN_CONTENT_KEY_LENGTH};
use crate::crypto::envelope;
use crate::crypto::sss::{self, Share};
use crate::errors::{EscrowSignError, Result};
use crate::keystore::Account;
use crate::security::LockedMemory;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

/// Both shares are needed to recover a deal's content key
const DEAL_SHARES: usize = 2;
const DEAL_THRESHOLD: usize = 2;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Symmetric key protecting a deal's content
///
/// Only produced by [`EscrowKeyCoordinator`]; bytes are zeroed on drop.
#[derive(Clone)]
pub struct ContentKey(LockedMemory);

impl ContentKey {
    fn new(bytes: Vec<u8>, lock: bool) -> Self {
        Self(LockedMemory::with_lock(bytes, lock))
    }

    pub fn expose(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex SHA3-256 of the key
    pub fn checksum(&self) -> String {
        checksum(self.expose())
    }
}

impl PartialEq for ContentKey {
    fn eq(&self, other: &Self) -> bool {
        self.expose().ct_eq(other.expose()).into()
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentKey")
            .field("len", &self.len())
            .field("locked", &self.0.is_locked())
            .finish()
    }
}

/// Content key sealed to the deal owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecretEnvelope {
    /// base64(nonce || AES-256-GCM ciphertext)
    pub ciphertext: String,
}

/// Everything minted when a deal's secret is created
#[derive(Debug)]
pub struct EscrowSecret {
    content_key: ContentKey,
    envelope: EncryptedSecretEnvelope,
    checksum: String,
    server_share: Share,
    client_share: Share,
    state: SecretState,
}

impl EscrowSecret {
    pub fn content_key(&self) -> &ContentKey {
        &self.content_key
    }

    pub fn envelope(&self) -> &EncryptedSecretEnvelope {
        &self.envelope
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn server_share(&self) -> &Share {
        &self.server_share
    }

    pub fn client_share(&self) -> &Share {
        &self.client_share
    }

    pub fn server_share_base64(&self) -> String {
        self.server_share.to_base64()
    }

    pub fn client_share_base64(&self) -> String {
        self.client_share.to_base64()
    }

    /// `Created` until the caller reports the shares handed out
    pub fn state(&self) -> SecretState {
        self.state
    }

    /// Record that the server and counterparty now hold their shares
    pub fn mark_distributed(&mut self) -> Result<SecretState> {
        self.state = self.state.distributed()?;
        Ok(self.state)
    }
}

/// A fresh share pair minted from a recovered content key
#[derive(Debug)]
pub struct ResharedSecret {
    pub content_key: ContentKey,
    pub server_share: String,
    pub client_share: String,
    pub checksum: String,
}

/// Where a deal's secret is in its lifecycle
///
/// [`EscrowSecret`] starts in `Created`. Recoveries are recorded by
/// [`EscrowKeyCoordinator::recombine_tracked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SecretState {
    Uninitialized,
    Created,
    Distributed,
    Recovered { valid: bool },
}

impl SecretState {
    pub fn created(self) -> Result<Self> {
        match self {
            SecretState::Uninitialized => Ok(SecretState::Created),
            other => Err(invalid_transition(other, "create")),
        }
    }

    /// Shares have been handed to the server and the counterparty
    pub fn distributed(self) -> Result<Self> {
        match self {
            SecretState::Created | SecretState::Recovered { valid: true } => Ok(SecretState::Distributed),
            other => Err(invalid_transition(other, "distribute")),
        }
    }

    /// Record the outcome of a recombination attempt
    pub fn recovered(self, valid: bool) -> Result<Self> {
        match self {
            SecretState::Distributed | SecretState::Recovered { valid: false } => {
                Ok(SecretState::Recovered { valid })
            }
            other => Err(invalid_transition(other, "recover")),
        }
    }

    /// Whether content may be decrypted in this state
    pub fn is_usable(&self) -> bool {
        matches!(self, SecretState::Created | SecretState::Recovered { valid: true })
    }
}

fn invalid_transition(state: SecretState, action: &str) -> EscrowSignError {
    EscrowSignError::InvalidData(format!("Cannot {} a secret in state {:?}", action, state))
}

/// Creates, distributes and recovers per-deal content keys
#[derive(Debug, Clone)]
pub struct EscrowKeyCoordinator {
    content_key_length: usize,
    lock_memory: bool,
}

impl EscrowKeyCoordinator {
    pub fn new(config: &EscrowConfig) -> Result<Self> {
        if config.content_key_length < MIN_CONTENT_KEY_LENGTH {
            return Err(EscrowSignError::ConfigError(format!(
                "Content key must be at least {} bytes, got {}",
                MIN_CONTENT_KEY_LENGTH, config.content_key_length
            )));
        }

        Ok(Self {
            content_key_length: config.content_key_length,
            lock_memory: true,
        })
    }

    /// Whether content keys are pinned in RAM
    pub fn with_memory_locking(mut self, enabled: bool) -> Self {
        self.lock_memory = enabled;
        self
    }

    pub fn content_key_length(&self) -> usize {
        self.content_key_length
    }

    /// Mint a deal's content key, its shares and the owner's envelope
    pub fn create_shared_secret(&self, owner: &Account) -> Result<EscrowSecret> {
        let mut key = self.generate_content_key()?;
        let content_key = ContentKey::new(std::mem::take(&mut *key), self.lock_memory);

        let mut shares = sss::split(content_key.expose(), DEAL_SHARES, DEAL_THRESHOLD)?;
        let (Some(client_share), Some(server_share)) = (shares.pop(), shares.pop()) else {
            return Err(EscrowSignError::InternalError(
                "Split returned fewer shares than requested".to_string(),
            ));
        };

        let envelope = EncryptedSecretEnvelope {
            ciphertext: envelope::seal_to_self(owner.secret_seed(), content_key.expose())?,
        };
        let checksum = content_key.checksum();

        info!(
            "Created shared secret for {} account {}",
            owner.chain(),
            owner.public_key()
        );

        Ok(EscrowSecret {
            content_key,
            envelope,
            checksum,
            server_share,
            client_share,
            state: SecretState::Uninitialized.created()?,
        })
    }

    /// Recover the content key from the server share and the counterparty share
    ///
    /// An empty share string counts as missing.
    pub fn recombine(
        &self,
        server_share_b64: &str,
        counterparty_share_b64: &str,
        expected_checksum: &str,
    ) -> Result<ContentKey> {
        self.recombine_shares(&[server_share_b64, counterparty_share_b64], expected_checksum)
    }

    /// [`recombine`](Self::recombine), moving `state` to `Recovered` with the outcome
    ///
    /// A failed attempt still advances `state` to `Recovered { valid: false }`.
    pub fn recombine_tracked(
        &self,
        state: &mut SecretState,
        server_share_b64: &str,
        counterparty_share_b64: &str,
        expected_checksum: &str,
    ) -> Result<ContentKey> {
        let outcome = self.recombine(server_share_b64, counterparty_share_b64, expected_checksum);
        *state = state.recovered(outcome.is_ok())?;
        outcome
    }

    /// Recover the content key from any set of base64 shares
    ///
    /// Too few non-empty shares is `InsufficientShares`. Every other failure,
    /// including a tampered share header or a checksum mismatch, is
    /// `InvalidSecretKey`.
    pub fn recombine_shares(&self, shares_b64: &[&str], expected_checksum: &str) -> Result<ContentKey> {
        let mut shares = Vec::with_capacity(shares_b64.len());
        for encoded in shares_b64.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let share = Share::from_base64(encoded)
                .map_err(|_| EscrowSignError::InvalidSecretKey("Share is not valid base64".to_string()))?;
            shares.push(share);
        }

        if shares.len() < DEAL_THRESHOLD {
            warn!("Recombine attempted with {} of {} shares", shares.len(), DEAL_THRESHOLD);
            return Err(EscrowSignError::InsufficientShares {
                have: shares.len(),
                need: DEAL_THRESHOLD,
            });
        }

        let recovered = sss::combine(&shares).map_err(|e| {
            warn!("Share recombination failed: {}", e);
            EscrowSignError::InvalidSecretKey("Shares do not combine".to_string())
        })?;

        let actual = checksum(recovered.expose());
        let expected = expected_checksum.trim().to_ascii_lowercase();
        if !bool::from(actual.as_bytes().ct_eq(expected.as_bytes())) {
            warn!("Recovered content key failed checksum verification");
            return Err(EscrowSignError::InvalidSecretKey(
                "Checksum mismatch".to_string(),
            ));
        }

        debug!("Recombined content key from {} shares", shares.len());
        Ok(ContentKey::new(recovered.into_vec(), self.lock_memory))
    }

    /// Open the owner's envelope without minting new shares
    pub fn open_envelope(&self, owner: &Account, envelope: &EncryptedSecretEnvelope) -> Result<ContentKey> {
        let plaintext = envelope::open_from_self(owner.secret_seed(), &envelope.ciphertext)?;
        if plaintext.len() < MIN_CONTENT_KEY_LENGTH {
            return Err(EscrowSignError::InvalidData(format!(
                "Envelope holds a {} byte key",
                plaintext.len()
            )));
        }
        Ok(ContentKey::new(plaintext.to_vec(), self.lock_memory))
    }

    /// Decrypt the owner's envelope and mint a brand-new share pair
    ///
    /// Shares issued before are not compatible with the new pair.
    pub fn owner_recover_and_reshare(
        &self,
        owner: &Account,
        envelope: &EncryptedSecretEnvelope,
    ) -> Result<ResharedSecret> {
        let content_key = self.open_envelope(owner, envelope)?;

        let mut shares = sss::split(content_key.expose(), DEAL_SHARES, DEAL_THRESHOLD)?;
        let (Some(client_share), Some(server_share)) = (shares.pop(), shares.pop()) else {
            return Err(EscrowSignError::InternalError(
                "Split returned fewer shares than requested".to_string(),
            ));
        };

        info!("Re-shared content key for {}", owner.public_key());

        Ok(ResharedSecret {
            checksum: content_key.checksum(),
            server_share: server_share.to_base64(),
            client_share: client_share.to_base64(),
            content_key,
        })
    }

    fn generate_content_key(&self) -> Result<Zeroizing<Vec<u8>>> {
        let mut key = Zeroizing::new(Vec::with_capacity(self.content_key_length));
        let mut pool = [0u8; 64];

        while key.len() < self.content_key_length {
            OsRng
                .try_fill_bytes(&mut pool)
                .map_err(|e| EscrowSignError::GenerationFailed(e.to_string()))?;

            // 248 = 4 * 62; rejecting the rest keeps every character equally likely
            for &b in pool.iter().filter(|&&b| b < 248) {
                if key.len() == self.content_key_length {
                    break;
                }
                key.push(ALPHANUMERIC[(b % 62) as usize]);
            }
        }

        pool.zeroize();
        Ok(key)
    }
}

/// Lowercase hex SHA3-256
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha3_256::digest(data))
}
