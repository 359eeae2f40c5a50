//! Solana cryptographic utilities
//!
//! Provides:
//! - Ed25519 key generation
//! - Keypair restore from seed or full 64-byte secret
//! - Message signing and verification

use crate::errors::{EscrowSignError, Result};
use crate::security::SecureBytes;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

/// Length of an Ed25519 seed
pub const SEED_LEN: usize = 32;

/// Length of a Solana secret key (seed || public key)
pub const KEYPAIR_LEN: usize = 64;

/// Solana key pair (Ed25519)
pub struct SolKeyPair {
    signing_key: SigningKey,
}

impl SolKeyPair {
    /// Create a new random key pair
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; SEED_LEN];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| EscrowSignError::GenerationFailed(e.to_string()))?;

        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Ok(Self { signing_key })
    }

    /// Create from raw private key bytes (32 bytes seed)
    pub fn from_seed(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SEED_LEN {
            return Err(EscrowSignError::InvalidKeyFormat(format!(
                "Expected 32 bytes seed, got {}",
                bytes.len()
            )));
        }

        let mut seed = [0u8; SEED_LEN];
        seed.copy_from_slice(bytes);

        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Ok(Self { signing_key })
    }

    /// Create from full 64-byte keypair (as used by Solana wallets)
    ///
    /// The trailing 32 bytes must be the public key derived from the seed.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEYPAIR_LEN {
            return Err(EscrowSignError::InvalidKeyFormat(format!(
                "Expected 64 bytes keypair, got {}",
                bytes.len()
            )));
        }

        let keypair = Self::from_seed(&bytes[..SEED_LEN])?;
        if keypair.public_key()[..] != bytes[SEED_LEN..] {
            return Err(EscrowSignError::InvalidPublicKey(
                "Public key does not match the secret seed".to_string(),
            ));
        }

        Ok(keypair)
    }

    /// Restore from either a seed or a full keypair
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            SEED_LEN => Self::from_seed(bytes),
            KEYPAIR_LEN => Self::from_keypair_bytes(bytes),
            n => Err(EscrowSignError::InvalidKeyFormat(format!(
                "Expected 32 or 64 secret bytes, got {}",
                n
            ))),
        }
    }

    /// Get the public key (32 bytes)
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Get the public key as base58 string (Solana address format)
    pub fn public_key_base58(&self) -> String {
        bs58::encode(self.public_key()).into_string()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> SolSignature {
        let signature = self.signing_key.sign(message);
        SolSignature {
            bytes: signature.to_bytes(),
        }
    }

    /// Export the private key seed (32 bytes) - use with caution!
    pub fn seed_bytes(&self) -> SecureBytes {
        SecureBytes::new(self.signing_key.to_bytes().to_vec())
    }

    /// Export the full keypair bytes (64 bytes: seed || pubkey)
    pub fn keypair_bytes(&self) -> SecureBytes {
        SecureBytes::new(self.signing_key.to_keypair_bytes().to_vec())
    }
}

/// Solana signature (64 bytes)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolSignature {
    pub bytes: [u8; 64],
}

impl SolSignature {
    pub fn to_bytes(&self) -> [u8; 64] {
        self.bytes
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.bytes).into_string()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            EscrowSignError::InvalidTransaction(format!(
                "Expected 64 byte signature, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }
}

/// Parse a base58-encoded public key
pub fn parse_pubkey(s: &str) -> Result<[u8; 32]> {
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| EscrowSignError::InvalidPublicKey(format!("Invalid base58: {}", e)))?;

    bytes.as_slice().try_into().map_err(|_| {
        EscrowSignError::InvalidPublicKey(format!(
            "Public key must be 32 bytes, got {}",
            bytes.len()
        ))
    })
}

/// Whether the bytes decode to a point on the Ed25519 curve
pub fn is_on_curve(pubkey: &[u8; 32]) -> bool {
    VerifyingKey::from_bytes(pubkey).is_ok()
}

/// Verify a signature
pub fn verify_signature(pubkey: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> Result<bool> {
    let verifying_key = VerifyingKey::from_bytes(pubkey)
        .map_err(|e| EscrowSignError::InvalidPublicKey(e.to_string()))?;

    let sig = Signature::from_bytes(signature);

    Ok(verifying_key.verify_strict(message, &sig).is_ok())
}
