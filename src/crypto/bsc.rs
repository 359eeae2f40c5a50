//! BSC (EVM) cryptographic utilities
//!
//! Provides:
//! - secp256k1 key generation and restore
//! - Address derivation (keccak-256, EIP-55 checksum)
//! - Recoverable hash signing

use crate::errors::{EscrowSignError, Result};
use crate::security::SecureBytes;
use k256::{ecdsa::SigningKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use zeroize::Zeroize;

/// Length of a secp256k1 secret key
pub const SECRET_LEN: usize = 32;

/// Attempts before giving up on drawing a valid scalar
const MAX_GENERATION_ATTEMPTS: usize = 8;

/// BSC key pair
pub struct BscKeyPair {
    signing_key: SigningKey,
}

impl BscKeyPair {
    /// Create a new random key pair
    pub fn generate() -> Result<Self> {
        let mut candidate = [0u8; SECRET_LEN];
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            OsRng
                .try_fill_bytes(&mut candidate)
                .map_err(|e| EscrowSignError::GenerationFailed(e.to_string()))?;

            if let Ok(secret_key) = SecretKey::from_slice(&candidate) {
                candidate.zeroize();
                return Ok(Self {
                    signing_key: SigningKey::from(secret_key),
                });
            }
        }

        candidate.zeroize();
        Err(EscrowSignError::GenerationFailed(
            "Could not draw a valid secp256k1 scalar".to_string(),
        ))
    }

    /// Create from raw private key bytes (32 bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SECRET_LEN {
            return Err(EscrowSignError::InvalidKeyFormat(format!(
                "Expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|_| EscrowSignError::InvalidKeyFormat("Not a valid secp256k1 scalar".to_string()))?;

        Ok(Self {
            signing_key: SigningKey::from(secret_key),
        })
    }

    /// Get the public key (uncompressed, 65 bytes with 0x04 prefix)
    pub fn public_key_uncompressed(&self) -> Vec<u8> {
        let verifying_key = self.signing_key.verifying_key();
        verifying_key.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Get the address (20 bytes)
    pub fn address(&self) -> [u8; 20] {
        let pubkey = self.public_key_uncompressed();
        // Skip the 0x04 prefix and hash the remaining 64 bytes
        let hash = keccak256(&pubkey[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);
        address
    }

    /// Get the checksummed address string
    pub fn address_checksum(&self) -> String {
        checksum_address(&self.address())
    }

    /// Sign a 32-byte hash, returning a recoverable signature
    pub fn sign_hash(&self, hash: &[u8; 32]) -> Result<BscSignature> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(hash)
            .map_err(|e| EscrowSignError::SigningFailed(e.to_string()))?;

        Ok(BscSignature {
            r: signature.r().to_bytes().into(),
            s: signature.s().to_bytes().into(),
            recovery_id: recovery_id.to_byte(),
        })
    }

    /// Export the private key bytes (use with caution!)
    pub fn private_key_bytes(&self) -> SecureBytes {
        SecureBytes::new(self.signing_key.to_bytes().to_vec())
    }
}

/// Recoverable secp256k1 signature
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BscSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

impl BscSignature {
    /// Get v in the 27/28 form
    pub fn v(&self) -> u8 {
        self.recovery_id + 27
    }

    /// Get the full signature bytes (65 bytes: r || s || v)
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut sig = [0u8; 65];
        sig[..32].copy_from_slice(&self.r);
        sig[32..64].copy_from_slice(&self.s);
        sig[64] = self.v();
        sig
    }
}

/// Compute keccak256 hash
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Convert an address to checksummed format (EIP-55)
pub fn checksum_address(address: &[u8; 20]) -> String {
    let addr_hex = hex::encode(address);
    let hash = hex::encode(keccak256(addr_hex.as_bytes()));

    let mut result = String::with_capacity(42);
    result.push_str("0x");

    for (c, h) in addr_hex.chars().zip(hash.bytes()) {
        if c.is_ascii_alphabetic() && h >= b'8' {
            result.push(c.to_ascii_uppercase());
        } else {
            result.push(c);
        }
    }

    result
}

/// Parse a hex address string to bytes
pub fn parse_address(addr: &str) -> Result<[u8; 20]> {
    let addr = addr.strip_prefix("0x").unwrap_or(addr);

    if addr.len() != 40 {
        return Err(EscrowSignError::InvalidPublicKey(
            "Address must be 40 hex chars".to_string(),
        ));
    }

    let bytes = hex::decode(addr)
        .map_err(|e| EscrowSignError::InvalidPublicKey(format!("Hex decode error: {}", e)))?;
    let mut result = [0u8; 20];
    result.copy_from_slice(&bytes);
    Ok(result)
}

/// Verify an address checksum (EIP-55)
///
/// All-lowercase and all-uppercase addresses carry no checksum and pass.
pub fn verify_checksum(addr: &str) -> bool {
    let Ok(address) = parse_address(addr) else {
        return false;
    };

    let body = addr.strip_prefix("0x").unwrap_or(addr);
    if body == body.to_lowercase() || body == body.to_uppercase() {
        return true;
    }

    let checksummed = checksum_address(&address);
    checksummed.strip_prefix("0x") == Some(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    #[test]
    fn test_address_checksum() {
        // Test vector from EIP-55
        let addr = parse_address("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        let checksummed = checksum_address(&addr);
        assert_eq!(checksummed, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");

        assert!(verify_checksum("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(verify_checksum("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
        assert!(!verify_checksum("0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
    }

    #[test]
    fn test_from_bytes() {
        let private_key =
            hex::decode("0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef")
                .unwrap();

        let keypair = BscKeyPair::from_bytes(&private_key).unwrap();
        let addr = keypair.address_checksum();
        assert!(addr.starts_with("0x"));
        assert_eq!(addr.len(), 42);
        assert_eq!(keypair.private_key_bytes().expose(), private_key.as_slice());
    }

    #[test]
    fn test_zero_scalar_rejected() {
        let result = BscKeyPair::from_bytes(&[0u8; 32]);
        assert!(matches!(result, Err(EscrowSignError::InvalidKeyFormat(_))));
    }

    #[test]
    fn test_sign_hash_recovers_signer() {
        let keypair = BscKeyPair::generate().unwrap();
        let hash = keccak256(b"deal init");

        let sig = keypair.sign_hash(&hash).unwrap();
        assert!(sig.v() == 27 || sig.v() == 28);
        assert_eq!(&sig.to_bytes()[..32], &sig.r);

        let signature = Signature::from_slice(&sig.to_bytes()[..64]).unwrap();
        let recid = RecoveryId::from_byte(sig.recovery_id).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(&hash, &signature, recid).unwrap();
        assert_eq!(
            recovered.to_encoded_point(false).as_bytes(),
            keypair.public_key_uncompressed().as_slice()
        );
    }

    #[test]
    fn test_signature_json_needs_full_scalars() {
        let keypair = BscKeyPair::generate().unwrap();
        let sig = keypair.sign_hash(&keccak256(b"deal finish")).unwrap();

        let json = serde_json::to_string(&sig).unwrap();
        let parsed: BscSignature = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.to_bytes(), sig.to_bytes());

        let short = r#"{"r":[1,2,3],"s":[4,5,6],"recovery_id":0}"#;
        assert!(serde_json::from_str::<BscSignature>(short).is_err());
    }
}
