//! Self-addressed authenticated encryption
//!
//! Seals data under a key derived from the owner's own secret seed so that the
//! owner, and only the owner, can open it again later. Output is
//! `base64(nonce || ciphertext)`.

use crate::errors::{EscrowSignError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha3::{Digest, Sha3_256};
use zeroize::Zeroizing;

/// Nonce size for AES-GCM
const NONCE_SIZE: usize = 12;

/// Domain separation for envelope keys
const ENVELOPE_DOMAIN: &[u8] = b"escrowsign/envelope/v1";

/// Derive the AES-256 key for a domain from secret material
pub(crate) fn derive_key(domain: &[u8], secret: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha3_256::new();
    hasher.update(domain);
    hasher.update(secret);
    Zeroizing::new(hasher.finalize().into())
}

/// Encrypt `plaintext` under `key`, returning base64(nonce || ciphertext)
pub(crate) fn seal_with_key(key: &[u8; 32], plaintext: &[u8]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| EscrowSignError::EncryptionFailed(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| EscrowSignError::GenerationFailed(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| EscrowSignError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
}

/// Decrypt base64(nonce || ciphertext) under `key`
pub(crate) fn open_with_key(key: &[u8; 32], sealed: &str) -> Result<Zeroizing<Vec<u8>>> {
    let bytes = BASE64.decode(sealed.trim())?;
    if bytes.len() <= NONCE_SIZE {
        return Err(EscrowSignError::InvalidData(
            "Sealed payload is shorter than its nonce".to_string(),
        ));
    }
    let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| EscrowSignError::DecryptionFailed(e.to_string()))?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| {
            EscrowSignError::DecryptionFailed("Authentication failed - wrong key?".to_string())
        })?;

    Ok(Zeroizing::new(plaintext))
}

/// Seal `plaintext` to the holder of `owner_seed`
pub fn seal_to_self(owner_seed: &[u8], plaintext: &[u8]) -> Result<String> {
    let key = derive_key(ENVELOPE_DOMAIN, owner_seed);
    seal_with_key(&key, plaintext)
}

/// Open an envelope produced by [`seal_to_self`]
pub fn open_from_self(owner_seed: &[u8], sealed: &str) -> Result<Zeroizing<Vec<u8>>> {
    let key = derive_key(ENVELOPE_DOMAIN, owner_seed);
    open_with_key(&key, sealed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let seed = [7u8; 32];
        let sealed = seal_to_self(&seed, b"content key").unwrap();
        let opened = open_from_self(&seed, &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"content key");
    }

    #[test]
    fn test_nonce_is_fresh() {
        let seed = [7u8; 32];
        let a = seal_to_self(&seed, b"same").unwrap();
        let b = seal_to_self(&seed, b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_owner_fails() {
        let sealed = seal_to_self(&[1u8; 32], b"content key").unwrap();
        let result = open_from_self(&[2u8; 32], &sealed);
        assert!(matches!(result, Err(EscrowSignError::DecryptionFailed(_))));
    }

    #[test]
    fn test_tampered_or_short_payload() {
        let seed = [3u8; 32];
        let sealed = seal_to_self(&seed, b"content key").unwrap();
        let mut raw = BASE64.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 1;
        let result = open_from_self(&seed, &BASE64.encode(raw));
        assert!(matches!(result, Err(EscrowSignError::DecryptionFailed(_))));

        let result = open_from_self(&seed, &BASE64.encode([0u8; 4]));
        assert!(matches!(result, Err(EscrowSignError::InvalidData(_))));

        let result = open_from_self(&seed, "%%%");
        assert!(matches!(result, Err(EscrowSignError::InvalidData(_))));
    }
}
