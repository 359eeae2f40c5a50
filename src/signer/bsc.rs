//! BSC transaction signing
//!
//! BSC transactions have a single signer. The raw transaction bytes are
//! hashed with keccak-256 and the hash is signed directly.

use crate::crypto::bsc::{keccak256, BscKeyPair, BscSignature};
use crate::errors::{EscrowSignError, Result};
use tracing::debug;

/// Sign keccak256(`raw`) with `keypair`
pub fn sign(raw: &[u8], keypair: &BscKeyPair) -> Result<BscSignature> {
    if raw.is_empty() {
        return Err(EscrowSignError::InvalidTransaction("Transaction is empty".to_string()));
    }

    let hash = keccak256(raw);
    let signature = keypair.sign_hash(&hash)?;

    debug!(
        "Signed BSC transaction hash 0x{} with {}",
        hex::encode(hash),
        keypair.address_checksum()
    );
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    fn recover_public_key(raw: &[u8], sig: &BscSignature) -> Vec<u8> {
        let signature = Signature::from_slice(&sig.to_bytes()[..64]).unwrap();
        let recid = RecoveryId::from_byte(sig.v() - 27).unwrap();
        let key = VerifyingKey::recover_from_prehash(&keccak256(raw), &signature, recid).unwrap();
        key.to_encoded_point(false).as_bytes().to_vec()
    }

    #[test]
    fn test_signature_recovers_signer() {
        let keypair = BscKeyPair::from_bytes(&[0x42u8; 32]).unwrap();
        let raw = b"\xf8\x6b\x80\x85\x04\xa8\x17\xc8\x00\x82\x52\x08";

        let sig = sign(raw, &keypair).unwrap();
        assert!(sig.v() == 27 || sig.v() == 28);
        assert_eq!(recover_public_key(raw, &sig), keypair.public_key_uncompressed());
    }

    #[test]
    fn test_empty_transaction_rejected() {
        let keypair = BscKeyPair::from_bytes(&[0x42u8; 32]).unwrap();
        assert!(matches!(
            sign(&[], &keypair),
            Err(EscrowSignError::InvalidTransaction(_))
        ));
    }
}
