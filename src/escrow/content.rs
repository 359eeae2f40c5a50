//! Deal content sealing
//!
//! Deal text and files are encrypted under the checksum-verified content key.
//! Account private keys never touch deal content.

use crate::crypto::envelope;
use crate::errors::Result;
use crate::escrow::coordinator::ContentKey;
use zeroize::Zeroizing;

const CONTENT_DOMAIN: &[u8] = b"escrowsign/content/v1";

/// Encrypt deal content, returning base64(nonce || ciphertext)
pub fn seal(key: &ContentKey, plaintext: &[u8]) -> Result<String> {
    let aead_key = envelope::derive_key(CONTENT_DOMAIN, key.expose());
    envelope::seal_with_key(&aead_key, plaintext)
}

/// Decrypt deal content sealed with [`seal`]
pub fn open(key: &ContentKey, sealed: &str) -> Result<Zeroizing<Vec<u8>>> {
    let aead_key = envelope::derive_key(CONTENT_DOMAIN, key.expose());
    envelope::open_with_key(&aead_key, sealed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EscrowConfig;
    use crate::errors::EscrowSignError;
    use crate::escrow::EscrowKeyCoordinator;
    use crate::keystore::{Chain, KeyManager};

    #[test]
    fn test_counterparty_reads_owner_content() {
        let coordinator = EscrowKeyCoordinator::new(&EscrowConfig::default())
            .unwrap()
            .with_memory_locking(false);
        let owner = KeyManager::create(Chain::Solana).unwrap();
        let secret = coordinator.create_shared_secret(&owner).unwrap();

        let sealed = seal(secret.content_key(), b"Logo redesign, 3 revisions").unwrap();

        let counterparty_key = coordinator
            .recombine(
                &secret.server_share_base64(),
                &secret.client_share_base64(),
                secret.checksum(),
            )
            .unwrap();
        let opened = open(&counterparty_key, &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"Logo redesign, 3 revisions");

        let other = coordinator.create_shared_secret(&owner).unwrap();
        let result = open(other.content_key(), &sealed);
        assert!(matches!(result, Err(EscrowSignError::DecryptionFailed(_))));
    }
}
