//! Solana partial signing
//!
//! Parses legacy and v0 transactions, adds one signer's signature without
//! touching the others, and re-serializes with the signature set left
//! incomplete. Unfilled signature slots hold the all-zero signature.

use crate::crypto::sol::{SolKeyPair, SolSignature};
use crate::errors::{EscrowSignError, Result};
use bincode::Options;
use solana_sdk::message::VersionedMessage;
use solana_sdk::packet::PACKET_DATA_SIZE;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use tracing::debug;

/// A Solana transaction collecting signatures from several parties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaTransaction {
    inner: VersionedTransaction,
}

impl SolanaTransaction {
    /// Wrap a message with every signature slot empty
    pub fn new_unsigned(message: VersionedMessage) -> Self {
        let slots = message.header().num_required_signatures as usize;
        Self {
            inner: VersionedTransaction {
                signatures: vec![Signature::default(); slots],
                message,
            },
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(EscrowSignError::InvalidTransaction("Transaction is empty".to_string()));
        }

        let inner: VersionedTransaction = bincode::options()
            .with_limit(PACKET_DATA_SIZE as u64)
            .with_fixint_encoding()
            .reject_trailing_bytes()
            .deserialize(bytes)
            .map_err(|e| EscrowSignError::InvalidTransaction(format!("Malformed transaction: {}", e)))?;

        inner
            .message
            .sanitize()
            .map_err(|e| EscrowSignError::InvalidTransaction(format!("Invalid message: {}", e)))?;

        let required = inner.message.header().num_required_signatures as usize;
        if inner.signatures.len() != required {
            return Err(EscrowSignError::InvalidTransaction(format!(
                "Message requires {} signatures, transaction carries {}",
                required,
                inner.signatures.len()
            )));
        }

        Ok(Self { inner })
    }

    /// Encode the transaction, empty signature slots included
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.inner)
            .map_err(|e| EscrowSignError::InternalError(format!("Failed to encode transaction: {}", e)))
    }

    pub fn message(&self) -> &VersionedMessage {
        &self.inner.message
    }

    /// Add `keypair`'s signature, leaving other signers' slots as they are
    pub fn partial_sign(&mut self, keypair: &SolKeyPair) -> Result<SolSignature> {
        let pubkey = keypair.public_key();
        let slot = self.signer_slot(&pubkey).ok_or_else(|| {
            EscrowSignError::SigningFailed(format!(
                "{} is not a required signer of this transaction",
                keypair.public_key_base58()
            ))
        })?;

        let signature = keypair.sign(&self.inner.message.serialize());
        self.inner.signatures[slot] = Signature::from(signature.to_bytes());

        debug!(
            "Partially signed Solana transaction: slot={}, filled={}/{}",
            slot,
            self.inner
                .signatures
                .iter()
                .filter(|s| **s != Signature::default())
                .count(),
            self.inner.signatures.len()
        );
        Ok(signature)
    }

    /// Whether `pubkey` has a valid signature on this transaction
    ///
    /// Keys that are not required signers are reported as unsigned.
    pub fn is_signed(&self, pubkey: &[u8; 32]) -> Result<bool> {
        let Some(slot) = self.signer_slot(pubkey) else {
            return Ok(false);
        };

        let signature = &self.inner.signatures[slot];
        if *signature == Signature::default() {
            return Ok(false);
        }

        Ok(signature.verify(pubkey, &self.inner.message.serialize()))
    }

    /// True once every required signer has signed
    pub fn is_fully_signed(&self) -> bool {
        self.inner
            .signatures
            .iter()
            .all(|s| *s != Signature::default())
    }

    fn signer_slot(&self, pubkey: &[u8; 32]) -> Option<usize> {
        let required = self.inner.message.header().num_required_signatures as usize;
        self.inner
            .message
            .static_account_keys()
            .iter()
            .take(required)
            .position(|k| k.to_bytes() == *pubkey)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use solana_sdk::hash::Hash;
    use solana_sdk::instruction::CompiledInstruction;
    use solana_sdk::message::v0::{self, MessageAddressTableLookup};
    use solana_sdk::message::{Message, MessageHeader};
    use solana_sdk::pubkey::Pubkey;

    /// A transfer-shaped legacy message with `signers` as the required signers
    pub(crate) fn sample_message(signers: &[[u8; 32]]) -> Message {
        let mut account_keys: Vec<Pubkey> = signers.iter().map(|k| Pubkey::new_from_array(*k)).collect();
        account_keys.push(Pubkey::new_from_array([9u8; 32])); // recipient
        account_keys.push(Pubkey::new_from_array([0u8; 32])); // system program

        let program = (account_keys.len() - 1) as u8;
        Message {
            header: MessageHeader {
                num_required_signatures: signers.len() as u8,
                num_readonly_signed_accounts: 0,
                num_readonly_unsigned_accounts: 1,
            },
            account_keys,
            recent_blockhash: Hash::new_from_array([7u8; 32]),
            instructions: vec![CompiledInstruction {
                program_id_index: program,
                accounts: vec![0, program - 1],
                data: vec![2, 0, 0, 0, 0x40, 0x42, 0x0f, 0, 0, 0, 0, 0],
            }],
        }
    }

    fn unsigned(signers: &[[u8; 32]]) -> SolanaTransaction {
        SolanaTransaction::new_unsigned(VersionedMessage::Legacy(sample_message(signers)))
    }

    #[test]
    fn test_parse_serialize_legacy_and_v0() {
        let a = SolKeyPair::from_seed(&[1u8; 32]).unwrap();

        let legacy = unsigned(&[a.public_key()]);
        let bytes = legacy.serialize().unwrap();
        assert_eq!(SolanaTransaction::from_bytes(&bytes).unwrap(), legacy);

        let legacy_message = sample_message(&[a.public_key()]);
        let versioned = SolanaTransaction::new_unsigned(VersionedMessage::V0(v0::Message {
            header: legacy_message.header,
            account_keys: legacy_message.account_keys,
            recent_blockhash: legacy_message.recent_blockhash,
            instructions: legacy_message.instructions,
            address_table_lookups: vec![MessageAddressTableLookup {
                account_key: Pubkey::new_from_array([4u8; 32]),
                writable_indexes: vec![1],
                readonly_indexes: vec![2, 3],
            }],
        }));
        let bytes = versioned.serialize().unwrap();
        // One-byte signature count, one empty slot, then the version prefix
        assert_eq!(bytes[1 + 64], 0x80);
        let parsed = SolanaTransaction::from_bytes(&bytes).unwrap();
        match parsed.message() {
            VersionedMessage::V0(message) => assert_eq!(message.address_table_lookups.len(), 1),
            other => panic!("expected a v0 message, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_sign_two_signers() {
        let a = SolKeyPair::from_seed(&[1u8; 32]).unwrap();
        let b = SolKeyPair::from_seed(&[2u8; 32]).unwrap();
        let mut tx = unsigned(&[a.public_key(), b.public_key()]);

        tx.partial_sign(&b).unwrap();
        assert!(tx.is_signed(&b.public_key()).unwrap());
        assert!(!tx.is_signed(&a.public_key()).unwrap());
        assert!(!tx.is_fully_signed());

        // Incomplete signature sets survive a round trip through the wire
        let mut tx = SolanaTransaction::from_bytes(&tx.serialize().unwrap()).unwrap();
        tx.partial_sign(&a).unwrap();
        assert!(tx.is_signed(&a.public_key()).unwrap());
        assert!(tx.is_signed(&b.public_key()).unwrap());
        assert!(tx.is_fully_signed());
    }

    #[test]
    fn test_signature_lands_in_signer_slot() {
        let a = SolKeyPair::from_seed(&[1u8; 32]).unwrap();
        let b = SolKeyPair::from_seed(&[2u8; 32]).unwrap();
        let mut tx = unsigned(&[a.public_key(), b.public_key()]);

        let signature = tx.partial_sign(&b).unwrap();
        assert_eq!(tx.inner.signatures[0], Signature::default());
        assert_eq!(tx.inner.signatures[1], Signature::from(signature.to_bytes()));
    }

    #[test]
    fn test_non_signer_cannot_sign() {
        let a = SolKeyPair::from_seed(&[1u8; 32]).unwrap();
        let outsider = SolKeyPair::from_seed(&[3u8; 32]).unwrap();
        let mut tx = unsigned(&[a.public_key()]);

        let result = tx.partial_sign(&outsider);
        assert!(matches!(result, Err(EscrowSignError::SigningFailed(_))));
        assert!(!tx.is_signed(&outsider.public_key()).unwrap());
    }

    #[test]
    fn test_non_signer_account_is_not_a_slot() {
        // The recipient is in the account list but outside the signer prefix
        let a = SolKeyPair::from_seed(&[1u8; 32]).unwrap();
        let tx = unsigned(&[a.public_key()]);
        assert!(tx.signer_slot(&[9u8; 32]).is_none());
        assert_eq!(tx.signer_slot(&a.public_key()), Some(0));
    }

    #[test]
    fn test_forged_signature_not_counted() {
        let a = SolKeyPair::from_seed(&[1u8; 32]).unwrap();
        let mut tx = unsigned(&[a.public_key()]);
        tx.inner.signatures[0] = Signature::from([0x11u8; 64]);
        assert!(!tx.is_signed(&a.public_key()).unwrap());
    }

    #[test]
    fn test_malformed_transactions_rejected() {
        let a = SolKeyPair::from_seed(&[1u8; 32]).unwrap();
        let tx = unsigned(&[a.public_key()]);
        let bytes = tx.serialize().unwrap();

        assert!(SolanaTransaction::from_bytes(&[]).is_err());
        assert!(SolanaTransaction::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(matches!(
            SolanaTransaction::from_bytes(&trailing),
            Err(EscrowSignError::InvalidTransaction(_))
        ));

        // Signature count disagrees with the header
        let mut extra_sig = vec![2u8];
        extra_sig.extend_from_slice(&[0u8; 64 * 2]);
        extra_sig.extend_from_slice(&tx.message().serialize());
        assert!(SolanaTransaction::from_bytes(&extra_sig).is_err());

        let mut bad_index = sample_message(&[a.public_key()]);
        bad_index.instructions[0].program_id_index = 200;
        let bad = SolanaTransaction::new_unsigned(VersionedMessage::Legacy(bad_index))
            .serialize()
            .unwrap();
        assert!(matches!(
            SolanaTransaction::from_bytes(&bad),
            Err(EscrowSignError::InvalidTransaction(_))
        ));

        let mut unknown_version = vec![1u8];
        unknown_version.extend_from_slice(&[0u8; 64]);
        unknown_version.push(0x80 | 1);
        unknown_version.extend_from_slice(&tx.message().serialize());
        assert!(SolanaTransaction::from_bytes(&unknown_version).is_err());
    }
}
