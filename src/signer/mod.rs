//! Transaction signing
//!
//! Dispatches a signing request by chain family and transaction kind.
//! Solana transactions are partially signed so several parties can
//! accumulate signatures before broadcast. BSC transactions are signed
//! whole by their single signer.

pub mod bsc;
pub mod solana;

pub use solana::SolanaTransaction;

use crate::crypto::sol;
use crate::errors::{EscrowSignError, Result};
use crate::keystore::{Account, Chain};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// What a transaction does for the deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    DealInit,
    DealCancel,
    DealFinish,
    WrapSol,
    UnwrapAllSol,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::DealInit => "DEAL_INIT",
            TransactionKind::DealCancel => "DEAL_CANCEL",
            TransactionKind::DealFinish => "DEAL_FINISH",
            TransactionKind::WrapSol => "WRAP_SOL",
            TransactionKind::UnwrapAllSol => "UNWRAP_ALL_SOL",
            TransactionKind::Transfer => "TRANSFER",
        }
    }

    /// Init, cancel and finish of a deal
    pub fn is_deal_lifecycle(&self) -> bool {
        matches!(
            self,
            TransactionKind::DealInit | TransactionKind::DealCancel | TransactionKind::DealFinish
        )
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = EscrowSignError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "DEAL_INIT" => Ok(TransactionKind::DealInit),
            "DEAL_CANCEL" => Ok(TransactionKind::DealCancel),
            "DEAL_FINISH" => Ok(TransactionKind::DealFinish),
            "WRAP_SOL" | "WRAP" => Ok(TransactionKind::WrapSol),
            "UNWRAP_ALL_SOL" | "UNWRAP" => Ok(TransactionKind::UnwrapAllSol),
            "TRANSFER" => Ok(TransactionKind::Transfer),
            _ => Err(EscrowSignError::InvalidData(format!("Unknown transaction kind: {}", s))),
        }
    }
}

/// A transaction waiting for the local holder's signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub kind: TransactionKind,
    pub chain: Chain,
    pub raw_bytes: Vec<u8>,
}

impl TransactionRequest {
    pub fn new(kind: TransactionKind, chain: Chain, raw_bytes: Vec<u8>) -> Self {
        Self {
            kind,
            chain,
            raw_bytes,
        }
    }

    /// Build a request from base64 transport encoding
    pub fn from_base64(kind: TransactionKind, chain: Chain, encoded: &str) -> Result<Self> {
        let raw_bytes = BASE64.decode(encoded.trim())?;
        Ok(Self::new(kind, chain, raw_bytes))
    }
}

/// Signature in the shape the chain family expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxSignature {
    /// Base64 Ed25519 signature (Solana)
    Raw(String),
    /// Hex `r`/`s` with `v` in 27/28 form (BSC)
    Rsv { r: String, s: String, v: u8 },
}

/// Signed output: base64 transaction bytes and the new signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: String,
    pub signature: TxSignature,
}

/// Chain-dispatching transaction signer
#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionSigner;

impl TransactionSigner {
    pub fn new() -> Self {
        Self
    }

    /// Sign `request` with `signer`
    pub fn sign(&self, request: &TransactionRequest, signer: &Account) -> Result<SignedTransaction> {
        if signer.chain() != request.chain {
            return Err(EscrowSignError::InvalidKeyFormat(format!(
                "{} account cannot sign a {} transaction",
                signer.chain(),
                request.chain
            )));
        }

        let signed = match request.chain {
            Chain::Solana => {
                let keypair = signer.sol_keypair()?;
                let mut tx = SolanaTransaction::from_bytes(&request.raw_bytes)?;
                let signature = tx.partial_sign(&keypair)?;
                SignedTransaction {
                    transaction: BASE64.encode(tx.serialize()?),
                    signature: TxSignature::Raw(BASE64.encode(signature.to_bytes())),
                }
            }
            Chain::Bsc if request.kind.is_deal_lifecycle() => {
                let keypair = signer.bsc_keypair()?;
                let signature = bsc::sign(&request.raw_bytes, &keypair)?;
                SignedTransaction {
                    transaction: BASE64.encode(&request.raw_bytes),
                    signature: TxSignature::Rsv {
                        r: format!("0x{}", hex::encode(&signature.r)),
                        s: format!("0x{}", hex::encode(&signature.s)),
                        v: signature.v(),
                    },
                }
            }
            Chain::Bsc => {
                return Err(EscrowSignError::UnsupportedOperation {
                    kind: request.kind.to_string(),
                    chain: request.chain.to_string(),
                })
            }
        };

        info!(
            "Signed {} transaction: kind={}, signer={}",
            request.chain,
            request.kind,
            signer.public_key()
        );
        Ok(signed)
    }

    /// Sign a base64-encoded transaction
    pub fn sign_base64(
        &self,
        kind: TransactionKind,
        chain: Chain,
        transaction_b64: &str,
        signer: &Account,
    ) -> Result<SignedTransaction> {
        let request = TransactionRequest::from_base64(kind, chain, transaction_b64)?;
        self.sign(&request, signer)
    }

    /// Whether the Solana transaction carries a valid signature from `public_key`
    pub fn is_signed(&self, raw: &[u8], public_key: &str) -> Result<bool> {
        let pubkey = sol::parse_pubkey(public_key)?;
        let tx = SolanaTransaction::from_bytes(raw)?;
        tx.is_signed(&pubkey)
    }

    /// The subset of `public_keys` that have signed, in input order
    pub fn signed_by(&self, raw: &[u8], public_keys: &[&str]) -> Result<Vec<String>> {
        let tx = SolanaTransaction::from_bytes(raw)?;

        let mut signed = Vec::new();
        for public_key in public_keys {
            let pubkey = sol::parse_pubkey(public_key)?;
            if tx.is_signed(&pubkey)? {
                signed.push(public_key.to_string());
            }
        }
        Ok(signed)
    }
}
