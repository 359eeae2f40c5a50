//! Cryptographic primitives for Solana, BSC, threshold sharing and envelopes

pub mod bsc;
pub mod envelope;
pub mod sol;
pub mod sss;

pub use bsc::{checksum_address, keccak256, BscKeyPair, BscSignature};
pub use sol::{parse_pubkey, verify_signature, SolKeyPair, SolSignature};
pub use sss::Share;
