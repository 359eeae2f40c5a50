//! Threshold secret sharing on top of `bc-shamir`
//!
//! `bc-shamir` shares secrets of 16 to 32 bytes with at most 16 shares. Longer
//! secrets are framed as `[len: u16 BE][secret][zero padding]` up to a multiple
//! of 32 bytes, and every 32-byte chunk is split on its own. Share `x` carries
//! the concatenation of its piece of every chunk.
//!
//! Share layout: `[version][k][x][split id: 8 bytes][y bytes...]`. The split id
//! is random per call to [`split`], so shares minted by different splits of the
//! same secret never combine.

use crate::errors::{EscrowSignError, Result};
use crate::security::SecureBytes;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bc_rand::SecureRandomNumberGenerator;
use bc_shamir::{recover_secret, split_secret};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashSet;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Current share format version
pub const SHARE_VERSION: u8 = 1;

const SPLIT_ID_LEN: usize = 8;

/// Bytes preceding the share payload
pub const SHARE_HEADER_LEN: usize = 3 + SPLIT_ID_LEN;

/// Largest number of shares a split can produce
pub const MAX_SHARES: usize = 16;

/// Longest secret the length prefix can describe
pub const MAX_SECRET_LEN: usize = u16::MAX as usize;

/// Secret bytes handed to `bc-shamir` per split
const CHUNK_LEN: usize = 32;

const LEN_PREFIX: usize = 2;

/// One share of a split secret
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Share(Vec<u8>);

impl Share {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64.decode(encoded.trim())?;
        Ok(Self(bytes))
    }

    /// Threshold recorded in the header, if the header is present
    pub fn threshold(&self) -> Option<u8> {
        self.0.get(1).copied()
    }

    /// Evaluation point recorded in the header, if the header is present
    pub fn index(&self) -> Option<u8> {
        self.0.get(2).copied()
    }
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("threshold", &self.threshold())
            .field("index", &self.index())
            .field("len", &self.0.len())
            .finish()
    }
}

/// Split `secret` into `n` shares, any `k` of which reconstruct it
///
/// Fresh randomness is drawn on every call.
pub fn split(secret: &[u8], n: usize, k: usize) -> Result<Vec<Share>> {
    if secret.is_empty() || secret.len() > MAX_SECRET_LEN {
        return Err(EscrowSignError::InvalidData(format!(
            "Secret must be 1..={} bytes, got {}",
            MAX_SECRET_LEN,
            secret.len()
        )));
    }
    if n == 0 || n > MAX_SHARES {
        return Err(EscrowSignError::InvalidData(format!(
            "Share count must be in 1..={}, got {}",
            MAX_SHARES, n
        )));
    }
    if k == 0 || k > n {
        return Err(EscrowSignError::InvalidData(format!(
            "Threshold must be in 1..={}, got {}",
            n, k
        )));
    }

    let mut split_id = [0u8; SPLIT_ID_LEN];
    OsRng
        .try_fill_bytes(&mut split_id)
        .map_err(|e| EscrowSignError::GenerationFailed(e.to_string()))?;

    let payload = frame(secret);

    let mut shares: Vec<Vec<u8>> = (1..=n as u8)
        .map(|x| {
            let mut bytes = Vec::with_capacity(SHARE_HEADER_LEN + payload.len());
            bytes.push(SHARE_VERSION);
            bytes.push(k as u8);
            bytes.push(x);
            bytes.extend_from_slice(&split_id);
            bytes
        })
        .collect();

    let mut rng = SecureRandomNumberGenerator;
    for chunk in payload.expose().chunks(CHUNK_LEN) {
        let pieces = Zeroizing::new(
            split_secret(k, n, chunk, &mut rng)
                .map_err(|e| EscrowSignError::InternalError(format!("Shamir split failed: {}", e)))?,
        );
        for (share, piece) in shares.iter_mut().zip(pieces.iter()) {
            share.extend_from_slice(piece);
        }
    }

    Ok(shares.into_iter().map(Share).collect())
}

/// Reconstruct the secret from a set of shares
pub fn combine(shares: &[Share]) -> Result<SecureBytes> {
    let first = shares.first().ok_or(EscrowSignError::InsufficientShares { have: 0, need: 1 })?;
    let header = parse_header(first)?;

    let mut seen = HashSet::with_capacity(shares.len());
    for share in shares {
        let other = parse_header(share)?;
        if other.threshold != header.threshold
            || other.split_id != header.split_id
            || share.0.len() != first.0.len()
        {
            return Err(EscrowSignError::Corrupt(
                "Shares come from incompatible splits".to_string(),
            ));
        }
        if !seen.insert(other.x) {
            return Err(EscrowSignError::Corrupt(format!(
                "Duplicate share index {}",
                other.x
            )));
        }
    }

    let need = header.threshold as usize;
    if shares.len() < need {
        return Err(EscrowSignError::InsufficientShares {
            have: shares.len(),
            need,
        });
    }

    let used = &shares[..need];
    let indexes: Vec<usize> = used.iter().map(|s| s.0[2] as usize - 1).collect();

    let payload_len = first.0.len() - SHARE_HEADER_LEN;
    let mut payload = SecureBytes::zeros(payload_len);
    for (c, out) in payload.expose_mut().chunks_mut(CHUNK_LEN).enumerate() {
        let range = SHARE_HEADER_LEN + c * CHUNK_LEN..SHARE_HEADER_LEN + (c + 1) * CHUNK_LEN;
        let pieces: Zeroizing<Vec<Vec<u8>>> =
            Zeroizing::new(used.iter().map(|s| s.0[range.clone()].to_vec()).collect());
        let chunk = Zeroizing::new(
            recover_secret(&indexes, pieces.as_slice())
                .map_err(|e| EscrowSignError::Corrupt(format!("Shares do not interpolate: {}", e)))?,
        );
        out.copy_from_slice(&chunk);
    }

    unframe(payload.expose())
}

/// `[len][secret][zeros]`, padded to whole chunks
fn frame(secret: &[u8]) -> SecureBytes {
    let framed = LEN_PREFIX + secret.len();
    let mut payload = SecureBytes::zeros(framed.div_ceil(CHUNK_LEN) * CHUNK_LEN);
    let bytes = payload.expose_mut();
    bytes[..LEN_PREFIX].copy_from_slice(&(secret.len() as u16).to_be_bytes());
    bytes[LEN_PREFIX..framed].copy_from_slice(secret);
    payload
}

fn unframe(payload: &[u8]) -> Result<SecureBytes> {
    let len = u16::from_be_bytes([payload[0], payload[1]]) as usize;
    let end = LEN_PREFIX + len;
    if len == 0 || end > payload.len() || payload.len() - end >= CHUNK_LEN {
        return Err(EscrowSignError::Corrupt(format!(
            "Recovered length {} does not fit a {} byte payload",
            len,
            payload.len()
        )));
    }
    if payload[end..].iter().any(|&b| b != 0) {
        return Err(EscrowSignError::Corrupt("Non-zero padding".to_string()));
    }
    Ok(SecureBytes::from(&payload[LEN_PREFIX..end]))
}

struct ShareHeader {
    threshold: u8,
    x: u8,
    split_id: [u8; SPLIT_ID_LEN],
}

fn parse_header(share: &Share) -> Result<ShareHeader> {
    let bytes = &share.0;
    if bytes.len() <= SHARE_HEADER_LEN || (bytes.len() - SHARE_HEADER_LEN) % CHUNK_LEN != 0 {
        return Err(EscrowSignError::Corrupt(format!(
            "Share has a malformed length: {} bytes",
            bytes.len()
        )));
    }
    if bytes[0] != SHARE_VERSION {
        return Err(EscrowSignError::Corrupt(format!(
            "Unknown share version {}",
            bytes[0]
        )));
    }
    let (threshold, x) = (bytes[1], bytes[2]);
    if threshold == 0 || x == 0 || threshold as usize > MAX_SHARES || x as usize > MAX_SHARES {
        return Err(EscrowSignError::Corrupt(format!(
            "Threshold {} or index {} out of range",
            threshold, x
        )));
    }

    let mut split_id = [0u8; SPLIT_ID_LEN];
    split_id.copy_from_slice(&bytes[3..SHARE_HEADER_LEN]);

    Ok(ShareHeader {
        threshold,
        x,
        split_id,
    })
}
