//! Out-of-band payload carrying a client share
//!
//! The payload is `base64("<command>^<deal id>^<share base64>")`, small enough
//! for a QR code or a deep link.

use crate::errors::{EscrowSignError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = '^';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareableCommand {
    /// Hand a deal's client share to the counterparty
    ShareDealSecret,
}

impl ShareableCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareableCommand::ShareDealSecret => "sds",
        }
    }
}

impl fmt::Display for ShareableCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShareableCommand {
    type Err = EscrowSignError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sds" => Ok(ShareableCommand::ShareDealSecret),
            other => Err(EscrowSignError::InvalidData(format!("Unknown share command: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareableDeal {
    pub command: ShareableCommand,
    pub deal_id: String,
    pub secret_base64: String,
}

impl ShareableDeal {
    pub fn new(deal_id: impl Into<String>, secret_base64: impl Into<String>) -> Self {
        Self {
            command: ShareableCommand::ShareDealSecret,
            deal_id: deal_id.into(),
            secret_base64: secret_base64.into(),
        }
    }

    /// Encode for QR code or deep link transport
    pub fn share_content(&self) -> Result<String> {
        if self.deal_id.is_empty() || self.deal_id.contains(SEPARATOR) {
            return Err(EscrowSignError::InvalidData(format!(
                "Deal id cannot be empty or contain '{}'",
                SEPARATOR
            )));
        }

        let raw = format!(
            "{}{sep}{}{sep}{}",
            self.command,
            self.deal_id,
            self.secret_base64,
            sep = SEPARATOR
        );
        Ok(BASE64.encode(raw))
    }

    pub fn from_share_content(content: &str) -> Result<Self> {
        let decoded = BASE64.decode(content.trim())?;
        let raw = String::from_utf8(decoded)
            .map_err(|_| EscrowSignError::InvalidData("Share content is not UTF-8".to_string()))?;

        let parts: Vec<&str> = raw.split(SEPARATOR).collect();
        let [command, deal_id, secret_base64] = parts.as_slice() else {
            return Err(EscrowSignError::InvalidData(format!(
                "Expected 3 parts in share content, got {}",
                parts.len()
            )));
        };

        if deal_id.is_empty() || secret_base64.is_empty() {
            return Err(EscrowSignError::InvalidData("Share content has empty fields".to_string()));
        }

        Ok(Self {
            command: command.parse()?,
            deal_id: deal_id.to_string(),
            secret_base64: secret_base64.to_string(),
        })
    }
}
