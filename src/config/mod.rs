//! Configuration management for escrowsign
//!
//! Supports loading configuration from:
//! - Built-in defaults
//! - Config file (escrowsign.toml, /etc/escrowsign/config)
//! - Environment variables (ESCROWSIGN_*)

use crate::errors::{EscrowSignError, Result};
use crate::keystore::KdfParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Shortest content key the coordinator will generate
pub const MIN_CONTENT_KEY_LENGTH: usize = 32;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Escrow secret configuration
    pub escrow: EscrowConfig,

    /// Backup storage configuration
    pub storage: StorageConfig,

    /// Security configuration
    pub security: SecurityConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Length of generated content keys in bytes
    pub content_key_length: usize,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            content_key_length: 64,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of encrypted account backups
    pub backup_path: PathBuf,

    /// Directory of sealed per-deal client shares
    pub deal_share_path: PathBuf,

    /// Argon2id cost for new backups
    pub kdf: KdfParams,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backup_path: PathBuf::from("./data/accounts"),
            deal_share_path: PathBuf::from("./data/deal_shares"),
            kdf: KdfParams::default(),
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Pin recovered content keys in RAM
    pub enable_mlock: bool,

    /// Disable core dumps
    pub disable_core_dumps: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_mlock: true,
            disable_core_dumps: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default())
            .map_err(|e| EscrowSignError::ConfigError(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        } else {
            builder = builder
                .add_source(config::File::with_name("escrowsign").required(false))
                .add_source(config::File::with_name("/etc/escrowsign/config").required(false));
        }

        // ESCROWSIGN_ESCROW__CONTENT_KEY_LENGTH, ESCROWSIGN_STORAGE__KDF__ITERATIONS, ...
        builder = builder.add_source(
            config::Environment::with_prefix("ESCROWSIGN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .map_err(|e| EscrowSignError::ConfigError(e.to_string()))?
            .try_deserialize()
            .map_err(|e| EscrowSignError::ConfigError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.escrow.content_key_length < MIN_CONTENT_KEY_LENGTH {
            return Err(EscrowSignError::ConfigError(format!(
                "escrow.content_key_length must be at least {}, got {}",
                MIN_CONTENT_KEY_LENGTH, self.escrow.content_key_length
            )));
        }

        self.storage.kdf.validate()?;

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(EscrowSignError::ConfigError(format!(
                "logging.format must be json or pretty, got {}",
                self.logging.format
            )));
        }

        if !self.storage.backup_path.exists() {
            info!(
                "Backup directory does not exist, will create: {:?}",
                self.storage.backup_path
            );
        }

        Ok(())
    }
}
