//! escrowsign - escrow key recovery and transaction signing CLI
//!
//! Operator front-end over the library. Every command prints JSON on stdout;
//! logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Create a Solana account and keep an encrypted backup
//! ESCROWSIGN_BACKUP_PASSWORD=... escrowsign account create --chain solana --backup
//!
//! # Mint a deal secret for that account
//! escrowsign secret create --account <public key>
//!
//! # Counterparty recovers the content key
//! escrowsign secret recombine --server <b64> --client <b64> --checksum <hex>
//!
//! # Partially sign a deal-init transaction
//! escrowsign tx sign --kind deal-init --chain solana --tx <b64> --account <public key>
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use escrowsign::config::Config;
use escrowsign::errors::{EscrowSignError, Result};
use escrowsign::escrow::{EncryptedSecretEnvelope, EscrowKeyCoordinator, ShareableDeal};
use escrowsign::crypto::Share;
use escrowsign::keystore::{Account, AccountStore, BackupLoader, Chain, DealShareStore, KeyManager};
use escrowsign::security::setup_memory_protection;
use escrowsign::signer::{TransactionKind, TransactionSigner};
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "escrowsign", version)]
#[command(about = "Escrow key recovery and multi-chain transaction signing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, env = "ESCROWSIGN_CONFIG")]
    config: Option<String>,

    /// Password for encrypted account backups
    #[arg(long, global = true, env = "ESCROWSIGN_BACKUP_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, restore and back up accounts
    #[command(subcommand)]
    Account(AccountCommand),

    /// Create, recover and re-share deal secrets
    #[command(subcommand)]
    Secret(SecretCommand),

    /// Sign and inspect transactions
    #[command(subcommand)]
    Tx(TxCommand),
}

#[derive(Subcommand)]
enum AccountCommand {
    /// Generate a new account
    Create {
        #[arg(long, default_value = "solana")]
        chain: Chain,

        /// Write an encrypted backup instead of printing the private key
        #[arg(long)]
        backup: bool,
    },

    /// Restore an account from its private key
    Restore {
        #[arg(long, default_value = "solana")]
        chain: Chain,

        /// Base58, JSON byte array (Solana) or hex (BSC)
        #[arg(long, env = "ESCROWSIGN_PRIVATE_KEY", hide_env_values = true)]
        key: String,

        /// Write an encrypted backup of the restored account
        #[arg(long)]
        backup: bool,
    },

    /// List encrypted account backups
    Backups,

    /// Sign a message to authenticate as the account
    SignMessage {
        /// UTF-8 message to sign
        #[arg(long)]
        message: String,

        #[command(flatten)]
        owner: AccountArgs,
    },
}

#[derive(Subcommand)]
enum SecretCommand {
    /// Mint a content key, its two shares and the owner's envelope
    Create {
        #[command(flatten)]
        owner: AccountArgs,
    },

    /// Recover a content key from the server and counterparty shares
    Recombine {
        /// Server-held share (base64)
        #[arg(long)]
        server: String,

        /// Counterparty share (base64)
        #[arg(long, default_value = "")]
        client: String,

        /// Expected SHA3-256 checksum (hex)
        #[arg(long)]
        checksum: String,
    },

    /// Open the owner's envelope and mint a fresh share pair
    Reshare {
        /// Envelope ciphertext (base64)
        #[arg(long)]
        envelope: String,

        #[command(flatten)]
        owner: AccountArgs,
    },

    /// Build or parse the out-of-band payload for a client share
    ShareLink {
        #[arg(long, requires = "share", conflicts_with = "parse")]
        deal_id: Option<String>,

        #[arg(long, requires = "deal_id")]
        share: Option<String>,

        /// Decode an existing payload
        #[arg(long)]
        parse: Option<String>,
    },

    /// Keep a received client share for a deal
    StoreShare {
        #[arg(long)]
        deal_id: String,

        /// Client share (base64)
        #[arg(long)]
        share: String,

        #[command(flatten)]
        owner: AccountArgs,
    },

    /// Print the stored client share for a deal
    LoadShare {
        #[arg(long)]
        deal_id: String,

        #[command(flatten)]
        owner: AccountArgs,
    },

    /// Forget the stored client share for a deal
    DeleteShare {
        #[arg(long)]
        deal_id: String,
    },
}

#[derive(Subcommand)]
enum TxCommand {
    /// Sign a base64 transaction
    Sign {
        #[arg(long)]
        kind: TransactionKind,

        #[arg(long, default_value = "solana")]
        chain: Chain,

        /// Unsigned or partially signed transaction (base64)
        #[arg(long)]
        tx: String,

        #[command(flatten)]
        owner: AccountArgs,
    },

    /// Report which public keys have signed a Solana transaction
    IsSigned {
        /// Transaction (base64)
        #[arg(long)]
        tx: String,

        /// Public keys to check
        #[arg(long = "public-key", required = true)]
        public_keys: Vec<String>,
    },
}

/// Which account acts: one from backup, or a private key given directly
#[derive(Args)]
struct AccountArgs {
    /// Public key of a backed-up account
    #[arg(long, conflicts_with = "key")]
    account: Option<String>,

    /// Private key (base58, JSON byte array or hex)
    #[arg(long, env = "ESCROWSIGN_PRIVATE_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Chain of `--key`
    #[arg(long = "key-chain", default_value = "solana")]
    key_chain: Chain,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config);

    info!("escrowsign v{}", VERSION);

    if let Err(e) = setup_memory_protection(config.security.disable_core_dumps) {
        warn!("Could not set up memory protection: {}", e);
    }

    let password = cli.password.map(SecretString::new);
    let app = App { config, password };

    let output = match cli.command {
        Commands::Account(cmd) => app.account(cmd)?,
        Commands::Secret(cmd) => app.secret(cmd)?,
        Commands::Tx(cmd) => app.tx(cmd)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Initialize logging
fn init_logging(config: &Config) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

struct App {
    config: Config,
    password: Option<SecretString>,
}

impl App {
    fn account(&self, cmd: AccountCommand) -> Result<serde_json::Value> {
        match cmd {
            AccountCommand::Create { chain, backup } => {
                let account = KeyManager::create(chain)?;
                if backup {
                    self.loader()?.backup(&account, self.password()?)?;
                    return Ok(json!({ "public_key": account.public_key(), "chain": chain, "backed_up": true }));
                }
                Ok(json!({
                    "public_key": account.public_key(),
                    "chain": chain,
                    "private_key": account.export_private_key(),
                }))
            }
            AccountCommand::Restore { chain, key, backup } => {
                let account = KeyManager::restore(&key, chain)?;
                if backup {
                    self.loader()?.backup(&account, self.password()?)?;
                }
                Ok(json!({ "public_key": account.public_key(), "chain": chain, "backed_up": backup }))
            }
            AccountCommand::Backups => {
                let backups = self.loader()?.list_backups()?;
                Ok(json!({ "backups": backups }))
            }
            AccountCommand::SignMessage { message, owner } => {
                let account = self.resolve(owner)?;
                let signature = account.sign_message(message.as_bytes())?;
                let encoded = match account.chain() {
                    Chain::Solana => bs58::encode(&signature).into_string(),
                    Chain::Bsc => format!("0x{}", hex::encode(&signature)),
                };
                Ok(json!({ "public_key": account.public_key(), "signature": encoded }))
            }
        }
    }

    fn secret(&self, cmd: SecretCommand) -> Result<serde_json::Value> {
        let coordinator = EscrowKeyCoordinator::new(&self.config.escrow)?
            .with_memory_locking(self.config.security.enable_mlock);

        match cmd {
            SecretCommand::Create { owner } => {
                let owner = self.resolve(owner)?;
                let secret = coordinator.create_shared_secret(&owner)?;
                Ok(json!({
                    "content_key": String::from_utf8_lossy(secret.content_key().expose()),
                    "checksum": secret.checksum(),
                    "envelope": secret.envelope(),
                    "server_share": secret.server_share_base64(),
                    "client_share": secret.client_share_base64(),
                }))
            }
            SecretCommand::Recombine {
                server,
                client,
                checksum,
            } => {
                let key = coordinator.recombine(&server, &client, &checksum)?;
                Ok(json!({
                    "content_key": String::from_utf8_lossy(key.expose()),
                    "checksum": key.checksum(),
                }))
            }
            SecretCommand::Reshare { envelope, owner } => {
                let owner = self.resolve(owner)?;
                let envelope = EncryptedSecretEnvelope { ciphertext: envelope };
                let reshared = coordinator.owner_recover_and_reshare(&owner, &envelope)?;
                Ok(json!({
                    "content_key": String::from_utf8_lossy(reshared.content_key.expose()),
                    "checksum": reshared.checksum,
                    "server_share": reshared.server_share,
                    "client_share": reshared.client_share,
                }))
            }
            SecretCommand::ShareLink {
                deal_id,
                share,
                parse,
            } => match (parse, deal_id, share) {
                (Some(content), _, _) => {
                    let deal = ShareableDeal::from_share_content(&content)?;
                    Ok(json!({
                        "command": deal.command.as_str(),
                        "deal_id": deal.deal_id,
                        "share": deal.secret_base64,
                    }))
                }
                (None, Some(deal_id), Some(share)) => {
                    let content = ShareableDeal::new(deal_id, share).share_content()?;
                    Ok(json!({ "share_content": content }))
                }
                _ => Err(EscrowSignError::InvalidData(
                    "Either --parse or both --deal-id and --share are required".to_string(),
                )),
            },
            SecretCommand::StoreShare {
                deal_id,
                share,
                owner,
            } => {
                let owner = self.resolve(owner)?;
                let share = Share::from_base64(&share)?;
                self.deal_shares()?.save(&deal_id, &share, &owner)?;
                Ok(json!({ "deal_id": deal_id, "stored": true }))
            }
            SecretCommand::LoadShare { deal_id, owner } => {
                let owner = self.resolve(owner)?;
                let share = self.deal_shares()?.get(&deal_id, &owner)?;
                Ok(json!({ "deal_id": deal_id, "share": share.map(|s| s.to_base64()) }))
            }
            SecretCommand::DeleteShare { deal_id } => {
                self.deal_shares()?.delete(&deal_id)?;
                Ok(json!({ "deal_id": deal_id, "deleted": true }))
            }
        }
    }

    fn tx(&self, cmd: TxCommand) -> Result<serde_json::Value> {
        let signer = TransactionSigner::new();

        match cmd {
            TxCommand::Sign {
                kind,
                chain,
                tx,
                owner,
            } => {
                let account = self.resolve(owner)?;
                let signed = signer.sign_base64(kind, chain, &tx, &account)?;
                Ok(serde_json::to_value(signed)?)
            }
            TxCommand::IsSigned { tx, public_keys } => {
                let raw = BASE64.decode(tx.trim())?;
                let keys: Vec<&str> = public_keys.iter().map(String::as_str).collect();
                let signed = signer.signed_by(&raw, &keys)?;
                Ok(json!({ "signed_by": signed }))
            }
        }
    }

    fn resolve(&self, args: AccountArgs) -> Result<Account> {
        match (args.account, args.key) {
            (Some(public_key), _) => {
                let loader = self.loader()?;
                loader.restore(&public_key, self.password()?)?;
                loader.account_store().get(&public_key)
            }
            (None, Some(key)) => KeyManager::restore(&key, args.key_chain),
            (None, None) => Err(EscrowSignError::KeyNotFound(
                "Pass --account or --key".to_string(),
            )),
        }
    }

    fn loader(&self) -> Result<BackupLoader> {
        BackupLoader::new(
            &self.config.storage.backup_path,
            Arc::new(AccountStore::new()),
            self.config.storage.kdf,
        )
    }

    fn deal_shares(&self) -> Result<DealShareStore> {
        DealShareStore::new(&self.config.storage.deal_share_path)
    }

    fn password(&self) -> Result<&SecretString> {
        self.password.as_ref().ok_or_else(|| {
            EscrowSignError::ConfigError(
                "ESCROWSIGN_BACKUP_PASSWORD environment variable not set".to_string(),
            )
        })
    }
}
