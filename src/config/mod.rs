pub mod env;
pub use env::apply_env_overrides;

use crate::crypto::Keyring;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Complete idp-vault configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub login: LoginConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Bearer token required for provider and admin routes. None = open (dev mode).
    #[serde(default)]
    pub admin_token: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            admin_token: None,
        }
    }
}

/// Provider record store
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "providers.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Secret encryption keys
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncryptionConfig {
    /// Key used for new encryptions. Defaults to the first listed key.
    #[serde(default)]
    pub active_key_id: Option<String>,
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
    /// Run the plaintext-secret migration once at start-up
    #[serde(default)]
    pub migrate_on_start: bool,
}

/// One named AES-256 key (base64, 32 bytes)
#[derive(Clone, Deserialize)]
pub struct KeyConfig {
    pub id: String,
    pub key: String,
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("id", &self.id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl EncryptionConfig {
    /// Builds the keyring. At least one key is required.
    pub fn keyring(&self) -> Result<Keyring> {
        let first = self
            .keys
            .first()
            .ok_or_else(|| anyhow!("No encryption key configured (set IDP_VAULT_ENCRYPTION_KEY)"))?;
        let active = self.active_key_id.as_deref().unwrap_or(&first.id);

        Keyring::from_keys(
            active,
            self.keys.iter().map(|k| (k.id.as_str(), k.key.as_str())),
        )
        .context("Invalid encryption configuration")
    }
}

/// List pagination limits
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

fn default_page_size() -> u64 {
    20
}

fn default_max_page_size() -> u64 {
    100
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl ListingConfig {
    /// Effective page size: 0 means the default, and the maximum caps it.
    pub fn page_size(&self, requested: u64) -> u64 {
        let size = if requested == 0 {
            self.default_page_size
        } else {
            requested
        };
        size.clamp(1, self.max_page_size.max(1))
    }
}

/// Login redirect configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginConfig {
    /// Callback URL for providers without their own; `{name}` is substituted.
    #[serde(default)]
    pub default_redirect_url: Option<String>,
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<VaultConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: VaultConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Loads `path` if it exists, otherwise defaults, then applies env overrides.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<VaultConfig> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        VaultConfig::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}
