//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub algod: AlgodConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlgodConfig {
    /// Node base URL
    #[serde(default = "default_algod_url")]
    pub base_url: String,
    /// X-Algo-API-Token value; public endpoints accept an empty token
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Genesis id handed to the signing authority on enable()
    #[serde(default = "default_genesis_id")]
    pub genesis_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    /// Bounded wait for the signing authority before the attempt fails
    #[serde(default = "default_signing_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    /// Elapsed rounds before the outcome is declared unknown.
    /// Policy knob, not a protocol constant.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Directory for the durable connected-address cache
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

// Default value functions
fn default_algod_url() -> String {
    std::env::var("ALGOD_URL").unwrap_or_else(|_| "https://testnet-api.algonode.cloud".into())
}

fn default_timeout_ms() -> u64 {
    15000
}

fn default_genesis_id() -> String {
    "testnet-v1.0".into()
}

fn default_signing_timeout_secs() -> u64 {
    120
}

fn default_max_rounds() -> u64 {
    10
}

fn default_cache_dir() -> String {
    "cache".into()
}

impl Default for AlgodConfig {
    fn default() -> Self {
        Self {
            base_url: default_algod_url(),
            token: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            genesis_id: default_genesis_id(),
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_signing_timeout_secs(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algod: AlgodConfig::default(),
            network: NetworkConfig::default(),
            signing: SigningConfig::default(),
            confirmation: ConfirmationConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix BRIDGE_)
            .add_source(
                config::Environment::with_prefix("BRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.algod.base_url)
            .with_context(|| format!("Invalid algod base_url: {}", self.algod.base_url))?;

        if self.confirmation.max_rounds == 0 {
            anyhow::bail!("confirmation.max_rounds must be positive");
        }

        if self.signing.timeout_secs == 0 {
            anyhow::bail!("signing.timeout_secs must be positive");
        }

        if self.algod.timeout_ms == 0 {
            anyhow::bail!("algod.timeout_ms must be positive");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Algod:
    base_url: {}
    token: {}
    timeout: {}ms
  Network:
    genesis_id: {}
  Signing:
    timeout: {}s
  Confirmation:
    max_rounds: {}
  Cache:
    dir: {}
"#,
            self.algod.base_url,
            if self.algod.token.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.algod.timeout_ms,
            self.network.genesis_id,
            self.signing.timeout_secs,
            self.confirmation.max_rounds,
            self.cache.dir,
        )
    }
}
