//! Configuration management
//!
//! Settings can come from a JSON file ([`load_from`]) or from the process
//! environment ([`Config::from_env`]). Missing state-cipher secrets fall back
//! to development defaults, which is refused outright in production.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use crate::Result;
use crate::error::Error;

/// AES-256 key length in bytes
pub const STATE_KEY_LEN: usize = 32;

/// AES block / IV length in bytes
pub const STATE_IV_LEN: usize = 16;

const DEV_STATE_SECRET: &str = "super secret that needs to be set in env";
const DEV_STATE_IV: &str = "development-only-state-iv";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Secrets used to seal the OAuth `state` parameter
    #[serde(default)]
    pub state_cipher: StateCipherConfig,

    /// Default state/verifier store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,
}

/// State cipher secrets
///
/// Both values are truncated to the cipher's key and IV lengths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCipherConfig {
    #[serde(default = "default_state_secret")]
    pub secret: String,

    #[serde(default = "default_state_iv")]
    pub iv: String,

    /// Refuse development defaults when set
    #[serde(default)]
    pub production: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Seconds a pending authorization stays valid
    #[serde(default = "default_state_ttl_secs")]
    pub ttl_secs: u64,

    /// Upper bound on pending authorizations kept in memory
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_state_secret() -> String {
    DEV_STATE_SECRET.to_string()
}

fn default_state_iv() -> String {
    DEV_STATE_IV.to_string()
}

fn default_state_ttl_secs() -> u64 {
    600
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for StateCipherConfig {
    fn default() -> Self {
        Self {
            secret: default_state_secret(),
            iv: default_state_iv(),
            production: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_state_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl StateCipherConfig {
    /// Read `SOCIAL_STATE_SECRET`, `SOCIAL_STATE_IV` and `SOCIAL_PRODUCTION`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let production = lookup("SOCIAL_PRODUCTION")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let config = Self {
            secret: lookup("SOCIAL_STATE_SECRET").unwrap_or_else(default_state_secret),
            iv: lookup("SOCIAL_STATE_IV").unwrap_or_else(default_state_iv),
            production,
        };
        config.validate()?;
        Ok(config)
    }

    /// Whether either value is still the built-in development default
    pub fn uses_dev_defaults(&self) -> bool {
        self.secret == DEV_STATE_SECRET || self.iv == DEV_STATE_IV
    }

    /// Check lengths and the production guard
    ///
    /// Outside production a development default is accepted with a warning.
    pub fn validate(&self) -> Result<()> {
        if self.secret.len() < STATE_KEY_LEN {
            return Err(Error::Config(format!(
                "state secret must be at least {} bytes, got {}",
                STATE_KEY_LEN,
                self.secret.len()
            )));
        }
        if self.iv.len() < STATE_IV_LEN {
            return Err(Error::Config(format!(
                "state IV must be at least {} bytes, got {}",
                STATE_IV_LEN,
                self.iv.len()
            )));
        }

        if self.uses_dev_defaults() {
            if self.production {
                return Err(Error::Config(
                    "SOCIAL_STATE_SECRET and SOCIAL_STATE_IV must be set in production".to_string(),
                ));
            }
            tracing::warn!(
                "State cipher is using the built-in development secret; \
                 anyone with this source can forge state tokens"
            );
        }

        Ok(())
    }

    /// Secret truncated to the AES-256 key length
    pub(crate) fn key_bytes(&self) -> Result<[u8; STATE_KEY_LEN]> {
        truncate(self.secret.as_bytes(), "state secret")
    }

    /// IV truncated to the AES block length
    pub(crate) fn iv_bytes(&self) -> Result<[u8; STATE_IV_LEN]> {
        truncate(self.iv.as_bytes(), "state IV")
    }
}

fn truncate<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|head| head.try_into().ok())
        .ok_or_else(|| Error::Config(format!("{} must be at least {} bytes", what, N)))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl Config {
    /// Build configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let state_cipher = StateCipherConfig::from_lookup(&lookup)?;

        let mut store = StoreConfig::default();
        if let Some(ttl) = parse_number(&lookup, "SOCIAL_STATE_TTL_SECS")? {
            store.ttl_secs = ttl;
        }
        if let Some(max) = parse_number(&lookup, "SOCIAL_STATE_MAX_ENTRIES")? {
            store.max_entries = max;
        }

        let mut http = HttpConfig::default();
        if let Some(timeout) = parse_number(&lookup, "SOCIAL_HTTP_TIMEOUT_SECS")? {
            http.timeout_secs = timeout;
        }

        Ok(Self {
            state_cipher,
            store,
            http,
        })
    }
}

fn parse_number(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} is not a number: {}", key, e))),
        None => Ok(None),
    }
}

/// Load configuration from a JSON file
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::Config(format!("Config not found at {:?}", path)));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {:?}: {}", path, e)))?;
    let config: Config = serde_json::from_str(&content)?;
    config.state_cipher.validate()?;
    Ok(config)
}
