//! Cache configuration.
//!
//! ```toml
//! prefix = "ark.mainnet"
//! max_capacity = 5000
//! default_ttl_seconds = 120
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};

pub const DEFAULT_PREFIX: &str = "walletsync";
pub const DEFAULT_MAX_CAPACITY: u64 = 10_000;
pub const DEFAULT_TTL_SECONDS: u64 = 300;

/// Settings for a [`TtlCache`](crate::TtlCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Namespace mixed into every physical key.
    pub prefix: String,
    pub max_capacity: u64,
    /// TTL applied by `put`.
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            max_capacity: DEFAULT_MAX_CAPACITY,
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

impl CacheConfig {
    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| StoreError::Config {
            reason: format!("failed to parse TOML config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` or TOML file.  A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = ?path, "cache config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| StoreError::Config {
            reason: format!("failed to read config file: {e}"),
        })?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => {
                let config: Self = serde_json::from_str(&content)?;
                config.validate()?;
                config
            }
            _ => Self::from_toml_str(&content)?,
        };

        info!(path = ?path, prefix = %config.prefix, "cache config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.prefix.trim().is_empty() {
            return Err(StoreError::Config {
                reason: "prefix must not be empty".into(),
            });
        }
        if self.max_capacity == 0 {
            return Err(StoreError::Config {
                reason: "max_capacity must be at least 1".into(),
            });
        }
        Ok(())
    }
}
