//! Synchronizer configuration.
//!
//! [`SyncConfig`] selects the aggregation strategy and bounds the fan-out of
//! the parallel strategy.  It can be built in code, parsed from TOML, or
//! loaded from a TOML / JSON file.
//!
//! ```toml
//! strategy = "parallel"
//! concurrency = 4
//! max_pages = 500
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{KernelError, Result};
use crate::executor::DEFAULT_CONCURRENCY;

/// Default upper bound on pages followed by the serial strategy.
pub const DEFAULT_MAX_PAGES: u64 = 10_000;

/// Which aggregation strategy a [`Synchronizer`](crate::Synchronizer) uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Fetch pages one after another, in page order.
    Serial,
    /// Fetch page 1, then every remaining page concurrently.
    #[default]
    Parallel,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => f.write_str("serial"),
            Self::Parallel => f.write_str("parallel"),
        }
    }
}

/// Synchronizer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub strategy: StrategyKind,
    /// Maximum page fetches in flight for the parallel strategy.
    pub concurrency: usize,
    /// Pages the serial strategy follows before giving up.
    pub max_pages: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            concurrency: DEFAULT_CONCURRENCY,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl SyncConfig {
    /// Serial strategy with default limits.
    pub fn serial() -> Self {
        Self {
            strategy: StrategyKind::Serial,
            ..Self::default()
        }
    }

    /// Parallel strategy with the given concurrency bound.
    pub fn parallel(concurrency: usize) -> Self {
        Self {
            strategy: StrategyKind::Parallel,
            concurrency,
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| KernelError::InvalidConfig {
            reason: format!("failed to parse TOML config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` or TOML file.  A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = ?path, "sync config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| KernelError::InvalidConfig {
            reason: format!("failed to read config file: {e}"),
        })?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            let config: Self =
                serde_json::from_str(&content).map_err(|e| KernelError::InvalidConfig {
                    reason: format!("failed to parse JSON config: {e}"),
                })?;
            config.validate()?;
            config
        } else {
            Self::from_toml_str(&content)?
        };

        info!(path = ?path, strategy = %config.strategy, "sync config loaded");
        Ok(config)
    }

    /// Reject values that would stall or disable syncing.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(KernelError::InvalidConfig {
                reason: "concurrency must be at least 1".into(),
            });
        }
        if self.max_pages == 0 {
            return Err(KernelError::InvalidConfig {
                reason: "max_pages must be at least 1".into(),
            });
        }
        Ok(())
    }
}
