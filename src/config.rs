//! Configuration types for Trellis.
//!
//! [`Config`] controls engine-wide behavior: storage cache sizing and
//! commit durability. Per-index tuning lives in the index configs
//! ([`crate::index::dense::DenseIndexConfig`] and friends) fixed at index
//! creation.
//!
//! # Example
//! ```rust
//! use trellisdb::{Config, SyncMode};
//!
//! // Use defaults
//! let config = Config::default();
//!
//! // Customize for production
//! let config = Config {
//!     cache_size_mb: 128,
//!     sync_mode: SyncMode::Normal,
//! };
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Database configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use trellisdb::Config;
///
/// let config = Config {
///     cache_size_mb: 256,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Cache size in megabytes for the storage engine.
    ///
    /// Higher values improve read performance but use more memory.
    /// Default: 64 MB
    pub cache_size_mb: usize,

    /// Durability mode for committed transactions.
    pub sync_mode: SyncMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_size_mb: 64,
            sync_mode: SyncMode::Normal,
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `TrellisDb::open()`. You can also call this
    /// explicitly to check configuration before attempting to open.
    ///
    /// # Errors
    /// Returns `SchemaError` if `cache_size_mb` is 0.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.cache_size_mb == 0 {
            return Err(SchemaError::invalid_field(
                "cache_size_mb",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Durability mode for committed transactions.
///
/// Controls the trade-off between commit latency and crash safety.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Sync to disk on every commit.
    ///
    /// This is the default and recommended setting. Committed transactions
    /// survive crashes.
    #[default]
    Normal,

    /// Async sync (faster commits, may lose recent commits on crash).
    ///
    /// Use for development or bulk loads where the last few commits are
    /// reproducible.
    Fast,
}

impl SyncMode {
    /// Returns true if this mode is async (may lose data on crash).
    pub fn is_fast(&self) -> bool {
        matches!(self, Self::Fast)
    }

    pub(crate) fn durability(&self) -> redb::Durability {
        match self {
            Self::Normal => redb::Durability::Immediate,
            Self::Fast => redb::Durability::Eventual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache_size_mb, 64);
        assert_eq!(config.sync_mode, SyncMode::Normal);
    }

    #[test]
    fn test_validate_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_cache_size_zero() {
        let config = Config {
            cache_size_mb: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, SchemaError::InvalidField { field, .. } if field == "cache_size_mb")
        );
    }

    #[test]
    fn test_sync_mode_checks() {
        assert!(!SyncMode::Normal.is_fast());
        assert!(SyncMode::Fast.is_fast());
    }
}
