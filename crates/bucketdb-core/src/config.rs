//! Configuration management for BucketDB
//!
//! Provides durability presets and validation for store limits.

use crate::error::{StoreError, StoreResult};

/// BucketDB store configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum key size in bytes (also bounds bucket names)
    pub max_key_size: usize,
    /// Maximum value size in bytes
    pub max_value_size: usize,
    /// WAL file rotation threshold (bytes)
    pub wal_rotation_size_bytes: u64,
    /// Call durable_sync after every commit. When false, commits land in the
    /// OS page cache and survive a process crash but not a power loss.
    pub sync_on_commit: bool,
}

impl Config {
    /// Every commit is synced to persistent media before it returns.
    pub fn durable() -> Self {
        Self {
            max_key_size: 1024,
            max_value_size: 32 * 1024 * 1024,
            wal_rotation_size_bytes: 100 * 1024 * 1024,
            sync_on_commit: true,
        }
    }

    /// Commits skip the fsync. Suited to tests and bulk imports.
    pub fn relaxed() -> Self {
        Self {
            sync_on_commit: false,
            ..Self::durable()
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> StoreResult<()> {
        if self.max_key_size == 0 || self.max_key_size > u16::MAX as usize {
            return Err(StoreError::InvalidConfig(
                "max_key_size must be in [1, 65535]".into(),
            ));
        }
        if self.max_value_size == 0 || self.max_value_size > 128 * 1024 * 1024 {
            return Err(StoreError::InvalidConfig(
                "max_value_size must be in [1, 128MB]".into(),
            ));
        }
        if self.wal_rotation_size_bytes < 1024 * 1024 {
            return Err(StoreError::InvalidConfig(
                "wal_rotation_size_bytes must be >= 1MB".into(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self { Self::durable() }
}
