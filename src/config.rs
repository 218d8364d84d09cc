//! Configuration for MarketLog
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{LogError, Result};

/// Filesystem page size the default rotation threshold is built from
pub const PAGE_SIZE: u64 = 4096;

/// Default rotation threshold: 25,600 pages (100 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = PAGE_SIZE * 25_600;

/// Default read size used by the reindexer
pub const DEFAULT_REINDEX_CHUNK_SIZE: usize = 64 * 1024;

/// Main configuration for a MarketLog engine
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all streams
    /// Internal structure:
    ///   {base_dir}/
    ///     └── {stream}/
    ///           ├── 00000000000000000000000000000001.jsonl
    ///           └── 00000000000000000000000000000001.jsonl.idx
    pub base_dir: PathBuf,

    /// Data file size at which the next append rotates to a new file
    pub max_file_size: u64,

    /// Sync strategy: whether writes are followed by an fsync
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Recovery Configuration
    // -------------------------------------------------------------------------
    /// Bytes read per chunk while rebuilding indexes
    pub reindex_chunk_size: usize,
}

/// Data and index sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Leave flushing to the OS page cache
    OsBuffered,

    /// `sync_data` after every data and index write (safest, slowest)
    EveryWrite,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./marketlog_data"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            sync_strategy: SyncStrategy::OsBuffered,
            reindex_chunk_size: DEFAULT_REINDEX_CHUNK_SIZE,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the values the engine depends on
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(LogError::Config("max_file_size must be > 0".to_string()));
        }
        if self.reindex_chunk_size == 0 {
            return Err(LogError::Config(
                "reindex_chunk_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the base directory (root for all streams)
    pub fn base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.base_dir = path.into();
        self
    }

    /// Set the rotation threshold (in bytes)
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.config.max_file_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the reindex read chunk size (in bytes)
    pub fn reindex_chunk_size(mut self, size: usize) -> Self {
        self.config.reindex_chunk_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate
    pub fn try_build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
