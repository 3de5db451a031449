//! Configuration for chunkstore
//!
//! Centralized configuration with sensible defaults, loadable from a YAML
//! settings file and validated before an engine is opened.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, StoreError};

/// Main configuration for a chunkstore instance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for on-disk part files
    /// Internal structure:
    ///   {parts_directory}/
    ///     ├── part_0000000001.part
    ///     └── part_0000000002.part
    pub parts_directory: PathBuf,

    /// Chunk size in bytes, fixed for the lifetime of the instance
    pub part_size: usize,

    // -------------------------------------------------------------------------
    // I/O Scheduling Configuration
    // -------------------------------------------------------------------------
    /// Memory budget in bytes for parts resident in flight
    /// (`max_memory / part_size` parts at most)
    pub max_memory: usize,

    /// Number of I/O worker threads
    #[serde(alias = "io_processes")]
    pub io_worker_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parts_directory: PathBuf::from("./parts"),
            part_size: 1024,              // 1 KB
            max_memory: 10 * 1024 * 1024, // 10 MB
            io_worker_count: 4,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from a YAML settings file
    ///
    /// Keys that are absent fall back to their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| StoreError::Config(format!("Invalid settings file: {}", e)))
    }

    /// Reject budgets the scheduler cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.part_size == 0 {
            return Err(StoreError::Capacity("part_size must be greater than 0".to_string()));
        }
        if self.io_worker_count < 1 {
            return Err(StoreError::Capacity(
                "io_worker_count must be at least 1".to_string(),
            ));
        }
        if self.max_memory < self.part_size {
            return Err(StoreError::Capacity(format!(
                "max_memory ({} bytes) is smaller than part_size ({} bytes)",
                self.max_memory, self.part_size
            )));
        }
        Ok(())
    }

    /// Maximum number of parts allowed in flight at once
    pub fn max_in_flight(&self) -> usize {
        if self.part_size == 0 {
            return 0;
        }
        self.max_memory / self.part_size
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the parts directory (root for all part files)
    pub fn parts_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.parts_directory = path.into();
        self
    }

    /// Set the part size (in bytes)
    pub fn part_size(mut self, size: usize) -> Self {
        self.config.part_size = size;
        self
    }

    /// Set the in-flight memory budget (in bytes)
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.config.max_memory = bytes;
        self
    }

    /// Set the number of I/O workers
    pub fn io_worker_count(mut self, count: usize) -> Self {
        self.config.io_worker_count = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
