//! Harness configuration via `feedcheck.toml`
//!
//! Optional file in the working directory. Every key has a default, so an
//! absent file (or an empty one) gives the standard workload against a fresh
//! `example<unix-seconds>` collection.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use feedcheck_core::{Error, Result};
use feedcheck_store::{FeedOptions, FullDocumentMode};

use crate::generator::PhaseCounts;
use crate::shape::ShapeStrategy;

/// Config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "feedcheck.toml";

/// Prefix of generated collection names
pub const COLLECTION_PREFIX: &str = "example";

fn default_generate() -> usize {
    2000
}

fn default_update() -> usize {
    100
}

fn default_remove() -> usize {
    100
}

fn default_batch_ceiling() -> usize {
    1000
}

fn default_feed_batch_size() -> u32 {
    2
}

fn default_max_await_ms() -> u64 {
    100
}

/// Harness configuration loaded from `feedcheck.toml`.
///
/// # Example
///
/// ```toml
/// generate = 2000
/// update = 100
/// remove = 100
/// batch_ceiling = 1000
/// feed_batch_size = 2
/// max_await_ms = 100
/// # collection = "example_fixed"
/// # max_passes = 10
///
/// [shapes]
/// kind = "uniform"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Generate phase operation count
    #[serde(default = "default_generate")]
    pub generate: usize,
    /// Update phase operation count
    #[serde(default = "default_update")]
    pub update: usize,
    /// Remove phase operation count
    #[serde(default = "default_remove")]
    pub remove: usize,
    /// Maximum operations per bulk write
    #[serde(default = "default_batch_ceiling")]
    pub batch_ceiling: usize,
    /// Events requested per feed round trip
    #[serde(default = "default_feed_batch_size")]
    pub feed_batch_size: u32,
    /// Longest the feed waits for new events before reporting idle
    #[serde(default = "default_max_await_ms")]
    pub max_await_ms: u64,
    /// Fixed collection name; generated from the start time when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// How update shapes are chosen
    #[serde(default)]
    pub shapes: ShapeStrategy,
    /// Stop after this many passes; run forever when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_passes: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            generate: default_generate(),
            update: default_update(),
            remove: default_remove(),
            batch_ceiling: default_batch_ceiling(),
            feed_batch_size: default_feed_batch_size(),
            max_await_ms: default_max_await_ms(),
            collection: None,
            shapes: ShapeStrategy::default(),
            max_passes: None,
        }
    }
}

impl HarnessConfig {
    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: HarnessConfig = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", CONFIG_FILE_NAME, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Load `feedcheck.toml` from `dir`, or the defaults if there is none.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings no pass could run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_ceiling == 0 {
            return Err(Error::Config("batch_ceiling must be at least 1".to_string()));
        }
        if self.feed_batch_size == 0 {
            return Err(Error::Config(
                "feed_batch_size must be at least 1".to_string(),
            ));
        }
        if matches!(&self.collection, Some(name) if name.is_empty()) {
            return Err(Error::Config("collection must not be empty".to_string()));
        }
        Ok(())
    }

    /// Per-phase counts
    pub fn counts(&self) -> PhaseCounts {
        PhaseCounts {
            generate: self.generate,
            update: self.update,
            remove: self.remove,
        }
    }

    /// Feed subscription options; snapshots are always requested
    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            full_document: FullDocumentMode::UpdateLookup,
            batch_size: self.feed_batch_size,
            max_await: Duration::from_millis(self.max_await_ms),
        }
    }

    /// Collection to use for a run that starts at `now`
    pub fn collection_name(&self, now: DateTime<Utc>) -> String {
        match &self.collection {
            Some(name) => name.clone(),
            None => format!("{}{}", COLLECTION_PREFIX, now.timestamp()),
        }
    }
}
