//! Sync configuration.
//!
//! Every field has a default, so a TOML file only needs the keys it
//! overrides:
//!
//! ```toml
//! page_size = 10
//!
//! [remote]
//! base_url = "http://localhost:3000"
//! ```

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the API (e.g. `https://jsonplaceholder.typicode.com`).
    pub base_url: String,
    /// HTTP client timeout for each request (seconds).
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://jsonplaceholder.typicode.com".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Records per page for `load_first` / `load_more`.
    pub page_size: usize,
    /// Total record count assumed for the remote when answering `has_more`
    /// online. The API does not report totals.
    pub assumed_remote_total: usize,
    /// Maximum replays in flight per collection during reconciliation.
    pub max_concurrent_replays: usize,
    /// How often the connectivity probe runs (seconds).
    pub probe_interval_secs: u64,
    /// Remote API settings.
    pub remote: RemoteConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            assumed_remote_total: 100,
            max_concurrent_replays: 8,
            probe_interval_secs: 30,
            remote: RemoteConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(source: &str) -> SyncResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| SyncError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> SyncResult<()> {
        if self.max_concurrent_replays == 0 {
            return Err(SyncError::Config(
                "max_concurrent_replays must be at least 1".to_string(),
            ));
        }
        if self.remote.base_url.trim().is_empty() {
            return Err(SyncError::Config("remote.base_url is empty".to_string()));
        }
        Ok(())
    }
}
