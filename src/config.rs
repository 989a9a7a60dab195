//! User settings stored in `config.toml`.

use crate::diff::IgnoreSet;
use crate::error::{DcError, Result};
use crate::fsio::{self, RetryPolicy};
use crate::statics;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Show change notifications while watching.
    pub toast_enabled: bool,
    /// Paths (and dotted prefixes) the watcher never reports.
    pub toast_ignore_paths: Vec<String>,
    pub watch_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            toast_enabled: true,
            toast_ignore_paths: statics::DC_BULK_FIELDS.iter().map(|s| s.to_string()).collect(),
            watch_interval_ms: 300,
        }
    }
}

impl Config {
    /// Read `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Config> {
        let bytes = match fsio::read_with_retry(path, RetryPolicy::QUICK) {
            Ok(bytes) => bytes,
            Err(DcError::NotFound(_)) => return Ok(Config::default()),
            Err(e) => return Err(e),
        };
        let text = String::from_utf8_lossy(&bytes);
        toml::from_str(&text).map_err(|e| DcError::InvalidConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| DcError::InvalidConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fsio::write_atomic(path, text.as_bytes())
    }

    pub fn ignore_set(&self) -> IgnoreSet {
        IgnoreSet::new(self.toast_ignore_paths.iter().map(String::as_str))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(1))
    }
}
