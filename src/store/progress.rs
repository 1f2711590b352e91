//! Small durable key/value document for sync progress counters.

use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, warn};

/// Highest page count ever reported by the remote source.
pub const TOTAL_PAGES: &str = "total_pages";
/// Highest joke count ever reported by the remote source.
pub const TOTAL_JOKES: &str = "total_jokes";

/// Integer counters persisted as a JSON object next to the day database.
///
/// Reads are served from memory. A document that cannot be parsed is
/// replaced with an empty one instead of failing the caller.
pub struct ProgressCache {
  path: Option<PathBuf>,
  values: Mutex<BTreeMap<String, i64>>,
}

impl ProgressCache {
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create preferences directory: {}", e))?;
    }

    let values = match std::fs::read(path) {
      Ok(bytes) => match serde_json::from_slice(&bytes) {
        Ok(values) => values,
        Err(e) => {
          error!(path = %path.display(), "preferences document corrupt, resetting: {}", e);
          BTreeMap::new()
        }
      },
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
      Err(e) => {
        error!(path = %path.display(), "preferences document unreadable, resetting: {}", e);
        BTreeMap::new()
      }
    };

    Ok(Self {
      path: Some(path.to_path_buf()),
      values: Mutex::new(values),
    })
  }

  /// A cache that lives only as long as the process.
  #[cfg(test)]
  pub fn in_memory() -> Self {
    Self {
      path: None,
      values: Mutex::new(BTreeMap::new()),
    }
  }

  /// Stored value for `key`, or 0.
  pub fn get(&self, key: &str) -> i64 {
    match self.values.lock() {
      Ok(values) => values.get(key).copied().unwrap_or(0),
      Err(e) => {
        warn!("preferences lock poisoned: {}", e);
        0
      }
    }
  }

  pub fn set(&self, key: &str, value: i64) -> Result<()> {
    let mut values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.insert(key.to_string(), value);

    match &self.path {
      Some(path) => Self::persist(path, &values),
      None => Ok(()),
    }
  }

  /// Write to a sibling temp file and rename it over the document.
  fn persist(path: &Path, values: &BTreeMap<String, i64>) -> Result<()> {
    let data =
      serde_json::to_vec_pretty(values).map_err(|e| eyre!("Failed to encode preferences: {}", e))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data)
      .map_err(|e| eyre!("Failed to write preferences {}: {}", tmp.display(), e))?;
    std::fs::rename(&tmp, path)
      .map_err(|e| eyre!("Failed to replace preferences {}: {}", path.display(), e))?;

    Ok(())
  }
}
