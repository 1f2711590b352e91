use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub paging: PagingConfig,
  /// Zone used to decide which calendar date is "today"
  pub time_zone: TimeZoneSetting,
  /// Where the database, preferences and logs live (defaults to the XDG data dir)
  pub data_dir: Option<PathBuf>,
  /// Log filter used when RUST_LOG is not set
  pub log_level: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api: ApiConfig::default(),
      paging: PagingConfig::default(),
      time_zone: TimeZoneSetting::default(),
      data_dir: None,
      log_level: "info".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  pub timeout_secs: u64,
  /// Overrides the default "dadjokes/<version> (<repository>)" agent
  pub user_agent: Option<String>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "https://icanhazdadjoke.com".to_string(),
      timeout_secs: 15,
      user_agent: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
  /// Days per page, also the page size requested from the API
  pub page_size: u32,
  /// Date of day offset 0
  pub epoch: NaiveDate,
}

impl Default for PagingConfig {
  fn default() -> Self {
    Self {
      page_size: 7,
      epoch: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap_or_default(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeZoneSetting {
  /// The system's local zone at the moment "today" is computed
  #[default]
  Local,
  Utc,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./dadjokes.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/dadjokes/config.yaml
  ///
  /// Unlike an explicit path, a missing default file is not an error; the
  /// built-in defaults are used instead.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("dadjokes.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("dadjokes").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  pub fn validate(&self) -> Result<()> {
    if self.paging.page_size == 0 {
      return Err(eyre!("paging.page_size must be at least 1"));
    }
    Ok(())
  }

  /// Resolve the data directory, falling back to $XDG_DATA_HOME/dadjokes.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("dadjokes"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_file_uses_defaults() {
    let config = Config::from_yaml("{}").unwrap();
    assert_eq!(config.api.base_url, "https://icanhazdadjoke.com");
    assert_eq!(config.paging.page_size, 7);
    assert_eq!(
      config.paging.epoch,
      NaiveDate::from_ymd_opt(2024, 11, 1).unwrap()
    );
    assert_eq!(config.time_zone, TimeZoneSetting::Local);
    assert_eq!(config.log_level, "info");
  }

  #[test]
  fn test_partial_override() {
    let yaml = r#"
api:
  base_url: http://localhost:8080
paging:
  page_size: 10
  epoch: 2025-01-01
time_zone: utc
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.api.base_url, "http://localhost:8080");
    assert_eq!(config.api.timeout_secs, 15);
    assert_eq!(config.paging.page_size, 10);
    assert_eq!(
      config.paging.epoch,
      NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    );
    assert_eq!(config.time_zone, TimeZoneSetting::Utc);
  }

  #[test]
  fn test_zero_page_size_is_invalid() {
    let config = Config::from_yaml("paging:\n  page_size: 0\n").unwrap();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_unknown_time_zone_is_rejected() {
    assert!(Config::from_yaml("time_zone: mars\n").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let result = Config::load(Some(Path::new("/definitely/not/here.yaml")));
    assert!(result.is_err());
  }

  #[test]
  fn test_explicit_data_dir_wins() {
    let config = Config {
      data_dir: Some(PathBuf::from("/tmp/jokes")),
      ..Config::default()
    };
    assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/jokes"));
  }
}
