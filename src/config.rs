use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CacheConfig, QueryOptions};

pub const FALLBACK_API_URL: &str = "http://localhost:3000/api";

/// All fields are optional; a missing config file means defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub cache: CacheSettings,
  pub borrow: BorrowConfig,
  /// Books per page in listings
  pub page_size: PageSize,
  /// Set from the command line; beats the environment and the file
  #[serde(skip)]
  api_url_override: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: Option<String>,
  /// Total request timeout; unset leaves it to the transport
  pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
  /// Seconds before cached data is refetched on read
  pub stale_secs: u64,
  /// Seconds an unobserved entry is kept
  pub gc_secs: u64,
  /// Extra attempts for a failed fetch
  pub retry: u32,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self {
      stale_secs: 60,
      gc_secs: 300,
      retry: 2,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BorrowConfig {
  pub default_duration_days: u32,
}

impl Default for BorrowConfig {
  fn default() -> Self {
    Self {
      default_duration_days: 14,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PageSize(pub u32);

impl Default for PageSize {
  fn default() -> Self {
    Self(20)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./libterm.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/libterm/config.yaml
  ///
  /// No file found means defaults.
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("libterm.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("libterm").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes as null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  pub fn override_api_url(&mut self, url: impl Into<String>) {
    self.api_url_override = Some(url.into());
  }

  /// Resolve the API base URL.
  ///
  /// Checks the command-line override, LIBTERM_API_URL, then API_BASE_URL,
  /// then the config file, then falls back to a local development server.
  pub fn api_base_url(&self) -> String {
    let from_env = std::env::var("LIBTERM_API_URL")
      .ok()
      .filter(|url| !url.trim().is_empty());
    Self::resolve_base_url(
      self.api_url_override.clone().or(from_env),
      std::env::var("API_BASE_URL").ok(),
      self.api.base_url.clone(),
    )
  }

  fn resolve_base_url(
    primary: Option<String>,
    secondary: Option<String>,
    configured: Option<String>,
  ) -> String {
    [primary, secondary, configured]
      .into_iter()
      .flatten()
      .map(|url| url.trim().to_string())
      .find(|url| !url.is_empty())
      .unwrap_or_else(|| FALLBACK_API_URL.to_string())
  }

  pub fn request_timeout(&self) -> Option<Duration> {
    self
      .api
      .timeout_secs
      .filter(|secs| *secs > 0)
      .map(Duration::from_secs)
  }

  pub fn cache_config(&self) -> CacheConfig {
    CacheConfig {
      default_options: self.query_options(),
      gc_time: Duration::from_secs(self.cache.gc_secs),
    }
  }

  /// Default options for every library query.
  pub fn query_options(&self) -> QueryOptions {
    QueryOptions::default()
      .with_stale_time(Duration::from_secs(self.cache.stale_secs))
      .with_retry(self.cache.retry)
  }

  pub fn page_size(&self) -> u32 {
    self.page_size.0.max(1)
  }
}
