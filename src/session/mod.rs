//! Session state: auth token and theme preference.
//!
//! A `Session` is passed explicitly to whatever needs it (the HTTP client,
//! the UI) rather than living in a global, so tests can hand in a session
//! backed by memory.

mod store;

pub use store::{KeyValueStore, MemoryKvStore, SqliteKvStore};

use color_eyre::Result;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

const TOKEN_KEY: &str = "auth_token";
const THEME_KEY: &str = "theme";

/// Color theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
  #[default]
  Dark,
  Light,
}

impl Theme {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Dark => "dark",
      Self::Light => "light",
    }
  }

  pub fn toggled(self) -> Self {
    match self {
      Self::Dark => Self::Light,
      Self::Light => Self::Dark,
    }
  }
}

impl fmt::Display for Theme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Theme {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "dark" => Ok(Self::Dark),
      "light" => Ok(Self::Light),
      other => Err(format!("unknown theme '{}', expected dark or light", other)),
    }
  }
}

/// Handle to persisted session state. Cloning shares the same store.
#[derive(Clone)]
pub struct Session {
  store: Arc<dyn KeyValueStore>,
}

impl Session {
  pub fn new(store: impl KeyValueStore + 'static) -> Self {
    Self {
      store: Arc::new(store),
    }
  }

  pub fn in_memory() -> Self {
    Self::new(MemoryKvStore::new())
  }

  /// Current auth token. Storage failures read as "no token".
  pub fn token(&self) -> Option<String> {
    match self.store.get(TOKEN_KEY) {
      Ok(token) => token.filter(|t| !t.trim().is_empty()),
      Err(e) => {
        warn!(error = %e, "failed to read auth token");
        None
      }
    }
  }

  pub fn is_authenticated(&self) -> bool {
    self.token().is_some()
  }

  pub fn set_token(&self, token: &str) -> Result<()> {
    self.store.set(TOKEN_KEY, token.trim())?;
    info!("auth token stored");
    Ok(())
  }

  pub fn clear_token(&self) -> Result<()> {
    self.store.remove(TOKEN_KEY)?;
    info!("auth token cleared");
    Ok(())
  }

  pub fn theme(&self) -> Theme {
    match self.store.get(THEME_KEY) {
      Ok(Some(raw)) => raw.parse().unwrap_or_default(),
      Ok(None) => Theme::default(),
      Err(e) => {
        warn!(error = %e, "failed to read theme");
        Theme::default()
      }
    }
  }

  pub fn set_theme(&self, theme: Theme) -> Result<()> {
    self.store.set(THEME_KEY, theme.as_str())
  }
}

impl fmt::Debug for Session {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Session")
      .field("authenticated", &self.is_authenticated())
      .finish()
  }
}
