//! Shared loading/content/empty/error state for every screen.

use std::sync::Arc;

use crate::cache::QueryEntry;

/// What a screen should show for one query.
#[derive(Debug, PartialEq)]
pub enum ScreenState<'a, T, E> {
  /// Skeleton or spinner; nothing usable yet
  Loading,
  /// Data to render
  Content(&'a T),
  /// Data arrived but there is nothing in it
  Empty,
  /// First load failed; offer a retry
  Error(&'a E),
}

/// Inputs that pin a screen's state without a live fetch.
#[derive(Debug)]
pub struct ScreenOptions<'a, T> {
  /// Always render the loading state
  pub force_loading: bool,
  /// Shown while the query has no data of its own
  pub initial_data: Option<&'a T>,
}

impl<T> Default for ScreenOptions<'_, T> {
  fn default() -> Self {
    Self {
      force_loading: false,
      initial_data: None,
    }
  }
}

impl<'a, T> ScreenOptions<'a, T> {
  pub fn with_initial_data(data: &'a T) -> Self {
    Self {
      force_loading: false,
      initial_data: Some(data),
    }
  }

  pub fn loading() -> Self {
    Self {
      force_loading: true,
      initial_data: None,
    }
  }
}

/// Owned seed a view keeps for one of its queries and turns into
/// `ScreenOptions` on every render.
#[derive(Debug)]
pub struct ScreenSeed<T> {
  force_loading: bool,
  initial_data: Option<Arc<T>>,
}

impl<T> Default for ScreenSeed<T> {
  fn default() -> Self {
    Self {
      force_loading: false,
      initial_data: None,
    }
  }
}

impl<T> Clone for ScreenSeed<T> {
  fn clone(&self) -> Self {
    Self {
      force_loading: self.force_loading,
      initial_data: self.initial_data.clone(),
    }
  }
}

impl<T> ScreenSeed<T> {
  pub fn loading() -> Self {
    Self {
      force_loading: true,
      initial_data: None,
    }
  }

  pub fn with_initial_data(data: T) -> Self {
    Self {
      force_loading: false,
      initial_data: Some(Arc::new(data)),
    }
  }

  pub fn initial_data(&self) -> Option<&T> {
    self.initial_data.as_deref()
  }

  /// Shared handle to the seed, for memo inputs compared by identity
  pub fn shared_initial_data(&self) -> Option<Arc<T>> {
    self.initial_data.clone()
  }

  pub fn options(&self) -> ScreenOptions<'_, T> {
    if self.force_loading {
      return ScreenOptions::loading();
    }
    match self.initial_data() {
      Some(data) => ScreenOptions::with_initial_data(data),
      None => ScreenOptions::default(),
    }
  }
}

impl<'a, T, E> ScreenState<'a, T, E> {
  /// Stale-while-revalidate: once there is data, background refreshes and
  /// their failures never take the screen back to loading or error.
  pub fn resolve(
    entry: &'a QueryEntry<T, E>,
    is_empty: impl Fn(&T) -> bool,
    options: &ScreenOptions<'a, T>,
  ) -> Self {
    if options.force_loading {
      return Self::Loading;
    }

    if let Some(data) = entry.data().or(options.initial_data) {
      return if is_empty(data) {
        Self::Empty
      } else {
        Self::Content(data)
      };
    }

    match entry.error() {
      Some(error) if !entry.is_fetching => Self::Error(error),
      _ => Self::Loading,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, Self::Loading)
  }
}

/// Error of a failed background refresh while older data is still shown.
pub fn refresh_error<T, E>(entry: &QueryEntry<T, E>) -> Option<&E> {
  entry.data().and(entry.error())
}

/// Data is shown and a newer copy is being fetched.
pub fn is_refreshing<T, E>(entry: &QueryEntry<T, E>) -> bool {
  entry.data().is_some() && entry.is_fetching
}
