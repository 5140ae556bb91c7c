//! Snapshots of query and mutation state handed out by the cache.

use std::sync::Arc;
use std::time::Instant;

/// Lifecycle of a query slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryState {
  /// Never fetched
  #[default]
  Idle,
  /// First fetch in progress, no data yet
  Loading,
  /// Last fetch succeeded
  Success,
  /// Last fetch failed
  Error,
}

/// Point-in-time view of one cache slot.
///
/// Data survives a failed refresh, so `data` and `error` can both be set
/// when a background refetch fails after an earlier success.
#[derive(Debug, Clone)]
pub struct QueryEntry<T, E> {
  pub state: QueryState,
  pub data: Option<Arc<T>>,
  pub error: Option<E>,
  pub fetched_at: Option<Instant>,
  pub failed_at: Option<Instant>,
  /// A fetch for this identity is in flight
  pub is_fetching: bool,
  /// Data is older than the stale time or was invalidated
  pub is_stale: bool,
}

impl<T, E> QueryEntry<T, E> {
  pub fn idle() -> Self {
    Self {
      state: QueryState::Idle,
      data: None,
      error: None,
      fetched_at: None,
      failed_at: None,
      is_fetching: false,
      is_stale: true,
    }
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_deref()
  }

  pub fn error(&self) -> Option<&E> {
    self.error.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.state == QueryState::Loading
  }

  pub fn is_success(&self) -> bool {
    self.state == QueryState::Success
  }

  pub fn is_error(&self) -> bool {
    self.state == QueryState::Error
  }
}

impl<T, E> Default for QueryEntry<T, E> {
  fn default() -> Self {
    Self::idle()
  }
}

/// State of the most recent mutation of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationStatus<E> {
  Idle,
  Pending,
  Success,
  Error(E),
}

impl<E> MutationStatus<E> {
  pub fn is_pending(&self) -> bool {
    matches!(self, Self::Pending)
  }
}

impl<E> Default for MutationStatus<E> {
  fn default() -> Self {
    Self::Idle
  }
}
