//! Core traits and types for the query cache.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Identity of one cacheable query (resource kind plus parameters).
///
/// Two keys that compare equal share one cache slot, so implementors must
/// normalize their parameters before constructing a key.
pub trait QueryKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {
  /// Resource kind, used for pattern invalidation (e.g. "book-detail").
  fn kind(&self) -> &'static str;

  /// Human readable description for logs.
  fn description(&self) -> String;
}

/// Errors a fetcher may produce. The cache clones errors to every waiter.
pub trait FetchError: Clone + Display + From<CacheError> + Send + Sync + 'static {}

impl<T> FetchError for T where T: Clone + Display + From<CacheError> + Send + Sync + 'static {}

/// Errors raised by the cache itself rather than by a fetcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
  /// The slot holds data of a different type than the caller asked for.
  #[error("cached value for {key} has an unexpected type")]
  TypeMismatch { key: String },
}

/// Selects the cache slots an invalidation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern<K> {
  /// Exactly this identity
  Exact(K),
  /// Every identity of the given kind
  Kind(&'static str),
  /// Every identity in the cache
  All,
}

impl<K: QueryKey> KeyPattern<K> {
  pub fn matches(&self, key: &K) -> bool {
    match self {
      Self::Exact(expected) => expected == key,
      Self::Kind(kind) => key.kind() == *kind,
      Self::All => true,
    }
  }
}

/// What happened to a slot, delivered to its subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEventKind {
  /// A fetch started
  Fetching,
  /// A fetch settled with data
  Success,
  /// A fetch settled with an error
  Error,
  /// The slot was marked stale
  Invalidated,
  /// Data was written directly
  Updated,
  /// The slot was dropped from the cache
  Removed,
}

/// Notification delivered to subscribers of a key.
#[derive(Debug, Clone)]
pub struct QueryEvent<K> {
  pub key: K,
  pub kind: QueryEventKind,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, PartialEq, Eq, Hash)]
  enum TestKey {
    Shelf(u32),
    Desk,
  }

  impl QueryKey for TestKey {
    fn kind(&self) -> &'static str {
      match self {
        Self::Shelf(_) => "shelf",
        Self::Desk => "desk",
      }
    }

    fn description(&self) -> String {
      format!("{:?}", self)
    }
  }

  #[test]
  fn test_exact_pattern() {
    let pattern = KeyPattern::Exact(TestKey::Shelf(1));
    assert!(pattern.matches(&TestKey::Shelf(1)));
    assert!(!pattern.matches(&TestKey::Shelf(2)));
    assert!(!pattern.matches(&TestKey::Desk));
  }

  #[test]
  fn test_kind_pattern() {
    let pattern = KeyPattern::<TestKey>::Kind("shelf");
    assert!(pattern.matches(&TestKey::Shelf(1)));
    assert!(pattern.matches(&TestKey::Shelf(7)));
    assert!(!pattern.matches(&TestKey::Desk));
  }

  #[test]
  fn test_all_pattern() {
    assert!(KeyPattern::<TestKey>::All.matches(&TestKey::Desk));
  }
}
