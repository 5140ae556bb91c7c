//! View-side handles over the shared query cache.
//!
//! A view owns a `Query` (or `InfiniteQuery`) for each resource it shows.
//! The handle subscribes to its cache slot; cache events are forwarded into
//! a channel so the view can pick them up on its tick without locking.
//!
//! ```ignore
//! let mut query = library.current_borrows();
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // Entry changed, re-render
//! }
//!
//! // In render
//! match ScreenState::resolve(query.entry(), Vec::is_empty, &options) {
//!     ScreenState::Loading => render_spinner(),
//!     ScreenState::Content(data) => render_data(data),
//!     ...
//! }
//! ```

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cache::{
  FetchError, PaginatedQuery, Pages, QueryClient, QueryEntry, QueryEventKind, QueryKey,
  QueryOptions, Subscription,
};

type Fetcher<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Subscribe to `key` and forward its events into a channel.
fn watch<K: QueryKey, E: FetchError>(
  client: &QueryClient<K, E>,
  key: &K,
) -> (Subscription, mpsc::UnboundedReceiver<QueryEventKind>) {
  let (tx, rx) = mpsc::unbounded_channel();
  let subscription = client.subscribe(key.clone(), move |event| {
    // Ignore send errors - the handle may be mid-drop
    let _ = tx.send(event.kind);
  });
  (subscription, rx)
}

/// Drain pending events. Returns true if any arrived.
fn drain(events: &mut mpsc::UnboundedReceiver<QueryEventKind>) -> bool {
  let mut changed = false;
  while events.try_recv().is_ok() {
    changed = true;
  }
  changed
}

/// Handle to one cached query.
pub struct Query<K: QueryKey, E: FetchError, T> {
  client: QueryClient<K, E>,
  key: K,
  fetcher: Fetcher<T, E>,
  options: QueryOptions,
  entry: QueryEntry<T, E>,
  events: mpsc::UnboundedReceiver<QueryEventKind>,
  _subscription: Subscription,
}

impl<K: QueryKey, E: FetchError, T: Send + Sync + 'static> Query<K, E, T> {
  /// Create a handle. Nothing is fetched until `fetch()`; if the slot
  /// already holds data it is visible immediately.
  pub fn new<F, Fut>(client: QueryClient<K, E>, key: K, fetcher: F, options: QueryOptions) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
  {
    let (subscription, events) = watch(&client, &key);
    let entry = client.entry(&key);
    Self {
      client,
      key,
      fetcher: Arc::new(move || fetcher().boxed()),
      options,
      entry,
      events,
      _subscription: subscription,
    }
  }

  pub fn key(&self) -> &K {
    &self.key
  }

  pub fn entry(&self) -> &QueryEntry<T, E> {
    &self.entry
  }

  pub fn data(&self) -> Option<&T> {
    self.entry.data()
  }

  pub fn error(&self) -> Option<&E> {
    self.entry.error()
  }

  pub fn is_fetching(&self) -> bool {
    self.entry.is_fetching
  }

  /// Read through the cache: serves cached data and fetches in the
  /// background when the slot is missing, failed, or stale.
  pub fn fetch(&mut self) {
    let fetcher = Arc::clone(&self.fetcher);
    self.entry = self
      .client
      .read(self.key.clone(), move || fetcher(), self.options.clone());
  }

  /// Force a refetch, e.g. the retry action after an error.
  pub fn refetch(&mut self) {
    if !self.client.refetch(&self.key) {
      self.fetch();
      return;
    }
    self.entry = self.client.entry(&self.key);
  }

  /// Resolve the query, waiting for the network if needed.
  pub async fn resolve(&self) -> Result<Arc<T>, E> {
    let fetcher = Arc::clone(&self.fetcher);
    self
      .client
      .fetch(self.key.clone(), move || fetcher(), self.options.clone())
      .await
  }

  /// Pick up cache events. Returns `true` if the entry changed.
  /// Call this in the view's tick handler.
  pub fn poll(&mut self) -> bool {
    if !drain(&mut self.events) {
      return false;
    }
    self.entry = self.client.entry(&self.key);
    true
  }
}

impl<K: QueryKey, E: FetchError, T> std::fmt::Debug for Query<K, E, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("state", &self.entry.state)
      .field("is_fetching", &self.entry.is_fetching)
      .finish_non_exhaustive()
  }
}

/// Handle to a paginated query whose pages accumulate in the cache.
pub struct InfiniteQuery<K: QueryKey, E: FetchError, P, C> {
  client: QueryClient<K, E>,
  key: K,
  query: PaginatedQuery<P, C, E>,
  entry: QueryEntry<Pages<P, C>, E>,
  events: mpsc::UnboundedReceiver<QueryEventKind>,
  next_page: Option<mpsc::UnboundedReceiver<Result<(), E>>>,
  next_page_error: Option<E>,
  _subscription: Subscription,
}

impl<K, E, P, C> InfiniteQuery<K, E, P, C>
where
  K: QueryKey,
  E: FetchError,
  P: Clone + Send + Sync + 'static,
  C: Clone + PartialEq + Send + Sync + 'static,
{
  pub fn new(client: QueryClient<K, E>, key: K, query: PaginatedQuery<P, C, E>) -> Self {
    let (subscription, events) = watch(&client, &key);
    let entry = client.pages(&key);
    Self {
      client,
      key,
      query,
      entry,
      events,
      next_page: None,
      next_page_error: None,
      _subscription: subscription,
    }
  }

  pub fn key(&self) -> &K {
    &self.key
  }

  pub fn entry(&self) -> &QueryEntry<Pages<P, C>, E> {
    &self.entry
  }

  pub fn pages(&self) -> Option<&Pages<P, C>> {
    self.entry.data()
  }

  pub fn has_next_page(&self) -> bool {
    self.pages().is_some_and(Pages::has_next_page)
  }

  pub fn is_fetching_next_page(&self) -> bool {
    self.next_page.is_some()
  }

  /// Error from the last failed next-page request; earlier pages stay
  /// visible.
  pub fn next_page_error(&self) -> Option<&E> {
    self.next_page_error.as_ref()
  }

  pub fn fetch(&mut self) {
    self.entry = self.client.read_paginated(self.key.clone(), &self.query);
  }

  pub fn refetch(&mut self) {
    self.next_page_error = None;
    if !self.client.refetch(&self.key) {
      self.fetch();
      return;
    }
    self.entry = self.client.pages(&self.key);
  }

  /// Request the next page in the background. No-op while one is already
  /// loading or once the listing is exhausted.
  pub fn fetch_next_page(&mut self) {
    if self.next_page.is_some() || !self.has_next_page() {
      return;
    }
    let (tx, rx) = mpsc::unbounded_channel();
    self.next_page = Some(rx);
    self.next_page_error = None;

    let client = self.client.clone();
    let key = self.key.clone();
    let query = self.query.clone();
    tokio::spawn(async move {
      let result = client.fetch_next_page(key, &query).await.map(|_| ());
      // Ignore send errors - the view may have been closed
      let _ = tx.send(result);
    });
  }

  /// Pick up cache events and next-page results. Returns `true` if
  /// anything changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = drain(&mut self.events);

    if let Some(rx) = &mut self.next_page {
      match rx.try_recv() {
        Ok(result) => {
          self.next_page_error = result.err();
          self.next_page = None;
          changed = true;
        }
        Err(mpsc::error::TryRecvError::Empty) => {}
        Err(mpsc::error::TryRecvError::Disconnected) => {
          self.next_page = None;
          changed = true;
        }
      }
    }

    if changed {
      self.entry = self.client.pages(&self.key);
    }
    changed
  }
}

/// The state of a one-off action such as a borrow or a payment
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<T, E> {
  Idle,
  Pending,
  Success(T),
  Error(E),
}

/// Runs one action at a time in the background and reports its outcome.
/// The cache bookkeeping (invalidation) happens inside the action itself.
pub struct Mutation<T, E> {
  state: MutationState<T, E>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, E>>>,
}

impl<T: Send + 'static, E: Send + 'static> Mutation<T, E> {
  pub fn new() -> Self {
    Self {
      state: MutationState::Idle,
      receiver: None,
    }
  }

  pub fn state(&self) -> &MutationState<T, E> {
    &self.state
  }

  pub fn is_pending(&self) -> bool {
    matches!(self.state, MutationState::Pending)
  }

  /// Start `action` unless one is already pending. Returns whether it
  /// started.
  pub fn start<Fut>(&mut self, action: Fut) -> bool
  where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
  {
    if self.is_pending() {
      return false;
    }
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = MutationState::Pending;
    tokio::spawn(async move {
      let result = action.await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
    true
  }

  /// Returns `true` once the pending action settles.
  pub fn poll(&mut self) -> bool {
    let Some(receiver) = &mut self.receiver else {
      return false;
    };
    match receiver.try_recv() {
      Ok(Ok(value)) => {
        self.state = MutationState::Success(value);
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = MutationState::Error(error);
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state = MutationState::Idle;
        self.receiver = None;
        true
      }
    }
  }

  /// Forget the last outcome, e.g. after its message was shown.
  pub fn reset(&mut self) {
    if !self.is_pending() {
      self.state = MutationState::Idle;
    }
  }
}

impl<T: Send + 'static, E: Send + 'static> Default for Mutation<T, E> {
  fn default() -> Self {
    Self::new()
  }
}
