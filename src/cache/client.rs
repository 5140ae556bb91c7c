//! Query client: the shared, in-memory cache of query results.
//!
//! Every slot is keyed by a [`QueryKey`]. The client guarantees:
//! - at most one fetch in flight per key (concurrent readers share it)
//! - invalidation triggered by a mutation is applied before the mutation
//!   resolves
//! - pages of a paginated key are appended strictly in order
//!
//! Subscribers are plain callbacks; they are always invoked after the
//! internal lock is released.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::entry::{MutationStatus, QueryEntry, QueryState};
use super::pages::{PaginatedQuery, Pages};
use super::traits::{CacheError, FetchError, KeyPattern, QueryEvent, QueryEventKind, QueryKey};

type Fetched = Arc<dyn Any + Send + Sync>;
type ErasedFetcher<E> = Arc<dyn Fn() -> BoxFuture<'static, Result<Fetched, E>> + Send + Sync>;
type SharedFetch<E> = Shared<BoxFuture<'static, Result<Fetched, E>>>;
type Listener<K> = Arc<dyn Fn(&QueryEvent<K>) + Send + Sync>;
type Outbox<K> = Vec<(Listener<K>, QueryEvent<K>)>;

/// Per-read fetch policy.
#[derive(Debug, Clone)]
pub struct QueryOptions {
  /// Age after which cached data is refetched on the next read
  pub stale_time: Duration,
  /// When false, `read` never starts a fetch
  pub enabled: bool,
  /// Extra attempts after a failed fetch
  pub retry: u32,
  /// Base delay between attempts, multiplied by the attempt number
  pub retry_delay: Duration,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(60),
      enabled: true,
      retry: 2,
      retry_delay: Duration::from_millis(500),
    }
  }
}

impl QueryOptions {
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn with_retry(mut self, retry: u32) -> Self {
    self.retry = retry;
    self
  }

  pub fn enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }
}

/// Cache-wide settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
  /// Options used for slots created by `subscribe` or `set_data`
  pub default_options: QueryOptions,
  /// How long an unobserved slot is kept before garbage collection
  pub gc_time: Duration,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_options: QueryOptions::default(),
      gc_time: Duration::from_secs(5 * 60),
    }
  }
}

struct Slot<K, E> {
  state: QueryState,
  data: Option<Fetched>,
  error: Option<E>,
  fetched_at: Option<Instant>,
  failed_at: Option<Instant>,
  invalidated: bool,
  options: QueryOptions,
  fetcher: Option<ErasedFetcher<E>>,
  in_flight: Option<SharedFetch<E>>,
  generation: u64,
  listeners: HashMap<u64, Listener<K>>,
  touched: Instant,
}

impl<K: QueryKey, E: FetchError> Slot<K, E> {
  fn new(options: QueryOptions) -> Self {
    Self {
      state: QueryState::Idle,
      data: None,
      error: None,
      fetched_at: None,
      failed_at: None,
      invalidated: false,
      options,
      fetcher: None,
      in_flight: None,
      generation: 0,
      listeners: HashMap::new(),
      touched: Instant::now(),
    }
  }

  fn is_stale(&self) -> bool {
    if self.invalidated {
      return true;
    }
    match self.fetched_at {
      Some(at) => at.elapsed() >= self.options.stale_time,
      None => true,
    }
  }

  /// Data is missing or stale (a failed slot without data counts as missing)
  fn needs_fetch(&self) -> bool {
    self.data.is_none() || self.is_stale()
  }

  fn notify(&self, key: &K, kind: QueryEventKind, outbox: &mut Outbox<K>) {
    for listener in self.listeners.values() {
      outbox.push((
        Arc::clone(listener),
        QueryEvent {
          key: key.clone(),
          kind,
        },
      ));
    }
  }

  fn snapshot<T: Send + Sync + 'static>(&self, key: &K) -> QueryEntry<T, E> {
    let data = self
      .data
      .clone()
      .and_then(|data| match data.downcast::<T>() {
        Ok(data) => Some(data),
        Err(_) => {
          warn!(key = %key.description(), "cached value has an unexpected type");
          None
        }
      });

    QueryEntry {
      state: self.state,
      data,
      error: self.error.clone(),
      fetched_at: self.fetched_at,
      failed_at: self.failed_at,
      is_fetching: self.in_flight.is_some(),
      is_stale: self.is_stale(),
    }
  }
}

struct MutationRecord<E> {
  status: MutationStatus<E>,
  lock: Arc<tokio::sync::Mutex<()>>,
}

impl<E> Default for MutationRecord<E> {
  fn default() -> Self {
    Self {
      status: MutationStatus::Idle,
      lock: Arc::new(tokio::sync::Mutex::new(())),
    }
  }
}

struct Inner<K, E> {
  slots: HashMap<K, Slot<K, E>>,
  mutations: HashMap<&'static str, MutationRecord<E>>,
  next_listener_id: u64,
}

enum Lookup<E> {
  Ready(Fetched),
  Pending(SharedFetch<E>),
}

enum NextPage<E> {
  Wait(SharedFetch<E>),
  Ready(Fetched),
  Started(SharedFetch<E>),
  NeedFirst,
}

/// Shared cache of query results keyed by `K`, failing with `E`.
///
/// Cloning is cheap; clones share the same cache.
pub struct QueryClient<K, E> {
  inner: Arc<Mutex<Inner<K, E>>>,
  config: Arc<CacheConfig>,
}

impl<K, E> Clone for QueryClient<K, E> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
      config: Arc::clone(&self.config),
    }
  }
}

impl<K: QueryKey, E: FetchError> QueryClient<K, E> {
  pub fn new(config: CacheConfig) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner {
        slots: HashMap::new(),
        mutations: HashMap::new(),
        next_listener_id: 0,
      })),
      config: Arc::new(config),
    }
  }

  pub fn config(&self) -> &CacheConfig {
    &self.config
  }

  fn lock(&self) -> MutexGuard<'_, Inner<K, E>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Run `f` under the lock, then deliver queued notifications unlocked.
  fn with_inner<R>(&self, f: impl FnOnce(&mut Inner<K, E>, &mut Outbox<K>) -> R) -> R {
    let mut outbox = Vec::new();
    let result = {
      let mut inner = self.lock();
      f(&mut inner, &mut outbox)
    };
    for (listener, event) in outbox {
      listener(&event);
    }
    result
  }

  fn slot_entry<'a>(&self, inner: &'a mut Inner<K, E>, key: &K) -> &'a mut Slot<K, E> {
    let slot = inner
      .slots
      .entry(key.clone())
      .or_insert_with(|| Slot::new(self.config.default_options.clone()));
    slot.touched = Instant::now();
    slot
  }

  /// Start a fetch for `slot`, superseding any fetch already recorded.
  fn launch(
    &self,
    key: &K,
    slot: &mut Slot<K, E>,
    fetch: BoxFuture<'static, Result<Fetched, E>>,
    outbox: &mut Outbox<K>,
  ) -> SharedFetch<E> {
    slot.generation += 1;
    let generation = slot.generation;
    if slot.data.is_none() {
      slot.state = QueryState::Loading;
    }

    debug!(key = %key.description(), generation, "fetch started");

    let client = self.clone();
    let owned_key = key.clone();
    let shared = async move {
      let result = fetch.await;
      client.settle(&owned_key, generation, &result);
      result
    }
    .boxed()
    .shared();

    slot.in_flight = Some(shared.clone());
    slot.notify(key, QueryEventKind::Fetching, outbox);

    // Drive the fetch even if every reader stops awaiting it.
    tokio::spawn(shared.clone());

    shared
  }

  fn launch_stored(
    &self,
    key: &K,
    slot: &mut Slot<K, E>,
    outbox: &mut Outbox<K>,
  ) -> Option<SharedFetch<E>> {
    let fetcher = slot.fetcher.clone()?;
    let fetch = retrying(
      fetcher,
      slot.options.retry,
      slot.options.retry_delay,
      key.description(),
    );
    Some(self.launch(key, slot, fetch, outbox))
  }

  fn settle(&self, key: &K, generation: u64, result: &Result<Fetched, E>) {
    self.with_inner(|inner, outbox| {
      let Some(slot) = inner.slots.get_mut(key) else {
        debug!(key = %key.description(), "slot removed before fetch settled");
        return;
      };
      if slot.generation != generation {
        debug!(key = %key.description(), generation, "discarding superseded fetch result");
        return;
      }

      let now = Instant::now();
      slot.in_flight = None;
      slot.touched = now;

      match result {
        Ok(data) => {
          slot.data = Some(Arc::clone(data));
          slot.error = None;
          slot.fetched_at = Some(now);
          slot.invalidated = false;
          slot.state = QueryState::Success;
          debug!(key = %key.description(), "fetch succeeded");
          slot.notify(key, QueryEventKind::Success, outbox);
        }
        Err(error) => {
          slot.error = Some(error.clone());
          slot.failed_at = Some(now);
          slot.state = QueryState::Error;
          warn!(key = %key.description(), %error, "fetch failed");
          slot.notify(key, QueryEventKind::Error, outbox);
        }
      }
    });
  }

  fn downcast<T: Send + Sync + 'static>(key: &K, data: Fetched) -> Result<Arc<T>, E> {
    data.downcast::<T>().map_err(|_| {
      E::from(CacheError::TypeMismatch {
        key: key.description(),
      })
    })
  }

  /// Return the cached snapshot for `key`, starting a background fetch if
  /// the slot is enabled and missing, failed, or stale.
  pub fn read<T, F, Fut>(&self, key: K, fetcher: F, options: QueryOptions) -> QueryEntry<T, E>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
  {
    self.read_erased(&key, erase(fetcher), options);
    self.entry(&key)
  }

  fn read_erased(&self, key: &K, fetcher: ErasedFetcher<E>, options: QueryOptions) {
    self.with_inner(|inner, outbox| {
      let slot = self.slot_entry(inner, key);
      slot.fetcher = Some(fetcher);
      slot.options = options;
      if slot.options.enabled && slot.in_flight.is_none() && slot.needs_fetch() {
        self.launch_stored(key, slot, outbox);
      }
    });
  }

  /// Resolve `key`: fresh cached data is returned as is; otherwise the
  /// caller joins the in-flight fetch or starts one.
  pub async fn fetch<T, F, Fut>(&self, key: K, fetcher: F, options: QueryOptions) -> Result<Arc<T>, E>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
  {
    let data = self.fetch_erased(&key, erase(fetcher), options).await?;
    Self::downcast(&key, data)
  }

  async fn fetch_erased(
    &self,
    key: &K,
    fetcher: ErasedFetcher<E>,
    options: QueryOptions,
  ) -> Result<Fetched, E> {
    let lookup = self.with_inner(|inner, outbox| {
      let slot = self.slot_entry(inner, key);
      slot.fetcher = Some(Arc::clone(&fetcher));
      slot.options = options;

      if let Some(pending) = &slot.in_flight {
        return Lookup::Pending(pending.clone());
      }
      match &slot.data {
        Some(data) if !slot.is_stale() => Lookup::Ready(Arc::clone(data)),
        _ => {
          let fetch = retrying(
            fetcher,
            slot.options.retry,
            slot.options.retry_delay,
            key.description(),
          );
          Lookup::Pending(self.launch(key, slot, fetch, outbox))
        }
      }
    });

    match lookup {
      Lookup::Ready(data) => Ok(data),
      Lookup::Pending(pending) => pending.await,
    }
  }

  /// Fetch the first page of a paginated key (or return cached pages).
  pub async fn fetch_paginated<P, C>(
    &self,
    key: K,
    query: &PaginatedQuery<P, C, E>,
  ) -> Result<Arc<Pages<P, C>>, E>
  where
    P: Clone + Send + Sync + 'static,
    C: Clone + PartialEq + Send + Sync + 'static,
  {
    let data = self
      .fetch_erased(&key, first_page_fetcher(query), query.options.clone())
      .await?;
    Self::downcast(&key, data)
  }

  /// Snapshot of a paginated key, starting the first page if needed.
  pub fn read_paginated<P, C>(
    &self,
    key: K,
    query: &PaginatedQuery<P, C, E>,
  ) -> QueryEntry<Pages<P, C>, E>
  where
    P: Clone + Send + Sync + 'static,
    C: Clone + PartialEq + Send + Sync + 'static,
  {
    self.read_erased(&key, first_page_fetcher(query), query.options.clone());
    self.entry(&key)
  }

  /// Append the next page of a paginated key.
  ///
  /// Waits for any fetch already in flight on the key first, so page N+1
  /// is never requested before page N settled. Returns the current pages
  /// unchanged once the listing is exhausted.
  pub async fn fetch_next_page<P, C>(
    &self,
    key: K,
    query: &PaginatedQuery<P, C, E>,
  ) -> Result<Arc<Pages<P, C>>, E>
  where
    P: Clone + Send + Sync + 'static,
    C: Clone + PartialEq + Send + Sync + 'static,
  {
    let mut waited = false;
    loop {
      let step = self.with_inner(|inner, outbox| -> Result<NextPage<E>, E> {
        let Some(slot) = inner.slots.get_mut(&key) else {
          return Ok(NextPage::NeedFirst);
        };
        if let Some(pending) = &slot.in_flight {
          return Ok(NextPage::Wait(pending.clone()));
        }
        // Pages from before an invalidation are not extended; the listing
        // restarts from its first page.
        if slot.invalidated {
          debug!(key = %key.description(), "listing invalidated, restarting from first page");
          return Ok(NextPage::NeedFirst);
        }
        let Some(data) = slot.data.clone() else {
          return Ok(NextPage::NeedFirst);
        };
        let current = Self::downcast::<Pages<P, C>>(&key, Arc::clone(&data))?;

        let Some(cursor) = current.next_param.clone() else {
          return Ok(NextPage::Ready(data));
        };
        if current.params.contains(&cursor) {
          warn!(key = %key.description(), "next page cursor was already fetched, stopping");
          return Ok(NextPage::Ready(data));
        }

        slot.touched = Instant::now();
        let fetch = retrying(
          append_page_fetcher(query, current, cursor),
          query.options.retry,
          query.options.retry_delay,
          key.description(),
        );
        Ok(NextPage::Started(self.launch(&key, slot, fetch, outbox)))
      })?;

      match step {
        NextPage::NeedFirst => return self.fetch_paginated(key, query).await,
        NextPage::Ready(data) => return Self::downcast(&key, data),
        NextPage::Started(pending) => return Self::downcast(&key, pending.await?),
        NextPage::Wait(pending) => {
          let settled = pending.await;
          if waited {
            // The in-flight fetch kept being replaced; report what it produced.
            return Self::downcast(&key, settled?);
          }
          waited = true;
        }
      }
    }
  }

  /// Re-run the stored fetcher for `key`. Joins the in-flight fetch if there
  /// is one. Returns false when the key was never read.
  pub fn refetch(&self, key: &K) -> bool {
    self.with_inner(|inner, outbox| {
      let Some(slot) = inner.slots.get_mut(key) else {
        return false;
      };
      if slot.in_flight.is_some() {
        return true;
      }
      slot.touched = Instant::now();
      self.launch_stored(key, slot, outbox).is_some()
    })
  }

  /// Mark every slot matching one of `patterns` stale.
  ///
  /// In-flight fetches for those slots are superseded. Slots with
  /// subscribers refetch immediately; the rest refetch on their next read.
  /// Returns the number of slots invalidated.
  pub fn invalidate(&self, patterns: &[KeyPattern<K>]) -> usize {
    if patterns.is_empty() {
      return 0;
    }
    self.with_inner(|inner, outbox| {
      let keys: Vec<K> = inner
        .slots
        .keys()
        .filter(|key| patterns.iter().any(|pattern| pattern.matches(key)))
        .cloned()
        .collect();

      for key in &keys {
        let Some(slot) = inner.slots.get_mut(key) else {
          continue;
        };
        slot.invalidated = true;
        slot.in_flight = None;
        slot.generation += 1;
        debug!(key = %key.description(), "invalidated");
        slot.notify(key, QueryEventKind::Invalidated, outbox);

        if !slot.listeners.is_empty() {
          self.launch_stored(key, slot, outbox);
        }
      }

      keys.len()
    })
  }

  /// Run a mutation of `kind`, then invalidate `invalidates` before
  /// resolving. Mutations of the same kind run one at a time.
  pub async fn mutate<R, Fut>(
    &self,
    kind: &'static str,
    mutation: Fut,
    invalidates: &[KeyPattern<K>],
  ) -> Result<R, E>
  where
    Fut: Future<Output = Result<R, E>>,
  {
    let lock = self.with_inner(|inner, _| Arc::clone(&inner.mutations.entry(kind).or_default().lock));
    let _serialized = lock.lock().await;

    self.set_mutation_status(kind, MutationStatus::Pending);
    info!(kind, "mutation started");

    match mutation.await {
      Ok(value) => {
        let invalidated = self.invalidate(invalidates);
        self.set_mutation_status(kind, MutationStatus::Success);
        info!(kind, invalidated, "mutation succeeded");
        Ok(value)
      }
      Err(error) => {
        warn!(kind, %error, "mutation failed");
        self.set_mutation_status(kind, MutationStatus::Error(error.clone()));
        Err(error)
      }
    }
  }

  fn set_mutation_status(&self, kind: &'static str, status: MutationStatus<E>) {
    self.with_inner(|inner, _| {
      inner.mutations.entry(kind).or_default().status = status;
    });
  }

  pub fn mutation_status(&self, kind: &'static str) -> MutationStatus<E> {
    self.with_inner(|inner, _| {
      inner
        .mutations
        .get(kind)
        .map(|record| record.status.clone())
        .unwrap_or_default()
    })
  }

  /// Register `listener` for events on `key`. Dropping the returned
  /// subscription unregisters it; results arriving afterwards are still
  /// cached but no longer delivered.
  pub fn subscribe<L>(&self, key: K, listener: L) -> Subscription
  where
    L: Fn(&QueryEvent<K>) + Send + Sync + 'static,
  {
    let id = self.with_inner(|inner, _| {
      inner.next_listener_id += 1;
      let id = inner.next_listener_id;
      self
        .slot_entry(inner, &key)
        .listeners
        .insert(id, Arc::new(listener));
      id
    });

    let weak = Arc::downgrade(&self.inner);
    Subscription {
      unsubscribe: Some(Box::new(move || {
        if let Some(inner) = weak.upgrade() {
          let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
          if let Some(slot) = inner.slots.get_mut(&key) {
            slot.listeners.remove(&id);
            slot.touched = Instant::now();
          }
        }
      })),
    }
  }

  pub fn subscriber_count(&self, key: &K) -> usize {
    self.with_inner(|inner, _| {
      inner
        .slots
        .get(key)
        .map(|slot| slot.listeners.len())
        .unwrap_or(0)
    })
  }

  /// Write data for `key` directly, e.g. to seed a screen with initial data.
  pub fn set_data<T: Send + Sync + 'static>(&self, key: K, value: T) {
    self.with_inner(|inner, outbox| {
      let slot = self.slot_entry(inner, &key);
      slot.data = Some(Arc::new(value));
      slot.error = None;
      slot.fetched_at = Some(Instant::now());
      slot.invalidated = false;
      slot.state = QueryState::Success;
      slot.notify(&key, QueryEventKind::Updated, outbox);
    });
  }

  pub fn entry<T: Send + Sync + 'static>(&self, key: &K) -> QueryEntry<T, E> {
    self.with_inner(|inner, _| {
      inner
        .slots
        .get(key)
        .map(|slot| slot.snapshot(key))
        .unwrap_or_default()
    })
  }

  pub fn pages<P, C>(&self, key: &K) -> QueryEntry<Pages<P, C>, E>
  where
    P: Send + Sync + 'static,
    C: Send + Sync + 'static,
  {
    self.entry(key)
  }

  pub fn contains(&self, key: &K) -> bool {
    self.with_inner(|inner, _| inner.slots.contains_key(key))
  }

  pub fn len(&self) -> usize {
    self.with_inner(|inner, _| inner.slots.len())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drop unobserved, idle slots older than `gc_time`.
  pub fn collect_garbage(&self) -> usize {
    self.collect_garbage_at(Instant::now())
  }

  pub fn collect_garbage_at(&self, now: Instant) -> usize {
    let gc_time = self.config.gc_time;
    self.with_inner(|inner, _| {
      let before = inner.slots.len();
      inner.slots.retain(|key, slot| {
        let keep = !slot.listeners.is_empty()
          || slot.in_flight.is_some()
          || now.saturating_duration_since(slot.touched) < gc_time;
        if !keep {
          debug!(key = %key.description(), "collected");
        }
        keep
      });
      before - inner.slots.len()
    })
  }

  /// Drop every slot, notifying subscribers.
  pub fn clear(&self) {
    self.with_inner(|inner, outbox| {
      for (key, slot) in inner.slots.iter() {
        slot.notify(key, QueryEventKind::Removed, outbox);
      }
      inner.slots.clear();
    });
  }
}

/// Handle returned by [`QueryClient::subscribe`]; unsubscribes on drop.
pub struct Subscription {
  unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(unsubscribe) = self.unsubscribe.take() {
      unsubscribe();
    }
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription").finish_non_exhaustive()
  }
}

fn erase<T, E, F, Fut>(fetcher: F) -> ErasedFetcher<E>
where
  T: Send + Sync + 'static,
  E: Send + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, E>> + Send + 'static,
{
  Arc::new(move || {
    let fut = fetcher();
    async move { fut.await.map(|value| Arc::new(value) as Fetched) }.boxed()
  })
}

fn first_page_fetcher<P, C, E>(query: &PaginatedQuery<P, C, E>) -> ErasedFetcher<E>
where
  P: Send + Sync + 'static,
  C: Clone + Send + Sync + 'static,
  E: Send + 'static,
{
  let query = query.clone();
  Arc::new(move || {
    let fetch_page = Arc::clone(&query.fetch_page);
    let next_param = Arc::clone(&query.next_param);
    let param = query.initial_param.clone();
    async move {
      let page = fetch_page(param.clone()).await?;
      let next = next_param(&page);
      Ok(Arc::new(Pages::first(page, param, next)) as Fetched)
    }
    .boxed()
  })
}

fn append_page_fetcher<P, C, E>(
  query: &PaginatedQuery<P, C, E>,
  current: Arc<Pages<P, C>>,
  cursor: C,
) -> ErasedFetcher<E>
where
  P: Clone + Send + Sync + 'static,
  C: Clone + Send + Sync + 'static,
  E: Send + 'static,
{
  let fetch_page = Arc::clone(&query.fetch_page);
  let next_param = Arc::clone(&query.next_param);
  Arc::new(move || {
    let fetch_page = Arc::clone(&fetch_page);
    let next_param = Arc::clone(&next_param);
    let current = Arc::clone(&current);
    let cursor = cursor.clone();
    async move {
      let page = fetch_page(cursor.clone()).await?;
      let mut pages = (*current).clone();
      pages.next_param = next_param(&page);
      pages.params.push(cursor);
      pages.pages.push(page);
      Ok(Arc::new(pages) as Fetched)
    }
    .boxed()
  })
}

fn retrying<E: FetchError>(
  fetcher: ErasedFetcher<E>,
  retry: u32,
  delay: Duration,
  description: String,
) -> BoxFuture<'static, Result<Fetched, E>> {
  async move {
    let mut attempt = 0;
    loop {
      match fetcher().await {
        Ok(value) => return Ok(value),
        Err(error) if attempt < retry => {
          attempt += 1;
          warn!(key = %description, %error, attempt, "fetch failed, retrying");
          tokio::time::sleep(delay * attempt).await;
        }
        Err(error) => return Err(error),
      }
    }
  }
  .boxed()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[derive(Debug, Clone, PartialEq, Eq, Hash)]
  enum Key {
    Borrows,
    Overdue,
    Book(String),
    Listing,
  }

  impl QueryKey for Key {
    fn kind(&self) -> &'static str {
      match self {
        Self::Borrows => "borrows",
        Self::Overdue => "overdue",
        Self::Book(_) => "book",
        Self::Listing => "listing",
      }
    }

    fn description(&self) -> String {
      format!("{:?}", self)
    }
  }

  #[derive(Debug, Clone, PartialEq, Eq)]
  struct TestError(String);

  impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.write_str(&self.0)
    }
  }

  impl From<CacheError> for TestError {
    fn from(error: CacheError) -> Self {
      Self(error.to_string())
    }
  }

  fn client() -> QueryClient<Key, TestError> {
    QueryClient::new(CacheConfig::default())
  }

  fn no_retry() -> QueryOptions {
    QueryOptions::default().with_retry(0)
  }

  fn counting_fetcher(
    counter: Arc<AtomicU32>,
    delay: Duration,
  ) -> impl Fn() -> BoxFuture<'static, Result<u32, TestError>> + Send + Sync + 'static {
    move || {
      let counter = Arc::clone(&counter);
      async move {
        tokio::time::sleep(delay).await;
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
      }
      .boxed()
    }
  }

  #[tokio::test]
  async fn test_concurrent_reads_are_coalesced() {
    let cache = client();
    let calls = Arc::new(AtomicU32::new(0));

    let first = cache.fetch(
      Key::Borrows,
      counting_fetcher(Arc::clone(&calls), Duration::from_millis(20)),
      no_retry(),
    );
    let second = cache.fetch(
      Key::Borrows,
      counting_fetcher(Arc::clone(&calls), Duration::from_millis(20)),
      no_retry(),
    );
    let (first, second) = tokio::join!(first, second);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*first.unwrap(), 1);
    assert_eq!(*second.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_fresh_data_is_served_from_cache() {
    let cache = client();
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
      let value = cache
        .fetch(
          Key::Borrows,
          counting_fetcher(Arc::clone(&calls), Duration::ZERO),
          no_retry(),
        )
        .await
        .unwrap();
      assert_eq!(*value, 1);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_stale_data_is_refetched() {
    let cache = client();
    let calls = Arc::new(AtomicU32::new(0));
    let options = no_retry().with_stale_time(Duration::ZERO);

    cache
      .fetch(
        Key::Borrows,
        counting_fetcher(Arc::clone(&calls), Duration::ZERO),
        options.clone(),
      )
      .await
      .unwrap();
    let value = cache
      .fetch(
        Key::Borrows,
        counting_fetcher(Arc::clone(&calls), Duration::ZERO),
        options,
      )
      .await
      .unwrap();

    assert_eq!(*value, 2);
  }

  #[tokio::test]
  async fn test_read_returns_snapshot_and_fetches_in_background() {
    let cache = client();
    let calls = Arc::new(AtomicU32::new(0));

    let entry: QueryEntry<u32, TestError> = cache.read(
      Key::Borrows,
      counting_fetcher(Arc::clone(&calls), Duration::from_millis(5)),
      no_retry(),
    );
    assert!(entry.is_loading());
    assert!(entry.is_fetching);
    assert!(entry.data.is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;

    let entry: QueryEntry<u32, TestError> = cache.entry(&Key::Borrows);
    assert!(entry.is_success());
    assert_eq!(entry.data(), Some(&1));
    assert!(!entry.is_fetching);
  }

  #[tokio::test]
  async fn test_disabled_read_does_not_fetch() {
    let cache = client();
    let calls = Arc::new(AtomicU32::new(0));

    let entry: QueryEntry<u32, TestError> = cache.read(
      Key::Borrows,
      counting_fetcher(Arc::clone(&calls), Duration::ZERO),
      no_retry().enabled(false),
    );
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(entry.state, QueryState::Idle);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_error_is_stored_and_refetch_recovers() {
    let cache = client();
    let attempts = Arc::new(AtomicU32::new(0));
    let fetcher = {
      let attempts = Arc::clone(&attempts);
      move || {
        let attempts = Arc::clone(&attempts);
        async move {
          if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(TestError("offline".to_string()))
          } else {
            Ok(7u32)
          }
        }
      }
    };

    let result = cache.fetch(Key::Overdue, fetcher, no_retry()).await;
    assert_eq!(result.unwrap_err(), TestError("offline".to_string()));

    let entry: QueryEntry<u32, TestError> = cache.entry(&Key::Overdue);
    assert!(entry.is_error());
    assert_eq!(entry.error(), Some(&TestError("offline".to_string())));

    assert!(cache.refetch(&Key::Overdue));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let entry: QueryEntry<u32, TestError> = cache.entry(&Key::Overdue);
    assert!(entry.is_success());
    assert_eq!(entry.data(), Some(&7));
    assert!(entry.error().is_none());
  }

  #[tokio::test]
  async fn test_fetch_is_retried_up_to_bound() {
    let cache = client();
    let attempts = Arc::new(AtomicU32::new(0));
    let fetcher = {
      let attempts = Arc::clone(&attempts);
      move || {
        let attempts = Arc::clone(&attempts);
        async move {
          attempts.fetch_add(1, Ordering::SeqCst);
          Err::<u32, _>(TestError("down".to_string()))
        }
      }
    };
    let options = QueryOptions {
      retry: 2,
      retry_delay: Duration::from_millis(1),
      ..QueryOptions::default()
    };

    let result = cache.fetch(Key::Borrows, fetcher, options).await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_mutation_invalidates_before_resolving() {
    let cache = client();
    let server_fine = Arc::new(AtomicU32::new(25));
    let fetcher = {
      let server_fine = Arc::clone(&server_fine);
      move || {
        let server_fine = Arc::clone(&server_fine);
        async move { Ok::<_, TestError>(server_fine.load(Ordering::SeqCst)) }
      }
    };

    let before = cache
      .fetch(Key::Overdue, fetcher.clone(), no_retry())
      .await
      .unwrap();
    assert_eq!(*before, 25);

    let paid = {
      let server_fine = Arc::clone(&server_fine);
      async move {
        server_fine.store(0, Ordering::SeqCst);
        Ok::<_, TestError>(())
      }
    };
    cache
      .mutate("pay-fine", paid, &[KeyPattern::Exact(Key::Overdue)])
      .await
      .unwrap();

    assert!(cache.entry::<u32>(&Key::Overdue).is_stale);
    let after = cache.fetch(Key::Overdue, fetcher, no_retry()).await.unwrap();
    assert_eq!(*after, 0);
    assert_eq!(cache.mutation_status("pay-fine"), MutationStatus::Success);
  }

  #[tokio::test]
  async fn test_failed_mutation_keeps_cached_data() {
    let cache = client();
    cache.set_data(Key::Overdue, 25u32);

    let result = cache
      .mutate(
        "pay-fine",
        async { Err::<(), _>(TestError("declined".to_string())) },
        &[KeyPattern::Exact(Key::Overdue)],
      )
      .await;

    assert!(result.is_err());
    let entry: QueryEntry<u32, TestError> = cache.entry(&Key::Overdue);
    assert_eq!(entry.data(), Some(&25));
    assert!(!entry.is_stale);
    assert_eq!(
      cache.mutation_status("pay-fine"),
      MutationStatus::Error(TestError("declined".to_string()))
    );
  }

  #[tokio::test]
  async fn test_invalidate_refetches_subscribed_slots() {
    let cache = client();
    let calls = Arc::new(AtomicU32::new(0));
    let events = Arc::new(Mutex::new(Vec::new()));

    let _subscription = {
      let events = Arc::clone(&events);
      cache.subscribe(Key::Book("LIB-1".to_string()), move |event| {
        events
          .lock()
          .unwrap_or_else(PoisonError::into_inner)
          .push(event.kind);
      })
    };
    cache
      .fetch(
        Key::Book("LIB-1".to_string()),
        counting_fetcher(Arc::clone(&calls), Duration::ZERO),
        no_retry(),
      )
      .await
      .unwrap();

    let invalidated = cache.invalidate(&[KeyPattern::Kind("book")]);
    assert_eq!(invalidated, 1);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let entry: QueryEntry<u32, TestError> = cache.entry(&Key::Book("LIB-1".to_string()));
    assert_eq!(entry.data(), Some(&2));
    assert!(!entry.is_stale);

    let events = events.lock().unwrap_or_else(PoisonError::into_inner).clone();
    assert_eq!(
      events,
      vec![
        QueryEventKind::Fetching,
        QueryEventKind::Success,
        QueryEventKind::Invalidated,
        QueryEventKind::Fetching,
        QueryEventKind::Success,
      ]
    );
  }

  #[tokio::test]
  async fn test_invalidate_without_subscribers_is_lazy() {
    let cache = client();
    let calls = Arc::new(AtomicU32::new(0));

    cache
      .fetch(
        Key::Borrows,
        counting_fetcher(Arc::clone(&calls), Duration::ZERO),
        no_retry(),
      )
      .await
      .unwrap();
    cache.invalidate(&[KeyPattern::All]);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.entry::<u32>(&Key::Borrows).is_stale);
  }

  #[tokio::test]
  async fn test_invalidation_supersedes_in_flight_fetch() {
    let cache = client();

    let _ = cache.read::<u32, _, _>(
      Key::Borrows,
      || async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(100)
      },
      no_retry(),
    );
    cache.invalidate(&[KeyPattern::Exact(Key::Borrows)]);

    // Nobody is subscribed, so the next read starts the replacement fetch.
    let value = cache
      .fetch(
        Key::Borrows,
        || async {
          tokio::time::sleep(Duration::from_millis(10)).await;
          Ok(200u32)
        },
        no_retry(),
      )
      .await
      .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*value, 200);
    // The superseded result arrived later but was discarded.
    let entry: QueryEntry<u32, TestError> = cache.entry(&Key::Borrows);
    assert_eq!(entry.data(), Some(&200));
  }

  #[tokio::test]
  async fn test_unsubscribed_listener_is_not_notified() {
    let cache = client();
    let notified = Arc::new(AtomicU32::new(0));

    let subscription = {
      let notified = Arc::clone(&notified);
      cache.subscribe(Key::Borrows, move |_| {
        notified.fetch_add(1, Ordering::SeqCst);
      })
    };
    let _ = cache.read::<u32, _, _>(
      Key::Borrows,
      || async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(1)
      },
      no_retry(),
    );
    let after_start = notified.load(Ordering::SeqCst);
    drop(subscription);

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(notified.load(Ordering::SeqCst), after_start);
    assert_eq!(cache.subscriber_count(&Key::Borrows), 0);
    // The result is still cached for future readers.
    assert_eq!(cache.entry::<u32>(&Key::Borrows).data(), Some(&1));
  }

  fn listing_query(
    calls: Arc<Mutex<Vec<u32>>>,
    last_page: u32,
  ) -> PaginatedQuery<Vec<u32>, u32, TestError> {
    PaginatedQuery::new(
      1u32,
      move |page: u32| {
        let calls = Arc::clone(&calls);
        async move {
          calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(page);
          tokio::time::sleep(Duration::from_millis(5)).await;
          Ok(vec![page * 10, page * 10 + 1])
        }
      },
      move |items: &Vec<u32>| {
        let page = items[0] / 10;
        (page < last_page).then_some(page + 1)
      },
    )
    .with_options(no_retry())
  }

  #[tokio::test]
  async fn test_pages_are_appended_in_order() {
    let cache = client();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let query = listing_query(Arc::clone(&calls), 3);

    cache.fetch_paginated(Key::Listing, &query).await.unwrap();
    cache.fetch_next_page(Key::Listing, &query).await.unwrap();
    let pages = cache.fetch_next_page(Key::Listing, &query).await.unwrap();

    let items: Vec<u32> = pages.items::<u32>().copied().collect();
    assert_eq!(items, vec![10, 11, 20, 21, 30, 31]);
    assert_eq!(pages.params(), &[1, 2, 3]);
    assert!(!pages.has_next_page());

    // Exhausted: no further request.
    cache.fetch_next_page(Key::Listing, &query).await.unwrap();
    assert_eq!(
      *calls.lock().unwrap_or_else(PoisonError::into_inner),
      vec![1, 2, 3]
    );
  }

  #[tokio::test]
  async fn test_next_page_waits_for_first_page() {
    let cache = client();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let query = listing_query(Arc::clone(&calls), 5);

    let _ = cache.read_paginated(Key::Listing, &query);
    // Requested while page 1 is still in flight.
    let pages = cache.fetch_next_page(Key::Listing, &query).await.unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(
      *calls.lock().unwrap_or_else(PoisonError::into_inner),
      vec![1, 2]
    );
  }

  #[tokio::test]
  async fn test_invalidated_listing_restarts_from_first_page() {
    let cache = client();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let query = listing_query(Arc::clone(&calls), 5);

    cache.fetch_paginated(Key::Listing, &query).await.unwrap();
    cache.fetch_next_page(Key::Listing, &query).await.unwrap();
    cache.invalidate(&[KeyPattern::Kind("listing")]);

    let pages = cache.fetch_paginated(Key::Listing, &query).await.unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages.params(), &[1]);
  }

  #[tokio::test]
  async fn test_next_page_after_invalidation_starts_over() {
    let cache = client();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let query = listing_query(Arc::clone(&calls), 5);

    cache.fetch_paginated(Key::Listing, &query).await.unwrap();
    cache.fetch_next_page(Key::Listing, &query).await.unwrap();
    cache.invalidate(&[KeyPattern::Kind("listing")]);

    // Nobody subscribed, so the invalidation is lazy; the next-page call
    // must not extend the stale pages.
    let pages = cache.fetch_next_page(Key::Listing, &query).await.unwrap();
    assert_eq!(pages.params(), &[1]);
    assert!(!cache.pages::<Vec<u32>, u32>(&Key::Listing).is_stale);

    let pages = cache.fetch_next_page(Key::Listing, &query).await.unwrap();
    assert_eq!(pages.params(), &[1, 2]);
    assert_eq!(
      *calls.lock().unwrap_or_else(PoisonError::into_inner),
      vec![1, 2, 1, 2]
    );
  }

  #[tokio::test]
  async fn test_garbage_collection_spares_observed_slots() {
    let cache = QueryClient::<Key, TestError>::new(CacheConfig {
      gc_time: Duration::from_secs(60),
      ..CacheConfig::default()
    });
    cache.set_data(Key::Borrows, 1u32);
    cache.set_data(Key::Overdue, 2u32);
    let _subscription = cache.subscribe(Key::Overdue, |_| {});

    assert_eq!(cache.collect_garbage(), 0);

    let later = Instant::now() + Duration::from_secs(120);
    assert_eq!(cache.collect_garbage_at(later), 1);
    assert!(!cache.contains(&Key::Borrows));
    assert!(cache.contains(&Key::Overdue));
  }

  #[tokio::test]
  async fn test_type_mismatch_is_reported() {
    let cache = client();
    cache.set_data(Key::Borrows, 1u32);

    let result = cache
      .fetch(Key::Borrows, || async { Ok("text".to_string()) }, no_retry())
      .await;

    assert!(result.is_err());
  }
}
