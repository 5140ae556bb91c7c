//! Accumulated pages for paginated listings.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;

use super::client::QueryOptions;

/// Pages of one paginated identity, in fetch order.
#[derive(Debug, Clone)]
pub struct Pages<P, C> {
  pub(crate) pages: Vec<P>,
  pub(crate) params: Vec<C>,
  pub(crate) next_param: Option<C>,
}

impl<P, C> Pages<P, C> {
  pub(crate) fn first(page: P, param: C, next_param: Option<C>) -> Self {
    Self {
      pages: vec![page],
      params: vec![param],
      next_param,
    }
  }

  pub fn pages(&self) -> &[P] {
    &self.pages
  }

  /// Cursors used for each page, parallel to `pages()`.
  pub fn params(&self) -> &[C] {
    &self.params
  }

  pub fn len(&self) -> usize {
    self.pages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pages.is_empty()
  }

  pub fn next_param(&self) -> Option<&C> {
    self.next_param.as_ref()
  }

  pub fn has_next_page(&self) -> bool {
    self.next_param.is_some()
  }

  pub fn last_page(&self) -> Option<&P> {
    self.pages.last()
  }

  /// All items of all pages, concatenated in fetch order.
  pub fn items<'a, T: 'a>(&'a self) -> impl Iterator<Item = &'a T> + 'a
  where
    P: AsRef<[T]>,
  {
    self.pages.iter().flat_map(|page| page.as_ref().iter())
  }

  pub fn item_count<T>(&self) -> usize
  where
    P: AsRef<[T]>,
  {
    self.pages.iter().map(|page| page.as_ref().len()).sum()
  }
}

type PageFetcher<P, C, E> = Arc<dyn Fn(C) -> BoxFuture<'static, Result<P, E>> + Send + Sync>;
type NextParam<P, C> = Arc<dyn Fn(&P) -> Option<C> + Send + Sync>;

/// Definition of a paginated query: how to fetch one page and how to find
/// the cursor of the page after it.
pub struct PaginatedQuery<P, C, E> {
  pub(crate) fetch_page: PageFetcher<P, C, E>,
  pub(crate) next_param: NextParam<P, C>,
  pub(crate) initial_param: C,
  pub(crate) options: QueryOptions,
}

impl<P, C, E> PaginatedQuery<P, C, E>
where
  P: Send + Sync + 'static,
  C: Clone + Send + Sync + 'static,
  E: Send + 'static,
{
  /// `next_param` returns `None` once the last page has been reached.
  pub fn new<F, Fut, N>(initial_param: C, fetch_page: F, next_param: N) -> Self
  where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P, E>> + Send + 'static,
    N: Fn(&P) -> Option<C> + Send + Sync + 'static,
  {
    Self {
      fetch_page: Arc::new(move |param| fetch_page(param).boxed()),
      next_param: Arc::new(next_param),
      initial_param,
      options: QueryOptions::default(),
    }
  }

  pub fn with_options(mut self, options: QueryOptions) -> Self {
    self.options = options;
    self
  }

  pub fn options(&self) -> &QueryOptions {
    &self.options
  }
}

impl<P, C: Clone, E> Clone for PaginatedQuery<P, C, E> {
  fn clone(&self) -> Self {
    Self {
      fetch_page: Arc::clone(&self.fetch_page),
      next_param: Arc::clone(&self.next_param),
      initial_param: self.initial_param.clone(),
      options: self.options.clone(),
    }
  }
}
