//! Library resources wired to the shared query cache.
//!
//! `Library` is what views hold. Reads come back as query handles bound to
//! a `ResourceKey`; writes go through `QueryClient::mutate` so the cache
//! slots they affect are invalidated before the write resolves.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::types::{
  ActionResponse, Book, BookPage, Borrow, BorrowReceipt, BorrowRecord, OverdueStatus,
  PasswordChange, Profile, ProfileUpdate,
};
use crate::api::{ApiError, FormError, HttpClient, LibraryApi, ResourceKey};
use crate::cache::{KeyPattern, PaginatedQuery, QueryClient};
use crate::config::Config;
use crate::query::{InfiniteQuery, Query};
use crate::session::Session;

pub type LibraryCache = QueryClient<ResourceKey, ApiError>;
pub type LibraryQuery<T> = Query<ResourceKey, ApiError, T>;
pub type BookListQuery = InfiniteQuery<ResourceKey, ApiError, BookPage, u32>;

/// Books shown under "related" on the detail screen
pub const RELATED_LIMIT: u32 = 4;

/// Mutation kinds, tracked separately by the cache
pub const BORROW_BOOK: &str = "borrow-book";
pub const REQUEST_RETURN: &str = "request-return";
pub const PAY_FINE: &str = "pay-fine";
pub const UPDATE_PROFILE: &str = "update-profile";
pub const CHANGE_PASSWORD: &str = "change-password";

#[derive(Clone)]
pub struct Library {
  api: LibraryApi,
  cache: LibraryCache,
  config: Arc<Config>,
}

impl Library {
  pub fn new(config: Config, session: Session) -> Result<Self> {
    let client = HttpClient::new(&config.api_base_url(), session, config.request_timeout())?;
    Ok(Self::with_client(client, config))
  }

  pub fn with_client(client: HttpClient, config: Config) -> Self {
    Self {
      api: LibraryApi::new(client),
      cache: QueryClient::new(config.cache_config()),
      config: Arc::new(config),
    }
  }

  pub fn api(&self) -> &LibraryApi {
    &self.api
  }

  pub fn cache(&self) -> &LibraryCache {
    &self.cache
  }

  pub fn session(&self) -> &Session {
    self.api.client().session()
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  fn query<T, F, Fut>(&self, key: ResourceKey, fetch: F) -> LibraryQuery<T>
  where
    T: Send + Sync + 'static,
    F: Fn(LibraryApi) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let api = self.api.clone();
    Query::new(
      self.cache.clone(),
      key,
      move || fetch(api.clone()),
      self.config.query_options(),
    )
  }

  fn book_list<F, Fut>(&self, key: ResourceKey, fetch_page: F) -> BookListQuery
  where
    F: Fn(LibraryApi, u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<BookPage, ApiError>> + Send + 'static,
  {
    let api = self.api.clone();
    let paginated = PaginatedQuery::new(
      1,
      move |page| fetch_page(api.clone(), page),
      BookPage::next_page,
    )
    .with_options(self.config.query_options());
    InfiniteQuery::new(self.cache.clone(), key, paginated)
  }

  // ==========================================================================
  // Queries
  // ==========================================================================

  pub fn profile(&self) -> LibraryQuery<Profile> {
    self.query(ResourceKey::Profile, |api| async move {
      api.get_profile().await
    })
  }

  pub fn current_borrows(&self) -> LibraryQuery<Vec<Borrow>> {
    self.query(ResourceKey::CurrentBorrows, |api| async move {
      api.get_current_borrows().await
    })
  }

  pub fn overdue(&self) -> LibraryQuery<OverdueStatus> {
    self.query(ResourceKey::OverdueStatus, |api| async move {
      api.get_overdue().await
    })
  }

  pub fn book_detail(&self, barcode: &str) -> LibraryQuery<Book> {
    let key = ResourceKey::book_detail(barcode);
    let barcode = barcode.trim().to_string();
    self.query(key, move |api| {
      let barcode = barcode.clone();
      async move { api.get_book_by_barcode(&barcode).await }
    })
  }

  pub fn borrow_history(&self, book_id: &str) -> LibraryQuery<Vec<BorrowRecord>> {
    let book_id = book_id.to_string();
    let key = ResourceKey::BorrowHistory {
      book_id: book_id.clone(),
    };
    self.query(key, move |api| {
      let book_id = book_id.clone();
      async move { api.get_borrow_history(&book_id).await }
    })
  }

  pub fn related_books(&self, category: &str) -> LibraryQuery<Vec<Book>> {
    let category = category.trim().to_string();
    let key = ResourceKey::RelatedBooks {
      category: category.clone(),
      limit: RELATED_LIMIT,
    };
    self.query(key, move |api| {
      let category = category.clone();
      async move { api.get_related_books(&category, RELATED_LIMIT).await }
    })
  }

  /// Available books, optionally narrowed to one category. A blank
  /// category means all.
  pub fn available_books(&self, category: Option<&str>) -> BookListQuery {
    let limit = self.config.page_size();
    let category = category
      .map(str::trim)
      .filter(|c| !c.is_empty())
      .map(str::to_string);
    let key = ResourceKey::available_books(category.as_deref(), limit);
    self.book_list(key, move |api, page| {
      let category = category.clone();
      async move {
        api
          .get_available_books(page, limit, category.as_deref())
          .await
      }
    })
  }

  pub fn search_books(&self, query: &str) -> BookListQuery {
    let limit = self.config.page_size();
    let key = ResourceKey::book_search(query, limit);
    let query = crate::api::keys::normalize_search(query);
    self.book_list(key, move |api, page| {
      let query = query.clone();
      async move { api.search_books(&query, page, limit).await }
    })
  }

  // ==========================================================================
  // Mutations
  //
  // Each returns an owned future so views can hand it to a `Mutation`.
  // ==========================================================================

  /// Borrow a book. `duration_days` defaults to the configured loan length.
  pub fn borrow_book(
    &self,
    barcode: &str,
    duration_days: Option<u32>,
  ) -> impl Future<Output = Result<BorrowReceipt, ApiError>> + Send + 'static {
    let this = self.clone();
    let barcode = barcode.trim().to_string();
    let days = duration_days.unwrap_or(this.config.borrow.default_duration_days);
    async move {
      let invalidates = [
        ResourceKey::book_detail(&barcode).exact(),
        KeyPattern::Kind(ResourceKey::CURRENT_BORROWS),
        KeyPattern::Kind(ResourceKey::AVAILABLE_BOOKS),
        KeyPattern::Kind(ResourceKey::BOOK_SEARCH),
        KeyPattern::Kind(ResourceKey::RELATED_BOOKS),
        KeyPattern::Kind(ResourceKey::BORROW_HISTORY),
      ];
      this
        .cache
        .mutate(BORROW_BOOK, this.api.borrow_book(&barcode, days), &invalidates)
        .await
    }
  }

  pub fn request_return(
    &self,
    borrow_id: &str,
  ) -> impl Future<Output = Result<ActionResponse, ApiError>> + Send + 'static {
    let this = self.clone();
    let borrow_id = borrow_id.to_string();
    async move {
      let invalidates = [
        ResourceKey::CurrentBorrows.exact(),
        ResourceKey::OverdueStatus.exact(),
      ];
      this
        .cache
        .mutate(REQUEST_RETURN, this.api.request_return(&borrow_id), &invalidates)
        .await
    }
  }

  pub fn pay_fine(
    &self,
    fine_id: &str,
    amount: f64,
  ) -> impl Future<Output = Result<ActionResponse, ApiError>> + Send + 'static {
    let this = self.clone();
    let fine_id = fine_id.to_string();
    async move {
      let invalidates = [
        ResourceKey::OverdueStatus.exact(),
        ResourceKey::CurrentBorrows.exact(),
      ];
      this
        .cache
        .mutate(PAY_FINE, this.api.pay_fine(&fine_id, amount), &invalidates)
        .await
    }
  }

  /// Validated locally first; an invalid form never reaches the network.
  pub fn update_profile(
    &self,
    update: ProfileUpdate,
  ) -> impl Future<Output = Result<Profile, FormError>> + Send + 'static {
    let this = self.clone();
    async move {
      update.validate()?;
      let profile = this
        .cache
        .mutate(
          UPDATE_PROFILE,
          this.api.update_profile(&update),
          &[ResourceKey::Profile.exact()],
        )
        .await?;
      Ok(profile)
    }
  }

  pub fn change_password(
    &self,
    change: PasswordChange,
  ) -> impl Future<Output = Result<ActionResponse, FormError>> + Send + 'static {
    let this = self.clone();
    async move {
      change.validate()?;
      let response = this
        .cache
        .mutate(CHANGE_PASSWORD, this.api.change_password(&change), &[])
        .await?;
      Ok(response)
    }
  }

  /// End the session. The local token and cache are cleared even when the
  /// server call fails.
  pub fn logout(&self) -> impl Future<Output = Result<()>> + Send + 'static {
    let this = self.clone();
    async move {
      if let Err(e) = this.api.logout().await {
        warn!(error = %e, "logout request failed, clearing session anyway");
      }
      this.cache.clear();
      this.session().clear_token()?;
      info!("logged out");
      Ok(())
    }
  }
}

impl std::fmt::Debug for Library {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Library")
      .field("base_url", &self.api.client().base_url().as_str())
      .field("cached", &self.cache.len())
      .finish()
  }
}
