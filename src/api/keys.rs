//! Cache identities for library resources.

use crate::cache::{KeyPattern, QueryKey};

/// One cacheable query. Paginated listings leave the page number out; the
/// pages accumulate inside the cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
  Profile,
  CurrentBorrows,
  OverdueStatus,
  BookDetail { barcode: String },
  BorrowHistory { book_id: String },
  RelatedBooks { category: String, limit: u32 },
  AvailableBooks { category: Option<String>, limit: u32 },
  BookSearch { query: String, limit: u32 },
}

impl ResourceKey {
  pub const PROFILE: &'static str = "profile";
  pub const CURRENT_BORROWS: &'static str = "current-borrows";
  pub const OVERDUE_STATUS: &'static str = "overdue-status";
  pub const BOOK_DETAIL: &'static str = "book-detail";
  pub const BORROW_HISTORY: &'static str = "borrow-history";
  pub const RELATED_BOOKS: &'static str = "related-books";
  pub const AVAILABLE_BOOKS: &'static str = "available-books";
  pub const BOOK_SEARCH: &'static str = "book-search";

  pub fn book_detail(barcode: &str) -> Self {
    Self::BookDetail {
      barcode: barcode.trim().to_string(),
    }
  }

  pub fn book_search(query: &str, limit: u32) -> Self {
    Self::BookSearch {
      query: normalize_search(query),
      limit,
    }
  }

  pub fn available_books(category: Option<&str>, limit: u32) -> Self {
    Self::AvailableBooks {
      category: category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string),
      limit,
    }
  }

  pub fn exact(self) -> KeyPattern<Self> {
    KeyPattern::Exact(self)
  }

  pub fn kind_pattern(kind: &'static str) -> KeyPattern<Self> {
    KeyPattern::Kind(kind)
  }
}

impl QueryKey for ResourceKey {
  fn kind(&self) -> &'static str {
    match self {
      Self::Profile => Self::PROFILE,
      Self::CurrentBorrows => Self::CURRENT_BORROWS,
      Self::OverdueStatus => Self::OVERDUE_STATUS,
      Self::BookDetail { .. } => Self::BOOK_DETAIL,
      Self::BorrowHistory { .. } => Self::BORROW_HISTORY,
      Self::RelatedBooks { .. } => Self::RELATED_BOOKS,
      Self::AvailableBooks { .. } => Self::AVAILABLE_BOOKS,
      Self::BookSearch { .. } => Self::BOOK_SEARCH,
    }
  }

  fn description(&self) -> String {
    match self {
      Self::BookDetail { barcode } => format!("{}:{}", self.kind(), barcode),
      Self::BorrowHistory { book_id } => format!("{}:{}", self.kind(), book_id),
      Self::RelatedBooks { category, limit } => {
        format!("{}:{}:{}", self.kind(), category, limit)
      }
      Self::AvailableBooks { category, limit } => format!(
        "{}:{}:{}",
        self.kind(),
        category.as_deref().unwrap_or("*"),
        limit
      ),
      Self::BookSearch { query, limit } => format!("{}:{}:{}", self.kind(), query, limit),
      _ => self.kind().to_string(),
    }
  }
}

/// Trim and collapse whitespace so equivalent searches share a slot.
pub fn normalize_search(query: &str) -> String {
  query.split_whitespace().collect::<Vec<_>>().join(" ")
}
