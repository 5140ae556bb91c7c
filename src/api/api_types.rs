//! Serde-deserializable types matching library API responses.
//!
//! The server is inconsistent about field naming (`full_name` vs `fullName`,
//! `_id` vs `id`) and sometimes wraps payloads in `{"data": ...}`. All of
//! that is absorbed here so the domain types in `types.rs` have a single
//! canonical shape.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::types::{
  ActionResponse, Book, BookPage, Borrow, BorrowReceipt, BorrowRecord, OverdueItem, OverdueStatus,
  Profile,
};

/// Payload either bare or wrapped in a `data` member.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
  Wrapped { data: T },
  Bare(T),
}

impl<T> Envelope<T> {
  pub fn into_inner(self) -> T {
    match self {
      Self::Wrapped { data } => data,
      Self::Bare(value) => value,
    }
  }
}

// ============================================================================
// Books
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBook {
  #[serde(default, alias = "_id", alias = "bookId", alias = "book_id", deserialize_with = "de_id")]
  pub id: String,
  #[serde(default)]
  pub barcode: String,
  #[serde(default)]
  pub title: String,
  #[serde(default, deserialize_with = "de_name")]
  pub author: String,
  pub category: Option<String>,
  pub isbn: Option<String>,
  pub publisher: Option<String>,
  #[serde(
    default,
    alias = "publishedYear",
    alias = "published_year",
    alias = "publicationYear",
    alias = "publication_year",
    deserialize_with = "de_year"
  )]
  pub year: Option<i32>,
  #[serde(alias = "shelfLocation", alias = "shelf_location")]
  pub location: Option<String>,
  pub description: Option<String>,
  #[serde(alias = "status", alias = "availabilityStatus", alias = "availability_status")]
  pub availability: Option<String>,
  pub available: Option<bool>,
}

impl From<ApiBook> for Book {
  fn from(b: ApiBook) -> Self {
    let availability = match (b.availability, b.available) {
      (Some(label), _) if !label.trim().is_empty() => label,
      (_, Some(true)) => "Available".to_string(),
      (_, Some(false)) => "Checked Out".to_string(),
      _ => "Unknown".to_string(),
    };
    Book {
      id: b.id,
      barcode: b.barcode,
      title: b.title,
      author: b.author,
      category: b.category.filter(|c| !c.is_empty()),
      isbn: b.isbn,
      publisher: b.publisher,
      year: b.year,
      location: b.location,
      description: b.description,
      availability,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBookPage {
  #[serde(alias = "items", alias = "results", alias = "data")]
  pub books: Vec<ApiBook>,
  #[serde(default, alias = "currentPage", alias = "current_page")]
  pub page: Option<u32>,
  #[serde(alias = "total_pages")]
  pub total_pages: Option<u32>,
  #[serde(alias = "has_more", alias = "hasNextPage", alias = "has_next_page")]
  pub has_more: Option<bool>,
  pub total: Option<u64>,
  pub limit: Option<u32>,
}

/// Book listing: a page object, a bare array, or either of those under
/// `data`. Pagination metadata may sit next to a `data` array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiBookList {
  Page(ApiBookPage),
  List(Vec<ApiBook>),
  Wrapped { data: Box<ApiBookList> },
}

impl ApiBookList {
  /// Normalize into a page. `requested` is the page asked for and `limit`
  /// the page size, used when the server omits pagination metadata.
  pub fn into_page(self, requested: u32, limit: u32) -> BookPage {
    match self {
      Self::Page(p) => {
        let count = p.books.len();
        let page = p.page.unwrap_or(requested);
        let limit = p.limit.unwrap_or(limit);
        let total_pages = p.total_pages.or_else(|| {
          p.total
            .filter(|_| limit > 0)
            .map(|total| total.div_ceil(limit as u64) as u32)
        });
        BookPage {
          books: p.books.into_iter().map(Book::from).collect(),
          page,
          total_pages,
          has_more: p.has_more.unwrap_or(count as u32 >= limit && limit > 0),
        }
      }
      Self::List(books) => {
        let count = books.len() as u32;
        BookPage {
          books: books.into_iter().map(Book::from).collect(),
          page: requested,
          total_pages: None,
          has_more: limit > 0 && count >= limit,
        }
      }
      Self::Wrapped { data } => data.into_page(requested, limit),
    }
  }

  pub fn into_books(self) -> Vec<Book> {
    match self {
      Self::Page(p) => p.books.into_iter().map(Book::from).collect(),
      Self::List(books) => books.into_iter().map(Book::from).collect(),
      Self::Wrapped { data } => data.into_books(),
    }
  }
}

// ============================================================================
// Borrows
// ============================================================================

/// Book reference embedded in borrow records
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApiBookRef {
  #[serde(default, alias = "_id", deserialize_with = "de_id")]
  pub id: String,
  pub barcode: Option<String>,
  pub title: Option<String>,
  #[serde(default, deserialize_with = "de_opt_name")]
  pub author: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBorrow {
  #[serde(default, alias = "_id", alias = "borrowId", alias = "borrow_id", deserialize_with = "de_id")]
  pub id: String,
  #[serde(default, alias = "book_id", deserialize_with = "de_id")]
  pub book_id: String,
  pub book: Option<ApiBookRef>,
  pub barcode: Option<String>,
  pub title: Option<String>,
  #[serde(alias = "book_title")]
  pub book_title: Option<String>,
  #[serde(default, deserialize_with = "de_opt_name")]
  pub author: Option<String>,
  #[serde(alias = "borrow_date", alias = "borrowDate", alias = "borrowed_at")]
  pub borrowed_at: Option<String>,
  #[serde(default, alias = "due_date", alias = "dueAt", alias = "due_at")]
  pub due_date: String,
  #[serde(default, alias = "return_requested")]
  pub return_requested: bool,
}

impl From<ApiBorrow> for Borrow {
  fn from(b: ApiBorrow) -> Self {
    let book = b.book.unwrap_or_default();
    Borrow {
      id: b.id,
      book_id: if b.book_id.is_empty() {
        book.id
      } else {
        b.book_id
      },
      barcode: b.barcode.or(book.barcode),
      title: b
        .title
        .or(b.book_title)
        .or(book.title)
        .unwrap_or_else(|| "Untitled".to_string()),
      author: b.author.or(book.author),
      borrowed_at: b.borrowed_at,
      due_date: b.due_date,
      return_requested: b.return_requested,
    }
  }
}

/// Current borrows: bare array or `{borrows: [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiBorrowList {
  Keyed {
    #[serde(alias = "items", alias = "current")]
    borrows: Vec<ApiBorrow>,
  },
  List(Vec<ApiBorrow>),
}

impl ApiBorrowList {
  pub fn into_borrows(self) -> Vec<Borrow> {
    let list = match self {
      Self::Keyed { borrows } => borrows,
      Self::List(borrows) => borrows,
    };
    list.into_iter().map(Borrow::from).collect()
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiOverdueItem {
  #[serde(default, alias = "_id", alias = "id", alias = "borrow_id", deserialize_with = "de_id")]
  pub borrow_id: String,
  #[serde(default, alias = "fine_id", deserialize_with = "de_opt_id")]
  pub fine_id: Option<String>,
  pub book: Option<ApiBookRef>,
  pub title: Option<String>,
  #[serde(alias = "book_title")]
  pub book_title: Option<String>,
  #[serde(default, alias = "due_date")]
  pub due_date: String,
  #[serde(
    default,
    alias = "fine",
    alias = "fine_amount",
    alias = "amount",
    deserialize_with = "de_amount"
  )]
  pub fine_amount: Option<f64>,
}

impl From<ApiOverdueItem> for OverdueItem {
  fn from(o: ApiOverdueItem) -> Self {
    let book = o.book.unwrap_or_default();
    OverdueItem {
      borrow_id: o.borrow_id,
      fine_id: o.fine_id,
      title: o
        .title
        .or(o.book_title)
        .or(book.title)
        .unwrap_or_else(|| "Untitled".to_string()),
      due_date: o.due_date,
      fine_amount: o.fine_amount,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiOverdue {
  Keyed {
    #[serde(alias = "overdue", alias = "borrows", alias = "overdueBooks")]
    items: Vec<ApiOverdueItem>,
    #[serde(
      default,
      alias = "total_fine",
      alias = "totalFines",
      alias = "total_fines",
      deserialize_with = "de_amount"
    )]
    #[serde(rename = "totalFine")]
    total_fine: Option<f64>,
  },
  List(Vec<ApiOverdueItem>),
}

impl From<ApiOverdue> for OverdueStatus {
  fn from(o: ApiOverdue) -> Self {
    match o {
      ApiOverdue::Keyed { items, total_fine } => OverdueStatus {
        items: items.into_iter().map(OverdueItem::from).collect(),
        total_fine,
      },
      ApiOverdue::List(items) => OverdueStatus {
        items: items.into_iter().map(OverdueItem::from).collect(),
        total_fine: None,
      },
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBorrowRecord {
  #[serde(default, alias = "_id", deserialize_with = "de_id")]
  pub id: String,
  #[serde(default, alias = "user", alias = "userName", alias = "user_name", deserialize_with = "de_opt_name")]
  pub borrower: Option<String>,
  #[serde(alias = "borrow_date", alias = "borrowDate", alias = "borrowed_at")]
  pub borrowed_at: Option<String>,
  #[serde(alias = "due_date")]
  pub due_date: Option<String>,
  #[serde(alias = "returned_at", alias = "returnDate", alias = "return_date")]
  pub returned_at: Option<String>,
  pub status: Option<String>,
}

impl From<ApiBorrowRecord> for BorrowRecord {
  fn from(r: ApiBorrowRecord) -> Self {
    BorrowRecord {
      id: r.id,
      borrower: r.borrower,
      borrowed_at: r.borrowed_at,
      due_date: r.due_date,
      returned_at: r.returned_at,
      status: r.status,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiHistory {
  Keyed {
    #[serde(alias = "items", alias = "records", alias = "borrows")]
    history: Vec<ApiBorrowRecord>,
  },
  List(Vec<ApiBorrowRecord>),
}

impl ApiHistory {
  pub fn into_records(self) -> Vec<BorrowRecord> {
    let list = match self {
      Self::Keyed { history } => history,
      Self::List(history) => history,
    };
    list.into_iter().map(BorrowRecord::from).collect()
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBorrowReceipt {
  #[serde(default, alias = "borrow_id", alias = "id", alias = "_id", deserialize_with = "de_opt_id")]
  pub borrow_id: Option<String>,
  #[serde(alias = "due_date")]
  pub due_date: Option<String>,
  pub message: Option<String>,
}

impl From<ApiBorrowReceipt> for BorrowReceipt {
  fn from(r: ApiBorrowReceipt) -> Self {
    BorrowReceipt {
      borrow_id: r.borrow_id,
      due_date: r.due_date,
      message: r.message,
    }
  }
}

// ============================================================================
// Profile and acknowledgements
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProfile {
  #[serde(default, alias = "_id", alias = "userId", alias = "user_id", deserialize_with = "de_id")]
  pub id: String,
  #[serde(alias = "full_name", alias = "name", alias = "displayName", alias = "display_name")]
  pub full_name: Option<String>,
  #[serde(alias = "first_name")]
  pub first_name: Option<String>,
  #[serde(alias = "last_name")]
  pub last_name: Option<String>,
  #[serde(default)]
  pub email: String,
  #[serde(alias = "phoneNumber", alias = "phone_number")]
  pub phone: Option<String>,
  #[serde(default, alias = "student_id", alias = "studentNumber", deserialize_with = "de_opt_id")]
  pub student_id: Option<String>,
  pub department: Option<String>,
  #[serde(alias = "member_since", alias = "createdAt", alias = "created_at")]
  pub member_since: Option<String>,
}

impl From<ApiProfile> for Profile {
  fn from(p: ApiProfile) -> Self {
    let full_name = p
      .full_name
      .filter(|n| !n.trim().is_empty())
      .or_else(|| {
        let joined = [p.first_name, p.last_name]
          .into_iter()
          .flatten()
          .collect::<Vec<_>>()
          .join(" ");
        (!joined.trim().is_empty()).then_some(joined)
      })
      .unwrap_or_default();
    Profile {
      id: p.id,
      full_name,
      email: p.email,
      phone: p.phone.filter(|s| !s.is_empty()),
      student_id: p.student_id,
      department: p.department,
      member_since: p.member_since,
    }
  }
}

/// `{success, message}`, or anything else (including `null`) as success.
#[derive(Debug, Deserialize, Default)]
pub struct ApiAction {
  pub success: Option<bool>,
  pub message: Option<String>,
}

impl ApiAction {
  pub fn from_value(value: Value) -> Self {
    serde_json::from_value(value).unwrap_or_default()
  }
}

impl From<ApiAction> for ActionResponse {
  fn from(a: ApiAction) -> Self {
    ActionResponse {
      success: a.success.unwrap_or(true),
      message: a.message,
    }
  }
}

// ============================================================================
// Lenient field deserializers
// ============================================================================

fn value_to_id(value: Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// Identifier given as a string or number.
fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  Ok(value_to_id(Value::deserialize(d)?).unwrap_or_default())
}

fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
  Ok(value_to_id(Value::deserialize(d)?))
}

/// Person given as a name string or an object with a name member.
fn de_opt_name<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
  let value = Value::deserialize(d)?;
  Ok(match value {
    Value::String(s) => Some(s),
    Value::Object(obj) => ["fullName", "full_name", "name", "displayName"]
      .iter()
      .find_map(|k| obj.get(*k).and_then(Value::as_str))
      .map(str::to_string),
    _ => None,
  })
}

fn de_name<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  Ok(de_opt_name(d)?.unwrap_or_default())
}

fn de_year<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
  Ok(match Value::deserialize(d)? {
    Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
    Value::String(s) => s.trim().get(..4).and_then(|y| y.parse().ok()),
    _ => None,
  })
}

/// Money amount given as a number or numeric string. Anything that is not
/// a finite number becomes `None`.
pub fn de_amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
  Ok(parse_amount(&Value::deserialize(d)?))
}

pub fn parse_amount(value: &Value) -> Option<f64> {
  let amount = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().trim_start_matches('$').parse::<f64>().ok(),
    _ => None,
  }?;
  amount.is_finite().then_some(amount)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_envelope_unwraps_data() {
    let wrapped: Envelope<ApiProfile> =
      serde_json::from_value(json!({"data": {"id": 7, "fullName": "Ada", "email": "a@x"}}))
        .unwrap();
    let bare: Envelope<ApiProfile> =
      serde_json::from_value(json!({"id": "7", "full_name": "Ada", "email": "a@x"})).unwrap();

    let a = Profile::from(wrapped.into_inner());
    let b = Profile::from(bare.into_inner());
    assert_eq!(a, b);
    assert_eq!(a.id, "7");
    assert_eq!(a.full_name, "Ada");
  }

  #[test]
  fn test_profile_name_from_parts() {
    let p: ApiProfile = serde_json::from_value(json!({
      "_id": "u1",
      "first_name": "Grace",
      "last_name": "Hopper",
      "email": "g@x",
      "phone_number": ""
    }))
    .unwrap();
    let profile = Profile::from(p);
    assert_eq!(profile.full_name, "Grace Hopper");
    assert_eq!(profile.phone, None);
  }

  #[test]
  fn test_book_availability_fallbacks() {
    let labelled: ApiBook =
      serde_json::from_value(json!({"id": 1, "barcode": "LIB-1", "title": "T", "status": "On Hold"}))
        .unwrap();
    assert_eq!(Book::from(labelled).availability, "On Hold");

    let flagged: ApiBook =
      serde_json::from_value(json!({"barcode": "LIB-2", "available": false})).unwrap();
    assert_eq!(Book::from(flagged).availability, "Checked Out");

    let author_obj: ApiBook =
      serde_json::from_value(json!({"barcode": "LIB-3", "author": {"name": "Knuth"}})).unwrap();
    assert_eq!(Book::from(author_obj).author, "Knuth");
  }

  #[test]
  fn test_book_list_shapes() {
    let paged: ApiBookList = serde_json::from_value(json!({
      "books": [{"barcode": "A"}, {"barcode": "B"}],
      "page": 1,
      "total": 5,
      "limit": 2
    }))
    .unwrap();
    let page = paged.into_page(1, 2);
    assert_eq!(page.books.len(), 2);
    assert_eq!(page.total_pages, Some(3));
    assert_eq!(page.next_page(), Some(2));

    let nested: ApiBookList =
      serde_json::from_value(json!({"data": {"items": [{"barcode": "A"}], "hasMore": true}}))
        .unwrap();
    assert_eq!(nested.into_page(2, 10).next_page(), Some(3));

    let bare: ApiBookList = serde_json::from_value(json!([{"barcode": "A"}])).unwrap();
    let page = bare.into_page(4, 2);
    assert_eq!(page.page, 4);
    assert_eq!(page.next_page(), None);
  }

  #[test]
  fn test_borrow_nested_book() {
    let b: ApiBorrow = serde_json::from_value(json!({
      "_id": 12,
      "book": {"id": 3, "title": "Dune", "barcode": "LIB-3"},
      "due_date": "2024-01-10"
    }))
    .unwrap();
    let borrow = Borrow::from(b);
    assert_eq!(borrow.id, "12");
    assert_eq!(borrow.book_id, "3");
    assert_eq!(borrow.title, "Dune");
    assert_eq!(borrow.barcode.as_deref(), Some("LIB-3"));
    assert_eq!(borrow.due_date, "2024-01-10");
  }

  #[test]
  fn test_overdue_amounts_are_lenient() {
    let o: ApiOverdue = serde_json::from_value(json!({
      "items": [
        {"borrowId": "b1", "fineId": 9, "title": "A", "dueDate": "2024-01-01", "fineAmount": 12.5},
        {"borrowId": "b2", "title": "B", "dueDate": "2024-01-02"},
        {"borrowId": "b3", "title": "C", "dueDate": "2024-01-03", "fine": "bad"},
        {"borrowId": "b4", "title": "D", "dueDate": "2024-01-04", "amount": "3.25"}
      ],
      "total_fine": "15.75"
    }))
    .unwrap();
    let status = OverdueStatus::from(o);
    let amounts: Vec<Option<f64>> = status.items.iter().map(|i| i.fine_amount).collect();
    assert_eq!(amounts, vec![Some(12.5), None, None, Some(3.25)]);
    assert_eq!(status.items[0].fine_id.as_deref(), Some("9"));
    assert_eq!(status.total_fine, Some(15.75));
  }

  #[test]
  fn test_action_from_null() {
    let action = ActionResponse::from(ApiAction::from_value(Value::Null));
    assert!(action.success);
    assert_eq!(action.message, None);
  }
}
