use serde::Serialize;
use serde_json::{json, Value};

use super::api_types::{
  ApiAction, ApiBook, ApiBookList, ApiBorrowList, ApiBorrowReceipt, ApiHistory, ApiOverdue,
  ApiProfile, Envelope,
};
use super::client::{Endpoint, HttpClient};
use super::error::ApiError;
use super::types::{
  ActionResponse, Book, BookPage, Borrow, BorrowReceipt, BorrowRecord, OverdueStatus,
  PasswordChange, Profile, ProfileUpdate,
};

type ApiResult<T> = Result<T, ApiError>;

/// Library API wrapper. One method per endpoint; no business logic beyond
/// building the path and normalizing the response.
#[derive(Clone)]
pub struct LibraryApi {
  client: HttpClient,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BorrowRequest<'a> {
  barcode: &'a str,
  duration_days: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayFineRequest<'a> {
  fine_id: &'a str,
  amount: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReturnRequest<'a> {
  borrow_id: &'a str,
}

impl LibraryApi {
  pub fn new(client: HttpClient) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &HttpClient {
    &self.client
  }

  // ==========================================================================
  // Profile and auth
  // ==========================================================================

  pub async fn get_profile(&self) -> ApiResult<Profile> {
    let profile: Envelope<ApiProfile> = self.client.get(&Endpoint::new("profile")).await?;
    Ok(profile.into_inner().into())
  }

  pub async fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<Profile> {
    let profile: Envelope<ApiProfile> = self.client.put(&Endpoint::new("profile"), update).await?;
    Ok(profile.into_inner().into())
  }

  pub async fn change_password(&self, change: &PasswordChange) -> ApiResult<ActionResponse> {
    self
      .action(&Endpoint::new("auth/password/change"), change)
      .await
  }

  pub async fn logout(&self) -> ApiResult<ActionResponse> {
    self.action(&Endpoint::new("auth/logout"), &json!({})).await
  }

  // ==========================================================================
  // Books
  // ==========================================================================

  pub async fn get_book_by_barcode(&self, barcode: &str) -> ApiResult<Book> {
    let book: Envelope<ApiBook> = self
      .client
      .get(&Endpoint::new("books/barcode").segment(barcode))
      .await?;
    Ok(book.into_inner().into())
  }

  pub async fn get_related_books(&self, category: &str, limit: u32) -> ApiResult<Vec<Book>> {
    let list: ApiBookList = self
      .client
      .get(
        &Endpoint::new("books/search")
          .query("category", category)
          .query("limit", limit),
      )
      .await?;
    Ok(list.into_books())
  }

  pub async fn get_available_books(
    &self,
    page: u32,
    limit: u32,
    category: Option<&str>,
  ) -> ApiResult<BookPage> {
    let list: ApiBookList = self
      .client
      .get(
        &Endpoint::new("books/available")
          .query("page", page)
          .query("limit", limit)
          .query_opt("category", category),
      )
      .await?;
    Ok(list.into_page(page, limit))
  }

  pub async fn search_books(&self, query: &str, page: u32, limit: u32) -> ApiResult<BookPage> {
    let list: ApiBookList = self
      .client
      .get(
        &Endpoint::new("books/search")
          .query("q", query)
          .query("page", page)
          .query("limit", limit),
      )
      .await?;
    Ok(list.into_page(page, limit))
  }

  // ==========================================================================
  // Borrowing
  // ==========================================================================

  pub async fn get_borrow_history(&self, book_id: &str) -> ApiResult<Vec<BorrowRecord>> {
    let history: Envelope<ApiHistory> = self
      .client
      .get(&Endpoint::new("borrow/history").query("bookId", book_id))
      .await?;
    Ok(history.into_inner().into_records())
  }

  pub async fn borrow_book(&self, barcode: &str, duration_days: u32) -> ApiResult<BorrowReceipt> {
    let body = BorrowRequest {
      barcode,
      duration_days,
    };
    let receipt: Option<Envelope<ApiBorrowReceipt>> = self
      .client
      .post(&Endpoint::new("borrow/borrow"), &body)
      .await?;
    Ok(match receipt {
      Some(receipt) => receipt.into_inner().into(),
      None => BorrowReceipt {
        borrow_id: None,
        due_date: None,
        message: None,
      },
    })
  }

  pub async fn get_current_borrows(&self) -> ApiResult<Vec<Borrow>> {
    let list: Envelope<ApiBorrowList> = self.client.get(&Endpoint::new("borrow/current")).await?;
    Ok(list.into_inner().into_borrows())
  }

  pub async fn get_overdue(&self) -> ApiResult<OverdueStatus> {
    let overdue: Envelope<ApiOverdue> = self.client.get(&Endpoint::new("borrow/overdue")).await?;
    Ok(overdue.into_inner().into())
  }

  pub async fn pay_fine(&self, fine_id: &str, amount: f64) -> ApiResult<ActionResponse> {
    let body = PayFineRequest { fine_id, amount };
    self.action(&Endpoint::new("borrow/pay-fine"), &body).await
  }

  pub async fn request_return(&self, borrow_id: &str) -> ApiResult<ActionResponse> {
    let body = ReturnRequest { borrow_id };
    self
      .action(&Endpoint::new("borrow/request-return"), &body)
      .await
  }

  async fn action<B: Serialize + ?Sized>(
    &self,
    endpoint: &Endpoint,
    body: &B,
  ) -> ApiResult<ActionResponse> {
    let value: Value = self.client.post(endpoint, body).await?;
    Ok(ApiAction::from_value(value).into())
  }
}
