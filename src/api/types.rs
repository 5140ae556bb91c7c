//! Domain types used by the views and derived-state functions.

use serde::Serialize;

use super::error::ValidationError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Book summary or detail
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
  pub id: String,
  pub barcode: String,
  pub title: String,
  pub author: String,
  pub category: Option<String>,
  pub isbn: Option<String>,
  pub publisher: Option<String>,
  pub year: Option<i32>,
  pub location: Option<String>,
  pub description: Option<String>,
  /// Raw status label, e.g. "Available" or "Checked Out"
  pub availability: String,
}

/// One page of a book listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookPage {
  pub books: Vec<Book>,
  pub page: u32,
  pub total_pages: Option<u32>,
  pub has_more: bool,
}

impl BookPage {
  /// Cursor for the page after this one, `None` when exhausted.
  pub fn next_page(&self) -> Option<u32> {
    let more = match self.total_pages {
      Some(total) => self.page < total,
      None => self.has_more,
    };
    (more && !self.books.is_empty()).then_some(self.page + 1)
  }
}

impl AsRef<[Book]> for BookPage {
  fn as_ref(&self) -> &[Book] {
    &self.books
  }
}

/// A book currently on loan to the user
#[derive(Debug, Clone, PartialEq)]
pub struct Borrow {
  pub id: String,
  pub book_id: String,
  pub barcode: Option<String>,
  pub title: String,
  pub author: Option<String>,
  pub borrowed_at: Option<String>,
  /// Raw due date string (ISO date or RFC 3339 timestamp)
  pub due_date: String,
  pub return_requested: bool,
}

/// An overdue loan and its fine
#[derive(Debug, Clone, PartialEq)]
pub struct OverdueItem {
  pub borrow_id: String,
  pub fine_id: Option<String>,
  pub title: String,
  pub due_date: String,
  /// Parsed fine amount, `None` when missing or not a number
  pub fine_amount: Option<f64>,
}

/// Overdue loans plus the server-side total
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverdueStatus {
  pub items: Vec<OverdueItem>,
  pub total_fine: Option<f64>,
}

/// Past or current loan of a book
#[derive(Debug, Clone, PartialEq)]
pub struct BorrowRecord {
  pub id: String,
  pub borrower: Option<String>,
  pub borrowed_at: Option<String>,
  pub due_date: Option<String>,
  pub returned_at: Option<String>,
  pub status: Option<String>,
}

/// User profile, normalized from whichever field naming the server used
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
  pub id: String,
  pub full_name: String,
  pub email: String,
  pub phone: Option<String>,
  pub student_id: Option<String>,
  pub department: Option<String>,
  pub member_since: Option<String>,
}

/// Editable profile fields
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
  pub full_name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
}

impl ProfileUpdate {
  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.full_name.trim().is_empty() {
      return Err(ValidationError::new("fullName", "Full name is required"));
    }
    Ok(())
  }
}

/// Password change form. `confirm_password` never leaves the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
  pub current_password: String,
  pub new_password: String,
  #[serde(skip)]
  pub confirm_password: String,
}

impl PasswordChange {
  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.current_password.is_empty() {
      return Err(ValidationError::new(
        "currentPassword",
        "Current password is required",
      ));
    }
    if self.new_password.is_empty() {
      return Err(ValidationError::new("newPassword", "New password is required"));
    }
    if self.new_password.chars().count() < MIN_PASSWORD_LENGTH {
      return Err(ValidationError::new(
        "newPassword",
        format!(
          "Password must be at least {} characters",
          MIN_PASSWORD_LENGTH
        ),
      ));
    }
    if self.new_password == self.current_password {
      return Err(ValidationError::new(
        "newPassword",
        "New password must differ from the current one",
      ));
    }
    if self.new_password != self.confirm_password {
      return Err(ValidationError::new(
        "confirmPassword",
        "Passwords do not match",
      ));
    }
    Ok(())
  }
}

/// Result of a successful borrow
#[derive(Debug, Clone, PartialEq)]
pub struct BorrowReceipt {
  pub borrow_id: Option<String>,
  pub due_date: Option<String>,
  pub message: Option<String>,
}

/// Generic acknowledgement of an action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionResponse {
  pub success: bool,
  pub message: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn change(current: &str, new: &str, confirm: &str) -> PasswordChange {
    PasswordChange {
      current_password: current.to_string(),
      new_password: new.to_string(),
      confirm_password: confirm.to_string(),
    }
  }

  #[test]
  fn test_password_validation() {
    assert_eq!(
      change("", "newsecret", "newsecret").validate().unwrap_err().field,
      "currentPassword"
    );
    assert_eq!(
      change("oldsecret", "short", "short").validate().unwrap_err().field,
      "newPassword"
    );
    assert_eq!(
      change("oldsecret", "oldsecret", "oldsecret")
        .validate()
        .unwrap_err()
        .field,
      "newPassword"
    );
    let err = change("oldsecret", "newsecret", "newsecreT")
      .validate()
      .unwrap_err();
    assert_eq!(err.field, "confirmPassword");
    assert_eq!(err.message, "Passwords do not match");

    assert!(change("oldsecret", "newsecret", "newsecret").validate().is_ok());
  }

  #[test]
  fn test_password_change_never_sends_confirmation() {
    let body = serde_json::to_value(change("a", "b", "c")).unwrap();
    assert_eq!(
      body,
      serde_json::json!({"currentPassword": "a", "newPassword": "b"})
    );
  }

  #[test]
  fn test_profile_update_validation() {
    let update = ProfileUpdate {
      full_name: "   ".to_string(),
      phone: None,
    };
    assert!(update.validate().is_err());
    assert_eq!(
      serde_json::to_value(ProfileUpdate {
        full_name: "Ada".to_string(),
        phone: None
      })
      .unwrap(),
      serde_json::json!({"fullName": "Ada"})
    );
  }

  #[test]
  fn test_next_page_cursor() {
    let book = Book {
      id: "1".into(),
      barcode: "LIB-1".into(),
      title: "T".into(),
      author: "A".into(),
      category: None,
      isbn: None,
      publisher: None,
      year: None,
      location: None,
      description: None,
      availability: "Available".into(),
    };
    let page = BookPage {
      books: vec![book.clone()],
      page: 1,
      total_pages: Some(2),
      has_more: false,
    };
    assert_eq!(page.next_page(), Some(2));

    let last = BookPage {
      page: 2,
      ..page.clone()
    };
    assert_eq!(last.next_page(), None);

    let unknown_total = BookPage {
      books: vec![book],
      page: 3,
      total_pages: None,
      has_more: true,
    };
    assert_eq!(unknown_total.next_page(), Some(4));

    let empty = BookPage {
      books: vec![],
      page: 1,
      total_pages: None,
      has_more: true,
    };
    assert_eq!(empty.next_page(), None);
  }
}
