//! Errors surfaced by the library API.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::cache::CacheError;

pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred";

/// A failed request. `status` is `None` when no response was received.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ApiError {
  pub message: String,
  pub status: Option<u16>,
  pub field_errors: BTreeMap<String, String>,
}

impl fmt::Display for ApiError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.status {
      Some(status) => write!(f, "{} ({})", self.message, status),
      None => f.write_str(&self.message),
    }
  }
}

#[derive(Debug, Deserialize, Default)]
struct ErrorBody {
  message: Option<String>,
  error: Option<Value>,
  detail: Option<String>,
  errors: Option<Value>,
}

impl ApiError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      status: None,
      field_errors: BTreeMap::new(),
    }
  }

  /// Transport failure: the server never answered.
  pub fn unexpected() -> Self {
    Self::new(UNEXPECTED_ERROR)
  }

  /// Build from a non-2xx response body.
  pub fn from_response(status: u16, body: &[u8]) -> Self {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();

    let error_text = match &parsed.error {
      Some(Value::String(s)) => Some(s.clone()),
      Some(Value::Object(obj)) => obj
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string),
      _ => None,
    };

    let message = parsed
      .message
      .or(error_text)
      .or(parsed.detail)
      .filter(|m| !m.trim().is_empty())
      .unwrap_or_else(|| format!("Request failed with status {}", status));

    Self {
      message,
      status: Some(status),
      field_errors: parsed.errors.map(field_errors).unwrap_or_default(),
    }
  }

  pub fn is_unauthorized(&self) -> bool {
    self.status == Some(401)
  }

  pub fn field_error(&self, field: &str) -> Option<&str> {
    self.field_errors.get(field).map(String::as_str)
  }
}

/// Flatten the `errors` member of an error body. Accepts a map of field to
/// message or list of messages, or a list of `{field, message}` objects.
fn field_errors(value: Value) -> BTreeMap<String, String> {
  let mut out = BTreeMap::new();
  match value {
    Value::Object(map) => {
      for (field, messages) in map {
        if let Some(text) = join_messages(&messages) {
          out.insert(field, text);
        }
      }
    }
    Value::Array(items) => {
      for item in items {
        let field = item
          .get("field")
          .or_else(|| item.get("path"))
          .and_then(Value::as_str);
        let message = item.get("message").and_then(Value::as_str);
        if let (Some(field), Some(message)) = (field, message) {
          out.insert(field.to_string(), message.to_string());
        }
      }
    }
    _ => {}
  }
  out
}

fn join_messages(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Array(items) => {
      let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
      (!parts.is_empty()).then(|| parts.join("; "))
    }
    _ => None,
  }
}

impl From<CacheError> for ApiError {
  fn from(err: CacheError) -> Self {
    Self::new(err.to_string())
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    tracing::debug!(error = %err, "transport error");
    Self::unexpected()
  }
}

/// Input rejected before any request is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
  pub field: &'static str,
  pub message: String,
}

impl ValidationError {
  pub fn new(field: &'static str, message: impl Into<String>) -> Self {
    Self {
      field,
      message: message.into(),
    }
  }
}

/// Failure of a form submission: rejected locally or by the server.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
  #[error(transparent)]
  Invalid(#[from] ValidationError),
  #[error(transparent)]
  Api(#[from] ApiError),
}

impl FormError {
  /// Message to show next to `field`, from either source.
  pub fn field_error(&self, field: &str) -> Option<&str> {
    match self {
      Self::Invalid(err) => (err.field == field).then_some(err.message.as_str()),
      Self::Api(err) => err.field_error(field),
    }
  }

  pub fn is_unauthorized(&self) -> bool {
    matches!(self, Self::Api(err) if err.is_unauthorized())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_message_from_json_body() {
    let err = ApiError::from_response(400, br#"{"message": "Book not available"}"#);
    assert_eq!(err.message, "Book not available");
    assert_eq!(err.status, Some(400));
    assert!(err.field_errors.is_empty());
  }

  #[test]
  fn test_error_and_detail_fallbacks() {
    let err = ApiError::from_response(403, br#"{"error": "Forbidden"}"#);
    assert_eq!(err.message, "Forbidden");

    let err = ApiError::from_response(403, br#"{"error": {"message": "Nested"}}"#);
    assert_eq!(err.message, "Nested");

    let err = ApiError::from_response(422, br#"{"detail": "Bad input"}"#);
    assert_eq!(err.message, "Bad input");
  }

  #[test]
  fn test_unparseable_body_falls_back_to_status() {
    let err = ApiError::from_response(502, b"<html>Bad gateway</html>");
    assert_eq!(err.message, "Request failed with status 502");
    assert_eq!(err.status, Some(502));

    let err = ApiError::from_response(500, b"");
    assert_eq!(err.message, "Request failed with status 500");
  }

  #[test]
  fn test_field_errors_map_and_list() {
    let err = ApiError::from_response(
      422,
      br#"{"message": "Invalid", "errors": {"phone": ["too short", "digits only"], "fullName": "required"}}"#,
    );
    assert_eq!(err.field_error("phone"), Some("too short; digits only"));
    assert_eq!(err.field_error("fullName"), Some("required"));

    let err = ApiError::from_response(
      422,
      br#"{"errors": [{"field": "newPassword", "message": "too weak"}]}"#,
    );
    assert_eq!(err.field_error("newPassword"), Some("too weak"));
    assert_eq!(err.message, "Request failed with status 422");
  }

  #[test]
  fn test_unexpected_has_no_status() {
    let err = ApiError::unexpected();
    assert_eq!(err.status, None);
    assert_eq!(err.to_string(), UNEXPECTED_ERROR);
  }

  #[test]
  fn test_form_error_field_lookup() {
    let local = FormError::from(ValidationError::new("confirmPassword", "Passwords do not match"));
    assert_eq!(local.field_error("confirmPassword"), Some("Passwords do not match"));
    assert_eq!(local.field_error("newPassword"), None);
    assert_eq!(local.to_string(), "Passwords do not match");

    let remote = FormError::from(ApiError::from_response(
      422,
      br#"{"errors": {"phone": "invalid"}}"#,
    ));
    assert_eq!(remote.field_error("phone"), Some("invalid"));
    assert!(!remote.is_unauthorized());
  }
}
