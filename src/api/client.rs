use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::{header, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::error::ApiError;
use crate::session::Session;

/// Relative API path plus query parameters. Segments and values are
/// percent-encoded when the full URL is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
  segments: Vec<String>,
  query: Vec<(String, String)>,
}

impl Endpoint {
  /// `path` is split on `/`; each piece is one literal segment.
  pub fn new(path: &str) -> Self {
    Self {
      segments: path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect(),
      query: Vec::new(),
    }
  }

  /// Append a single segment, which may contain `/` or spaces.
  pub fn segment(mut self, segment: impl Into<String>) -> Self {
    self.segments.push(segment.into());
    self
  }

  pub fn query(mut self, key: &str, value: impl ToString) -> Self {
    self.query.push((key.to_string(), value.to_string()));
    self
  }

  pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
    match value {
      Some(v) => self.query(key, v),
      None => self,
    }
  }

  fn apply(&self, base: &Url) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
      segments.pop_if_empty();
      segments.extend(self.segments.iter());
    }
    if !self.query.is_empty() {
      url
        .query_pairs_mut()
        .extend_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    url
  }
}

/// Thin JSON-over-HTTP client for the library API
#[derive(Clone)]
pub struct HttpClient {
  http: reqwest::Client,
  base_url: Url,
  session: Session,
}

impl HttpClient {
  pub fn new(base_url: &str, session: Session, timeout: Option<Duration>) -> Result<Self> {
    let base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid API base URL '{}': {}", base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("API base URL '{}' cannot be a base", base_url));
    }

    let mut builder = reqwest::Client::builder().user_agent(concat!(
      env!("CARGO_PKG_NAME"),
      "/",
      env!("CARGO_PKG_VERSION")
    ));
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let http = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      session,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn url(&self, endpoint: &Endpoint) -> Url {
    endpoint.apply(&self.base_url)
  }

  /// Perform one request. The token is read from the session each time.
  pub async fn request<T, B>(
    &self,
    method: Method,
    endpoint: &Endpoint,
    body: Option<&B>,
  ) -> Result<T, ApiError>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    let url = self.url(endpoint);
    let mut request = self
      .http
      .request(method.clone(), url.clone())
      .header(header::ACCEPT, "application/json");

    if let Some(token) = self.session.token() {
      request = request.bearer_auth(token);
    }
    if let Some(body) = body {
      request = request.json(body);
    }

    let response = request.send().await.map_err(|e| {
      warn!(%method, %url, error = %e, "request failed without a response");
      ApiError::unexpected()
    })?;

    let status = response.status();
    let bytes = response.bytes().await?;
    debug!(%method, %url, status = status.as_u16(), bytes = bytes.len(), "response");

    if !status.is_success() {
      let err = ApiError::from_response(status.as_u16(), &bytes);
      debug!(%method, %url, error = %err, "api error");
      return Err(err);
    }

    decode(status.as_u16(), &bytes)
  }

  pub async fn get<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T, ApiError> {
    self.request::<T, ()>(Method::GET, endpoint, None).await
  }

  pub async fn post<T, B>(&self, endpoint: &Endpoint, body: &B) -> Result<T, ApiError>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    self.request(Method::POST, endpoint, Some(body)).await
  }

  pub async fn put<T, B>(&self, endpoint: &Endpoint, body: &B) -> Result<T, ApiError>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    self.request(Method::PUT, endpoint, Some(body)).await
  }

  pub async fn delete<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T, ApiError> {
    self.request::<T, ()>(Method::DELETE, endpoint, None).await
  }
}

/// Decode a 2xx body; an empty body reads as `null`.
fn decode<T: DeserializeOwned>(status: u16, bytes: &[u8]) -> Result<T, ApiError> {
  let parsed = if bytes.iter().all(u8::is_ascii_whitespace) {
    serde_json::from_value(Value::Null)
  } else {
    serde_json::from_slice(bytes)
  };
  parsed.map_err(|e| {
    warn!(status, error = %e, "failed to decode response body");
    ApiError {
      status: Some(status),
      ..ApiError::unexpected()
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::error::UNEXPECTED_ERROR;
  use serde_json::json;
  use wiremock::matchers::{body_json, header, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client_for(server: &MockServer, session: Session) -> HttpClient {
    HttpClient::new(&format!("{}/api", server.uri()), session, None).unwrap()
  }

  #[test]
  fn test_endpoint_encodes_segments_and_query() {
    let base = Url::parse("http://localhost:3000/api").unwrap();
    let url = Endpoint::new("/books/barcode")
      .segment("LIB 00/124")
      .apply(&base);
    assert_eq!(url.as_str(), "http://localhost:3000/api/books/barcode/LIB%2000%2F124");

    let url = Endpoint::new("books/search")
      .query("q", "dune & sons")
      .query("page", 2)
      .query_opt("category", None::<&str>)
      .apply(&base);
    assert_eq!(
      url.as_str(),
      "http://localhost:3000/api/books/search?q=dune+%26+sons&page=2"
    );
  }

  #[test]
  fn test_base_url_with_trailing_slash() {
    let base = Url::parse("http://localhost:3000/api/").unwrap();
    let url = Endpoint::new("profile").apply(&base);
    assert_eq!(url.as_str(), "http://localhost:3000/api/profile");
  }

  #[tokio::test]
  async fn test_bearer_token_injected_when_present() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/profile"))
      .and(header("Authorization", "Bearer tok-1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
      .expect(1)
      .mount(&server)
      .await;

    let session = Session::in_memory();
    session.set_token("tok-1").unwrap();
    let client = client_for(&server, session);

    let body: Value = client.get(&Endpoint::new("profile")).await.unwrap();
    assert_eq!(body, json!({"ok": true}));
  }

  #[tokio::test]
  async fn test_no_authorization_header_without_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/books/search"))
      .and(query_param("q", "dune messiah"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .mount(&server)
      .await;

    let client = client_for(&server, Session::in_memory());
    let _: Value = client
      .get(&Endpoint::new("books/search").query("q", "dune messiah"))
      .await
      .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
  }

  #[tokio::test]
  async fn test_token_read_on_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!(null)))
      .mount(&server)
      .await;

    let session = Session::in_memory();
    let client = client_for(&server, session.clone());

    let _: Value = client.get(&Endpoint::new("profile")).await.unwrap();
    session.set_token("later").unwrap();
    let _: Value = client.get(&Endpoint::new("profile")).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
    assert_eq!(
      requests[1].headers.get("authorization").unwrap(),
      "Bearer later"
    );
  }

  #[tokio::test]
  async fn test_post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/borrow/borrow"))
      .and(body_json(json!({"barcode": "LIB-00124", "durationDays": 14})))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "b1"})))
      .mount(&server)
      .await;

    let client = client_for(&server, Session::in_memory());
    let body: Value = client
      .post(
        &Endpoint::new("borrow/borrow"),
        &json!({"barcode": "LIB-00124", "durationDays": 14}),
      )
      .await
      .unwrap();
    assert_eq!(body["id"], "b1");
  }

  #[tokio::test]
  async fn test_non_success_parses_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
      .and(path("/api/profile"))
      .respond_with(ResponseTemplate::new(422).set_body_json(json!({
        "message": "Validation failed",
        "errors": {"phone": "Invalid phone number"}
      })))
      .mount(&server)
      .await;

    let client = client_for(&server, Session::in_memory());
    let err = client
      .put::<Value, _>(&Endpoint::new("profile"), &json!({"phone": "x"}))
      .await
      .unwrap_err();

    assert_eq!(err.status, Some(422));
    assert_eq!(err.message, "Validation failed");
    assert_eq!(err.field_error("phone"), Some("Invalid phone number"));
  }

  #[tokio::test]
  async fn test_non_json_error_uses_fallback_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
      .mount(&server)
      .await;

    let client = client_for(&server, Session::in_memory());
    let err = client
      .get::<Value>(&Endpoint::new("borrow/current"))
      .await
      .unwrap_err();

    assert_eq!(err.status, Some(503));
    assert_eq!(err.message, "Request failed with status 503");
  }

  #[tokio::test]
  async fn test_transport_failure_has_no_status() {
    let port = {
      let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
      listener.local_addr().unwrap().port()
    };
    let uri = format!("http://127.0.0.1:{}/api", port);

    let client = HttpClient::new(&uri, Session::in_memory(), Some(Duration::from_secs(2))).unwrap();
    let err = client
      .get::<Value>(&Endpoint::new("profile"))
      .await
      .unwrap_err();

    assert_eq!(err.status, None);
    assert_eq!(err.message, UNEXPECTED_ERROR);
  }

  #[tokio::test]
  async fn test_empty_success_body_decodes_as_unit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/auth/logout"))
      .respond_with(ResponseTemplate::new(204))
      .mount(&server)
      .await;

    let client = client_for(&server, Session::in_memory());
    let () = client
      .post(&Endpoint::new("auth/logout"), &json!({}))
      .await
      .unwrap();
    let value: Option<Value> = client
      .post(&Endpoint::new("auth/logout"), &json!({}))
      .await
      .unwrap();
    assert_eq!(value, None);
  }

  #[test]
  fn test_invalid_base_url_rejected() {
    assert!(HttpClient::new("not a url", Session::in_memory(), None).is_err());
    assert!(HttpClient::new("mailto:library@example.com", Session::in_memory(), None).is_err());
  }
}
