//! Library REST API: HTTP client, resource services and cache identities.

pub mod api_types;
pub mod client;
pub mod error;
pub mod keys;
pub mod service;
pub mod types;

pub use client::{Endpoint, HttpClient};
pub use error::{ApiError, FormError, ValidationError};
pub use keys::ResourceKey;
pub use service::LibraryApi;
