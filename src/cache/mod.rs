//! Generic query cache for asynchronous data loading.
//!
//! This module is API-agnostic. It provides:
//! - Keyed query slots with staleness windows and in-flight coalescing
//! - Accumulated pagination with strictly ordered page appends
//! - Tracked mutations that invalidate slots before they resolve
//! - Callback subscriptions and time-based garbage collection

mod client;
mod entry;
mod pages;
mod traits;

pub use client::{CacheConfig, QueryClient, QueryOptions, Subscription};
pub use entry::{MutationStatus, QueryEntry, QueryState};
pub use pages::{PaginatedQuery, Pages};
pub use traits::{CacheError, FetchError, KeyPattern, QueryEvent, QueryEventKind, QueryKey};
