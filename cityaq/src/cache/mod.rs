//! Request-deduplicating result cache.
//!
//! Two layers:
//!
//! - [`Cache`]: a byte-oriented key-value store with interchangeable
//!   providers ([`MemoryCacheProvider`], [`DiskCacheProvider`])
//! - [`RequestCache`]: get-or-compute on top of any store, running at most
//!   one [`Job`](crate::jobs::Job) per [`CacheKey`] at a time
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cityaq::cache::{DiskCacheProvider, RequestCache};
//!
//! let store = Arc::new(DiskCacheProvider::open("/var/cache/cityaq").await?);
//! let cache = RequestCache::new(store);
//! let result = cache.result(job, &CancellationToken::new()).await?;
//! ```

mod key;
mod providers;
mod request;
mod traits;

pub use key::CacheKey;
pub use providers::{DiskCacheProvider, MemoryCacheProvider};
pub use request::{RequestCache, RequestCacheStats, RequestError};
pub use traits::{BoxFuture, Cache, GcResult, ServiceCacheError};
