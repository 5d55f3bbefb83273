//! Backing-store contract for cached results.
//!
//! A `Cache` is a plain key-value store of encoded payloads. It knows nothing
//! about jobs or deduplication; [`RequestCache`](super::RequestCache) layers
//! single-flight execution on top of any implementation.
//!
//! Methods return boxed futures so stores can be used as `Arc<dyn Cache>`.
//!
//! # Example
//!
//! ```ignore
//! use cityaq::cache::{Cache, MemoryCacheProvider};
//!
//! let store = MemoryCacheProvider::new(1_000);
//! store.set("concentration_accra_roadways", bytes).await?;
//! let value = store.get("concentration_accra_roadways").await?;
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Result of a garbage collection pass.
#[derive(Debug, Clone, Default)]
pub struct GcResult {
    /// Number of entries removed.
    pub entries_removed: usize,
    /// Duration of the pass in milliseconds.
    pub duration_ms: u64,
}

impl fmt::Display for GcResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GC: removed {} entries in {}ms",
            self.entries_removed, self.duration_ms
        )
    }
}

/// Errors raised by a backing store.
#[derive(Debug, Error)]
pub enum ServiceCacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key cannot be stored by this provider.
    #[error("invalid cache key {0:?}")]
    InvalidKey(String),

    #[error("provider error: {0}")]
    Provider(String),
}

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key-value store for encoded cache entries.
///
/// Entries are immutable once written: callers never update a key in place,
/// they only write a key that is absent. Eviction is left to each provider.
pub trait Cache: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: Vec<u8>) -> BoxFuture<'_, Result<(), ServiceCacheError>>;

    /// Retrieve the value stored under `key`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(data))` if the key exists
    /// - `Ok(None)` if it does not
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, ServiceCacheError>>;

    /// Delete the value under `key`. Returns whether it existed.
    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool, ServiceCacheError>>;

    /// Number of entries currently held.
    fn entry_count(&self) -> u64;

    /// Run pending maintenance. A no-op for stores that never evict.
    fn gc(&self) -> BoxFuture<'_, Result<GcResult, ServiceCacheError>>;
}
