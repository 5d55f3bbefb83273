//! In-memory store backed by moka.
//!
//! Bounded by entry count rather than bytes: tile layer sets vary wildly in
//! size but are few, and moka's TinyLFU admission keeps the hot ones.

use moka::future::Cache as MokaCache;

use crate::cache::traits::{BoxFuture, Cache, GcResult, ServiceCacheError};

/// In-memory cache provider using moka.
pub struct MemoryCacheProvider {
    cache: MokaCache<String, Vec<u8>>,
}

impl MemoryCacheProvider {
    /// Create a provider holding at most `max_entries` entries.
    pub fn new(max_entries: u64) -> Self {
        Self {
            cache: MokaCache::builder().max_capacity(max_entries).build(),
        }
    }
}

impl Cache for MemoryCacheProvider {
    fn set(&self, key: &str, value: Vec<u8>) -> BoxFuture<'_, Result<(), ServiceCacheError>> {
        let key = key.to_string();
        Box::pin(async move {
            self.cache.insert(key, value).await;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, ServiceCacheError>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.cache.get(&key).await) })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool, ServiceCacheError>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.cache.remove(&key).await.is_some()) })
    }

    fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    fn gc(&self) -> BoxFuture<'_, Result<GcResult, ServiceCacheError>> {
        Box::pin(async move {
            let start = std::time::Instant::now();
            let before = self.cache.entry_count();
            self.cache.run_pending_tasks().await;
            let after = self.cache.entry_count();
            Ok(GcResult {
                entries_removed: before.saturating_sub(after) as usize,
                duration_ms: start.elapsed().as_millis() as u64,
            })
        })
    }
}
