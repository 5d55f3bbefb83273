//! Single-flight get-or-compute cache.
//!
//! ```text
//!  result(job) ──► store lookup ──► hit ──► decode, return
//!                       │ miss
//!                       ▼
//!               in-flight map ──► present ──► subscribe, wait
//!                       │ absent
//!                       ▼
//!               claim key, spawn leader
//!                       │
//!                       ▼
//!      re-check store ─► run job ─► encode ─► store.set
//!                       │
//!                       ▼
//!            release key, publish to every waiter
//! ```
//!
//! The leader runs on its own task under the cache's shutdown token, so a
//! waiter that gives up (the initiating caller included) only detaches
//! itself. The encoded value reaches the store before any waiter is woken,
//! which means a caller arriving after the key is released always finds it.
//! Failures are published to the waiters of that invocation and never stored.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::key::CacheKey;
use crate::cache::traits::{Cache, ServiceCacheError};
use crate::codec::{CacheCodec, CodecError};
use crate::jobs::Job;

/// Errors surfaced by [`RequestCache::result`].
///
/// Cloneable so one failure can be handed to every waiter; the underlying
/// errors are shared through `Arc`.
#[derive(Debug, Error)]
pub enum RequestError<E> {
    #[error("{0}")]
    Job(Arc<E>),

    #[error("cache codec error: {0}")]
    Codec(Arc<CodecError>),

    #[error("cache store error: {0}")]
    Store(Arc<ServiceCacheError>),

    /// The leader task went away without publishing a result.
    #[error("computation abandoned before completing")]
    Abandoned,

    /// This caller stopped waiting.
    #[error("request cancelled")]
    Cancelled,
}

impl<E> Clone for RequestError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Job(e) => Self::Job(Arc::clone(e)),
            Self::Codec(e) => Self::Codec(Arc::clone(e)),
            Self::Store(e) => Self::Store(Arc::clone(e)),
            Self::Abandoned => Self::Abandoned,
            Self::Cancelled => Self::Cancelled,
        }
    }
}

impl<E> From<CodecError> for RequestError<E> {
    fn from(e: CodecError) -> Self {
        Self::Codec(Arc::new(e))
    }
}

impl<E> From<ServiceCacheError> for RequestError<E> {
    fn from(e: ServiceCacheError) -> Self {
        Self::Store(Arc::new(e))
    }
}

impl<E> RequestError<E> {
    /// The job's own error, when that is what failed.
    pub fn job_error(&self) -> Option<&E> {
        match self {
            Self::Job(e) => Some(e),
            _ => None,
        }
    }
}

/// Counters describing how requests were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestCacheStats {
    /// Served straight from the store.
    pub hits: u64,
    /// Not in the store on first lookup.
    pub misses: u64,
    /// Joined an execution already in flight.
    pub coalesced: u64,
    /// Times a job was actually run.
    pub executions: u64,
}

impl fmt::Display for RequestCacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} coalesced={} executions={}",
            self.hits, self.misses, self.coalesced, self.executions
        )
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    executions: AtomicU64,
}

type Outcome<J> = Result<Arc<<J as Job>::Output>, RequestError<<J as Job>::Error>>;
type Slot<J> = watch::Receiver<Option<Outcome<J>>>;

struct Inner<J: Job> {
    store: Arc<dyn Cache>,
    in_flight: DashMap<String, Slot<J>>,
    counters: Counters,
    shutdown: CancellationToken,
}

/// Get-or-compute cache running at most one job per key at a time.
pub struct RequestCache<J: Job> {
    inner: Arc<Inner<J>>,
}

impl<J: Job> Clone for RequestCache<J> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<J: Job> RequestCache<J> {
    /// Create a cache over `store`.
    pub fn new(store: Arc<dyn Cache>) -> Self {
        Self::with_shutdown(store, CancellationToken::new())
    }

    /// Create a cache whose running jobs are cancelled with `shutdown`.
    pub fn with_shutdown(store: Arc<dyn Cache>, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                in_flight: DashMap::new(),
                counters: Counters::default(),
                shutdown,
            }),
        }
    }

    /// Return the cached output of `job`, computing it if needed.
    ///
    /// `cancel` only governs how long this caller waits; the computation
    /// keeps running for other waiters and still populates the store.
    pub async fn result(&self, job: J, cancel: &CancellationToken) -> Outcome<J> {
        let key = job.key();

        if let Some(value) = self.inner.lookup(&key).await? {
            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache hit");
            return Ok(value);
        }
        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);

        let (mut rx, leader) = match self.inner.in_flight.entry(key.as_str().to_string()) {
            Entry::Occupied(e) => {
                self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Request coalesced with in-flight computation");
                (e.get().clone(), None)
            }
            Entry::Vacant(e) => {
                let (tx, rx) = watch::channel(None);
                e.insert(rx.clone());
                (rx, Some(tx))
            }
        };

        if let Some(tx) = leader {
            debug!(key = %key, "Cache miss, starting computation");
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let mut guard = InFlightGuard {
                    inner: &inner,
                    key: key.as_str(),
                    armed: true,
                };
                let outcome = inner.execute(&key, job).await;
                if let Err(e) = &outcome {
                    warn!(key = %key, error = %e, "Computation failed");
                }
                guard.release();
                let _ = tx.send(Some(outcome));
            });
        }

        tokio::select! {
            published = rx.wait_for(Option::is_some) => match published {
                Ok(value) => match &*value {
                    Some(outcome) => outcome.clone(),
                    None => Err(RequestError::Abandoned),
                },
                Err(_) => Err(RequestError::Abandoned),
            },
            _ = cancel.cancelled() => Err(RequestError::Cancelled),
        }
    }

    pub fn stats(&self) -> RequestCacheStats {
        let c = &self.inner.counters;
        RequestCacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            executions: c.executions.load(Ordering::Relaxed),
        }
    }

    /// Cancel every running computation.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

impl<J: Job> Inner<J> {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Arc<J::Output>>, RequestError<J::Error>> {
        match self.store.get(key.as_str()).await? {
            Some(bytes) => Ok(Some(Arc::new(J::Output::decode(&bytes)?))),
            None => Ok(None),
        }
    }

    async fn execute(&self, key: &CacheKey, job: J) -> Outcome<J> {
        // Another leader may have finished between our lookup and the claim.
        if let Some(value) = self.lookup(key).await? {
            return Ok(value);
        }

        self.counters.executions.fetch_add(1, Ordering::Relaxed);
        let output = job
            .run(self.shutdown.child_token())
            .await
            .map_err(|e| RequestError::Job(Arc::new(e)))?;

        let bytes = output.encode()?;
        self.store.set(key.as_str(), bytes).await?;
        debug!(key = %key, "Stored computed result");
        Ok(Arc::new(output))
    }
}

/// Releases the in-flight claim even if the leader task unwinds.
struct InFlightGuard<'a, J: Job> {
    inner: &'a Inner<J>,
    key: &'a str,
    armed: bool,
}

impl<J: Job> InFlightGuard<'_, J> {
    fn release(&mut self) {
        if self.armed {
            self.inner.in_flight.remove(self.key);
            self.armed = false;
        }
    }
}

impl<J: Job> Drop for InFlightGuard<'_, J> {
    fn drop(&mut self) {
        self.release();
    }
}
