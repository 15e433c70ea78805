//! Memoizing Wrapper Module
//!
//! The public entry point: consult the store, run the operation only on a
//! miss, persist its result, then enforce capacity.
//!
//! Cache failures never reach the caller. The worst a broken cache can do is
//! behave as if it were not there; the operation's own error is returned
//! untouched and never cached.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::codec;
use crate::cache::key::{fingerprint, fingerprint_namespaced, Args, CacheKey};
use crate::cache::lru::{self, EvictionReport};
use crate::cache::stats::CacheStats;
use crate::cache::store::CacheStore;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Memo Cache ==
/// A store plus the capacity it is held to. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MemoCache {
    store: Arc<CacheStore>,
    capacity: usize,
}

/// Opens the cache rooted at `path`, holding at most `capacity` entries.
pub fn open_store(path: impl Into<PathBuf>, capacity: usize) -> Result<MemoCache> {
    MemoCache::open(&CacheConfig::new(path, capacity))
}

impl MemoCache {
    // == Constructor ==
    /// Opens a cache from configuration.
    ///
    /// The storage root is created on first write. Stale temp files from
    /// crashed writers are swept here, best-effort.
    pub fn open(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let store = CacheStore::new(&config.storage_root);

        match store.sweep_temp_files(config.temp_max_age()) {
            Ok(0) => {}
            Ok(n) => info!(removed = n, "Removed stale temp files from cache"),
            Err(e) => warn!(error = %e, "Failed to sweep temp files. Ignoring."),
        }

        Ok(Self {
            store: Arc::new(store),
            capacity: config.capacity,
        })
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current statistics, with the entry count read from disk.
    pub fn stats(&self) -> CacheStats {
        self.store.stats().snapshot(self.store.len())
    }

    /// Runs an eviction pass against this cache's capacity.
    pub fn enforce(&self) -> EvictionReport {
        lru::enforce(&self.store, self.capacity)
    }

    // == Call ==
    /// Returns `operation(args)`, from the store when possible.
    pub fn call<R, E, F>(&self, operation: F, args: &Args) -> std::result::Result<R, E>
    where
        R: Serialize + DeserializeOwned,
        F: FnOnce(&Args) -> std::result::Result<R, E>,
    {
        self.call_in(None, operation, args)
    }

    /// Async counterpart of [`MemoCache::call`].
    ///
    /// Store reads, writes and eviction scans run on the blocking pool, never
    /// on the async worker.
    pub async fn call_async<R, E, F, Fut>(
        &self,
        operation: F,
        args: Args,
    ) -> std::result::Result<R, E>
    where
        R: Serialize + DeserializeOwned,
        F: FnOnce(Args) -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
    {
        let key = match self.lookup_key(None, &args) {
            Some(key) => key,
            None => return operation(args).await,
        };

        let payload = {
            let (cache, key) = (self.clone(), key.clone());
            off_worker(move || cache.store.get(&key)).await.flatten()
        };
        match payload.map(|bytes| self.accept_hit(&key, &bytes)) {
            Some(Ok(hit)) => return Ok(hit),
            Some(Err(cause)) => {
                let (cache, key) = (self.clone(), key.clone());
                off_worker(move || cache.store.purge(&key, &cause)).await;
            }
            None => self.store.stats().record_miss(),
        }

        debug!(key = %key, "Cache miss. Calling wrapped operation...");
        let result = operation(args).await?;
        if let Some(bytes) = self.encode_result(&key, &result) {
            let cache = self.clone();
            off_worker(move || cache.install(&key, &bytes)).await;
        }
        Ok(result)
    }

    // == Memoize ==
    /// Wraps `operation` so every call goes through this cache.
    pub fn memoize<F>(&self, operation: F) -> Memoized<F> {
        Memoized {
            cache: self.clone(),
            namespace: None,
            operation,
        }
    }

    /// Like [`MemoCache::memoize`], with keys scoped to `name` so different
    /// operations can share one storage root.
    pub fn memoize_named<F>(&self, name: impl Into<String>, operation: F) -> Memoized<F> {
        Memoized {
            cache: self.clone(),
            namespace: Some(name.into()),
            operation,
        }
    }

    fn call_in<R, E, F>(
        &self,
        namespace: Option<&str>,
        operation: F,
        args: &Args,
    ) -> std::result::Result<R, E>
    where
        R: Serialize + DeserializeOwned,
        F: FnOnce(&Args) -> std::result::Result<R, E>,
    {
        let key = match self.lookup_key(namespace, args) {
            Some(key) => key,
            None => return operation(args),
        };
        if let Some(hit) = self.load(&key) {
            return Ok(hit);
        }

        debug!(key = %key, "Cache miss. Calling wrapped operation...");
        let result = operation(args)?;
        self.save(&key, &result);
        Ok(result)
    }

    /// Fingerprints `args`, or returns `None` when caching is unavailable for them.
    fn lookup_key(&self, namespace: Option<&str>, args: &Args) -> Option<CacheKey> {
        let key = match namespace {
            Some(ns) => fingerprint_namespaced(ns, args),
            None => fingerprint(args),
        };
        match key {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "Failed to encode arguments for caching. Calling operation directly.");
                self.store.stats().record_bypass();
                None
            }
        }
    }

    /// Reads and decodes a hit. Undecodable payloads are purged and read as a miss.
    fn load<R: DeserializeOwned>(&self, key: &CacheKey) -> Option<R> {
        let Some(payload) = self.store.get(key) else {
            self.store.stats().record_miss();
            return None;
        };
        match self.accept_hit(key, &payload) {
            Ok(value) => Some(value),
            Err(cause) => {
                self.store.purge(key, &cause);
                None
            }
        }
    }

    /// Decodes a stored payload, counting it as a hit or, when it does not
    /// decode as `R`, as a miss whose entry must be purged.
    fn accept_hit<R: DeserializeOwned>(&self, key: &CacheKey, payload: &[u8]) -> Result<R> {
        let stats = self.store.stats();
        match codec::decode_value(payload) {
            Ok(value) => {
                debug!(key = %key, "Cache hit");
                stats.record_hit();
                Ok(value)
            }
            Err(e) => {
                stats.record_miss();
                Err(CacheError::corruption(key.as_str(), e.to_string()))
            }
        }
    }

    /// Stores a fresh result and trims the store. Failures are logged only.
    fn save<R: Serialize>(&self, key: &CacheKey, result: &R) {
        if let Some(bytes) = self.encode_result(key, result) {
            self.install(key, &bytes);
        }
    }

    /// Encodes a result, or returns `None` when it has no faithful encoding.
    fn encode_result<R: Serialize>(&self, key: &CacheKey, result: &R) -> Option<Vec<u8>> {
        match codec::encode_value(result) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(key = %key, error = %e, "Result cannot be cached. Returning it uncached.");
                self.store.stats().record_store_failure();
                None
            }
        }
    }

    /// Writes encoded bytes, then enforces capacity. Eviction only follows a
    /// successful write.
    fn install(&self, key: &CacheKey, bytes: &[u8]) {
        if let Err(e) = self.store.put(key, bytes) {
            warn!(key = %key, error = %e, "Failed to write result to cache");
            self.store.stats().record_store_failure();
            return;
        }

        let report = self.enforce();
        if !report.evicted.is_empty() {
            debug!(evicted = report.evicted.len(), remaining = report.remaining, "Eviction pass complete");
        }
    }
}

/// Runs blocking store work on tokio's blocking pool.
///
/// A panic in that work is logged and reads as `None`, like any other cache
/// failure.
async fn off_worker<T, F>(work: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Blocking cache task failed");
            None
        }
    }
}

// == Memoized ==
/// An operation bound to a cache, produced by [`MemoCache::memoize`].
#[derive(Debug, Clone)]
pub struct Memoized<F> {
    cache: MemoCache,
    namespace: Option<String>,
    operation: F,
}

impl<F> Memoized<F> {
    /// Calls the wrapped operation through the cache.
    pub fn call<R, E>(&self, args: &Args) -> std::result::Result<R, E>
    where
        R: Serialize + DeserializeOwned,
        F: Fn(&Args) -> std::result::Result<R, E>,
    {
        self.cache
            .call_in(self.namespace.as_deref(), &self.operation, args)
    }

    pub fn cache(&self) -> &MemoCache {
        &self.cache
    }
}
