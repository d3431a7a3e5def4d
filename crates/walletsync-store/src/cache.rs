//! Time-bound value cache using [`moka`].
//!
//! [`TtlCache`] stores arbitrary JSON-serializable values, each with its own
//! expiration.  Logical keys may be any `Serialize` value; they are combined
//! with the cache's prefix and hashed with SHA-256 (via `ring`) into a fixed
//! length physical key, so `"1"` and `1` never collide.
//!
//! Reading an expired entry behaves exactly like reading a missing one:
//! [`TtlCache::get`] fails with [`StoreError::NotFound`] and
//! [`TtlCache::has`] returns `false`.  Expiration is checked on read; memory
//! stays bounded by the builder's `max_capacity`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use moka::Expiry;
use moka::sync::Cache;
use ring::digest;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::{StoreError, StoreResult};

/// Longest TTL honoured; larger values are clamped.
pub const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

// ── cache stats ──────────────────────────────────────────────────────

/// Counters tracking cache effectiveness.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads that found a live entry.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Reads that found nothing, or only an expired entry.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate between 0.0 and 1.0 (0.0 if nothing was read yet).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            return 0.0;
        }
        self.hits() as f64 / total as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} rate={:.2}%",
            self.hits(),
            self.misses(),
            self.hit_rate() * 100.0,
        )
    }
}

// ── entries ──────────────────────────────────────────────────────────

/// Snapshot of one live cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Physical (hashed) storage key.
    pub key: String,
    pub value: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Stored {
    value: serde_json::Value,
    ttl: Duration,
    expires_at: DateTime<Utc>,
}

impl Stored {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Gives every entry the TTL it was stored with, restarting on overwrite.
struct PerEntryTtl;

impl Expiry<String, Arc<Stored>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<Stored>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<Stored>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

// ── cache ────────────────────────────────────────────────────────────

/// A synchronous key/value cache with per-entry expiration.
///
/// # Example
///
/// ```rust
/// use walletsync_store::TtlCache;
///
/// let cache = TtlCache::builder("delegates").max_capacity(100).build();
/// cache.set(&("ark.mainnet", "delegates"), &vec!["genesis_1"], 60).unwrap();
///
/// let names: Vec<String> = cache.get(&("ark.mainnet", "delegates")).unwrap();
/// assert_eq!(names, vec!["genesis_1"]);
/// assert!(!cache.has("missing"));
/// ```
#[derive(Clone)]
pub struct TtlCache {
    prefix: String,
    default_ttl: u64,
    inner: Cache<String, Arc<Stored>>,
    stats: Arc<CacheStats>,
}

impl TtlCache {
    /// Start building a cache whose physical keys are namespaced by `prefix`.
    pub fn builder(prefix: impl Into<String>) -> TtlCacheBuilder {
        let defaults = CacheConfig::default();
        TtlCacheBuilder {
            prefix: prefix.into(),
            max_capacity: defaults.max_capacity,
            default_ttl_seconds: defaults.default_ttl_seconds,
        }
    }

    /// Build a cache from validated configuration.
    pub fn from_config(config: &CacheConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self::builder(config.prefix.clone())
            .max_capacity(config.max_capacity)
            .default_ttl_seconds(config.default_ttl_seconds)
            .build())
    }

    /// Derive the physical storage key for a logical key.
    ///
    /// `base64url(SHA-256(prefix ":" json(key)))`, always 43 characters.
    pub fn storage_key<K: Serialize + ?Sized>(&self, key: &K) -> StoreResult<String> {
        let logical = serde_json::to_vec(key)?;
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(self.prefix.as_bytes());
        ctx.update(b":");
        ctx.update(&logical);
        Ok(URL_SAFE_NO_PAD.encode(ctx.finish().as_ref()))
    }

    /// Store `value` under `key` for `ttl_seconds`, replacing any previous
    /// entry and restarting its expiration.
    pub fn set<K, V>(&self, key: &K, value: &V, ttl_seconds: u64) -> StoreResult<()>
    where
        K: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        let physical = self.storage_key(key)?;
        let value = serde_json::to_value(value)?;
        let ttl_seconds = ttl_seconds.min(MAX_TTL_SECONDS);
        let ttl = Duration::from_secs(ttl_seconds);
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.inner.insert(
            physical.clone(),
            Arc::new(Stored {
                value,
                ttl,
                expires_at,
            }),
        );
        debug!(prefix = %self.prefix, key = %physical, ttl_seconds, "cache set");
        Ok(())
    }

    /// [`set`](Self::set) with the cache's default TTL.
    pub fn put<K, V>(&self, key: &K, value: &V) -> StoreResult<()>
    where
        K: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        self.set(key, value, self.default_ttl)
    }

    /// Fetch and deserialize a live entry.
    ///
    /// Fails with [`StoreError::NotFound`] when the key is missing or
    /// expired; never substitutes a default.
    pub fn get<T, K>(&self, key: &K) -> StoreResult<T>
    where
        T: DeserializeOwned,
        K: Serialize + ?Sized,
    {
        let physical = self.storage_key(key)?;
        match self.live(&physical) {
            Some(stored) => {
                self.stats.record_hit();
                debug!(prefix = %self.prefix, key = %physical, "cache hit");
                Ok(T::deserialize(&stored.value)?)
            }
            None => {
                self.stats.record_miss();
                debug!(prefix = %self.prefix, key = %physical, "cache miss");
                Err(StoreError::NotFound {
                    entity: "cache entry",
                    id: physical,
                })
            }
        }
    }

    /// `true` iff the key holds an unexpired entry.
    ///
    /// Keys that cannot be serialized are never present.
    pub fn has<K: Serialize + ?Sized>(&self, key: &K) -> bool {
        self.storage_key(key)
            .map(|physical| self.live(&physical).is_some())
            .unwrap_or(false)
    }

    /// Remove the entry for `key`.  Absent keys are not an error.
    pub fn forget<K: Serialize + ?Sized>(&self, key: &K) -> StoreResult<()> {
        let physical = self.storage_key(key)?;
        self.inner.invalidate(&physical);
        debug!(prefix = %self.prefix, key = %physical, "cache forget");
        Ok(())
    }

    /// Remove every entry.
    pub fn flush(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
        debug!(prefix = %self.prefix, "cache flush");
    }

    /// Return the cached value for `key`, or compute it with `loader`, store
    /// it for `ttl_seconds`, and return it.
    pub fn remember<T, K, F>(&self, key: &K, ttl_seconds: u64, loader: F) -> StoreResult<T>
    where
        T: Serialize + DeserializeOwned,
        K: Serialize + ?Sized,
        F: FnOnce() -> StoreResult<T>,
    {
        match self.get(key) {
            Ok(value) => Ok(value),
            Err(StoreError::NotFound { .. }) => {
                let value = loader()?;
                self.set(key, &value, ttl_seconds)?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }

    /// Every live entry, keyed by physical key.
    pub fn all(&self) -> BTreeMap<String, serde_json::Value> {
        self.entries()
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect()
    }

    /// Physical keys of every live entry, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.all().into_keys().collect()
    }

    /// Snapshots of every live entry, sorted by key.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let now = Utc::now();
        let mut entries: Vec<CacheEntry> = self
            .inner
            .iter()
            .filter(|(_, stored)| !stored.is_expired(now))
            .map(|(key, stored)| CacheEntry {
                key: key.as_ref().clone(),
                value: stored.value.clone(),
                expires_at: stored.expires_at,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn live(&self, physical: &str) -> Option<Arc<Stored>> {
        let stored = self.inner.get(physical)?;
        if stored.is_expired(Utc::now()) {
            self.inner.invalidate(physical);
            return None;
        }
        Some(stored)
    }
}

impl fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("prefix", &self.prefix)
            .field("default_ttl", &self.default_ttl)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

// ── builder ──────────────────────────────────────────────────────────

/// Builder for [`TtlCache`].
pub struct TtlCacheBuilder {
    prefix: String,
    max_capacity: u64,
    default_ttl_seconds: u64,
}

impl TtlCacheBuilder {
    /// Maximum number of entries the cache will hold.
    pub fn max_capacity(mut self, cap: u64) -> Self {
        self.max_capacity = cap;
        self
    }

    /// TTL used by [`TtlCache::put`].
    pub fn default_ttl_seconds(mut self, secs: u64) -> Self {
        self.default_ttl_seconds = secs;
        self
    }

    pub fn build(self) -> TtlCache {
        let inner = Cache::builder()
            .max_capacity(self.max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        debug!(
            prefix = %self.prefix,
            max_capacity = self.max_capacity,
            default_ttl_seconds = self.default_ttl_seconds,
            "ttl cache created"
        );

        TtlCache {
            prefix: self.prefix,
            default_ttl: self.default_ttl_seconds.min(MAX_TTL_SECONDS),
            inner,
            stats: Arc::new(CacheStats::default()),
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
