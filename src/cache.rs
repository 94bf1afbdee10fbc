//! Access-token cache (C14): a bounded LRU+TTL cache keyed by the SHA-256 hash
//! of the raw token, so a hot path of repeated calls with the same token
//! skips re-parsing, re-verifying, and re-validating it.
//!
//! TTL is derived per-entry from the token's own `exp` claim minus a skew
//! margin, via `moka`'s [`Expiry`] trait rather than a single cache-wide TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::sync::Cache as MokaCache;
use moka::Expiry;
use sha2::{Digest, Sha256};

use crate::counter::SecurityEventCounter;
use crate::error::ValidationEventType;

/// Default maximum number of cached entries. `0` disables caching entirely.
pub const DEFAULT_CAPACITY: u64 = 500;
/// Default margin subtracted from a token's `exp` when computing cache TTL.
pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(10);

/// Cache tunables.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub capacity: u64,
    pub expiry_skew: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            expiry_skew: DEFAULT_EXPIRY_SKEW,
        }
    }
}

#[derive(Clone)]
struct CachedEntry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

struct TokenExpiry;

impl<T: Clone + Send + Sync + 'static> Expiry<String, CachedEntry<T>> for TokenExpiry {
    fn expire_after_create(&self, _key: &String, value: &CachedEntry<T>, _created_at: Instant) -> Option<Duration> {
        let remaining_ms = (value.expires_at - Utc::now()).num_milliseconds();
        Some(Duration::from_millis(remaining_ms.max(0) as u64))
    }
}

/// Hashes the raw compact JWT to a hex digest used as the cache key, so the
/// token itself is never held in the cache's key space.
fn cache_key(raw_token: &str) -> String {
    let digest = Sha256::digest(raw_token.as_bytes());
    hex::encode(digest)
}

/// Bounded, per-entry-TTL cache over validated token content of type `T`.
///
/// `capacity == 0` disables caching: [`get`](AccessTokenCache::get) always
/// misses and [`insert`](AccessTokenCache::insert) is a no-op, each recorded
/// as [`ValidationEventType::CacheDisabled`] rather than silently behaving
/// like an always-empty cache.
pub struct AccessTokenCache<T: Clone + Send + Sync + 'static> {
    inner: Option<MokaCache<String, CachedEntry<T>>>,
    counter: Arc<SecurityEventCounter>,
}

impl<T: Clone + Send + Sync + 'static> AccessTokenCache<T> {
    #[must_use]
    pub fn new(config: CacheConfig, counter: Arc<SecurityEventCounter>) -> Self {
        let inner = if config.capacity == 0 {
            None
        } else {
            Some(
                MokaCache::builder()
                    .max_capacity(config.capacity)
                    .expire_after(TokenExpiry)
                    .build(),
            )
        };
        Self { inner, counter }
    }

    /// Look up cached content for `raw_token`. Records a hit or miss.
    #[must_use]
    pub fn get(&self, raw_token: &str) -> Option<T> {
        let Some(cache) = &self.inner else {
            self.counter.increment(ValidationEventType::CacheDisabled);
            return None;
        };

        let key = cache_key(raw_token);
        match cache.get(&key) {
            Some(entry) => {
                self.counter.increment(ValidationEventType::CacheHit);
                Some(entry.value)
            }
            None => {
                self.counter.increment(ValidationEventType::CacheMiss);
                None
            }
        }
    }

    /// Insert validated content for `raw_token`, expiring at `exp_epoch_seconds`
    /// minus the configured skew. A past or immediately-expiring TTL is
    /// inserted anyway; `moka` reaps it on the next access.
    pub fn insert(&self, raw_token: &str, value: T, exp_epoch_seconds: i64, skew: Duration) {
        let Some(cache) = &self.inner else {
            self.counter.increment(ValidationEventType::CacheDisabled);
            return;
        };

        let skew_secs = i64::try_from(skew.as_secs()).unwrap_or(0);
        let Some(expires_at) = DateTime::<Utc>::from_timestamp(exp_epoch_seconds - skew_secs, 0) else {
            return;
        };

        let key = cache_key(raw_token);
        cache.insert(key, CachedEntry { value, expires_at });
        self.counter.increment(ValidationEventType::CacheInsert);
    }

    /// Number of entries currently tracked (after moka's internal housekeeping runs).
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.as_ref().map_or(0, |c| {
            c.run_pending_tasks();
            c.entry_count()
        })
    }
}
