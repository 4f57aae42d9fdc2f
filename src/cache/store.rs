//! Bounded, cost-aware entry store.
//!
//! Backed by [`moka::future::Cache`]: admission is TinyLFU (a frequency sketch
//! decides whether a newcomer is worth evicting a resident), eviction is
//! approximate LRU, and the bound is on total weight rather than entry count.
//! Housekeeping is amortized over reads and writes behind short critical
//! sections, so callers never wait on a global lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use tracing::{debug, info};

use super::config::{CacheConfig, CacheError, validate_sizing};
use super::entry::CacheEntry;

#[derive(Clone)]
struct Stored {
    entry: Arc<CacheEntry>,
    cost: u32,
    ttl: Option<Duration>,
}

// Per-entry TTL: an insert or overwrite restarts the clock with the new ttl.
struct PerEntryTtl;

impl Expiry<String, Stored> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Stored, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Stored,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Concurrent key → [`CacheEntry`] map bounded by total cost.
///
/// Cloning is cheap and every clone shares the same entries. A store built
/// from a disabled configuration behaves as an always-empty store: `get`
/// misses and `put` is silently dropped.
///
/// # Examples
///
/// ```
/// use std::{sync::Arc, time::{Duration, SystemTime}};
/// use render_cache::cache::{CacheEntry, CacheStore};
/// use render_cache::http::{Headers, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = CacheStore::configure(1_000_000, 10_000, 64).unwrap();
/// let entry = Arc::new(CacheEntry::new(
///     StatusCode::Ok,
///     Headers::new(),
///     b"hello".to_vec(),
///     "\"v1\"".to_owned(),
///     SystemTime::now(),
///     0,
/// ));
///
/// store.put("/hello".to_owned(), entry.clone(), entry.cost(), Duration::ZERO).await;
/// assert_eq!(store.get("/hello").await, Some(entry));
/// # }
/// ```
#[derive(Clone)]
pub struct CacheStore {
    inner: Option<Cache<String, Stored>>,
}

impl CacheStore {
    /// Build an enabled store.
    ///
    /// - `max_cost` — total weight retained before eviction kicks in.
    /// - `num_counters` — expected number of distinct keys tracked for admission;
    ///   about a tenth of it is pre-allocated.
    /// - `buffer_items` — access buffer size; validated only, moka sizes its own
    ///   buffers.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidConfig`] when any parameter is zero or out of range.
    pub fn configure(max_cost: u64, num_counters: u64, buffer_items: usize) -> Result<Self, CacheError> {
        validate_sizing(max_cost, num_counters, buffer_items)?;

        let initial_capacity = usize::try_from(num_counters / 10).unwrap_or(usize::MAX);
        let cache = Cache::builder()
            .name("render-cache")
            .max_capacity(max_cost)
            .initial_capacity(initial_capacity)
            .weigher(|_key: &String, value: &Stored| value.cost)
            .expire_after(PerEntryTtl)
            .build();

        info!(max_cost, num_counters, buffer_items, "response cache configured");
        Ok(Self { inner: Some(cache) })
    }

    /// Build a store from configuration, honoring `enable`.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidConfig`] when enabled with invalid sizing.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        if !config.enable {
            info!("response cache disabled");
            return Ok(Self::disabled());
        }
        Self::configure(config.max_cost, config.num_counters, config.buffer_items)
    }

    /// A store that never retains anything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Look up `key`. Absent, expired, and purged keys all miss.
    pub async fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let cache = self.inner.as_ref()?;
        cache.get(key).await.map(|stored| stored.entry)
    }

    /// Offer `entry` to the store under `key`.
    ///
    /// A zero `ttl` means no automatic expiry; the entry may still be evicted
    /// for space, and admission may reject it outright when the store is full
    /// of hotter entries.
    pub async fn put(&self, key: String, entry: Arc<CacheEntry>, cost: u32, ttl: Duration) {
        let Some(cache) = &self.inner else {
            return;
        };
        let ttl = (!ttl.is_zero()).then_some(ttl);
        debug!(key = %key, cost, ttl = ?ttl, "cache put");
        cache.insert(key, Stored { entry, cost, ttl }).await;
    }

    /// Drop `key` if present.
    pub async fn remove(&self, key: &str) {
        if let Some(cache) = &self.inner {
            cache.invalidate(key).await;
        }
    }

    /// Drop every entry. Takes effect for all subsequent lookups immediately.
    pub fn clear(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
            info!("response cache purged");
        }
    }

    /// Total weight currently retained, as of the last housekeeping pass.
    pub fn weighted_size(&self) -> u64 {
        self.inner.as_ref().map_or(0, |cache| cache.weighted_size())
    }

    /// Number of entries, as of the last housekeeping pass.
    pub fn entry_count(&self) -> u64 {
        self.inner.as_ref().map_or(0, |cache| cache.entry_count())
    }

    /// Flush pending admissions, evictions, and expirations.
    pub async fn run_pending_tasks(&self) {
        if let Some(cache) = &self.inner {
            cache.run_pending_tasks().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::http::{Headers, StatusCode};

    fn entry(body_len: usize) -> Arc<CacheEntry> {
        Arc::new(CacheEntry::new(
            StatusCode::Ok,
            Headers::new(),
            vec![b'x'; body_len],
            "\"v\"".to_owned(),
            SystemTime::now(),
            0,
        ))
    }

    async fn put(store: &CacheStore, key: &str, entry: Arc<CacheEntry>, ttl: Duration) {
        let cost = entry.cost();
        store.put(key.to_owned(), entry, cost, ttl).await;
    }

    // ── basic operations ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn get_missing_key_misses() {
        let store = CacheStore::configure(10_000, 100, 64).unwrap();
        assert!(store.get("/nope").await.is_none());
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = CacheStore::configure(10_000, 100, 64).unwrap();
        let e = entry(10);
        put(&store, "/a", e.clone(), Duration::ZERO).await;
        assert_eq!(store.get("/a").await, Some(e));
    }

    #[tokio::test]
    async fn overwrite_replaces_entry() {
        let store = CacheStore::configure(10_000, 100, 64).unwrap();
        put(&store, "/a", entry(10), Duration::ZERO).await;
        let replacement = entry(20);
        put(&store, "/a", replacement.clone(), Duration::ZERO).await;
        assert_eq!(store.get("/a").await, Some(replacement));
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let store = CacheStore::configure(10_000, 100, 64).unwrap();
        put(&store, "/a", entry(10), Duration::ZERO).await;
        put(&store, "/b", entry(10), Duration::ZERO).await;
        store.clear();
        assert!(store.get("/a").await.is_none());
        assert!(store.get("/b").await.is_none());
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let store = CacheStore::configure(10_000, 100, 64).unwrap();
        let other = store.clone();
        put(&store, "/a", entry(10), Duration::ZERO).await;
        assert!(other.get("/a").await.is_some());
    }

    // ── disabled mode ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn disabled_store_always_misses() {
        let store = CacheStore::from_config(&CacheConfig::disabled()).unwrap();
        assert!(!store.is_enabled());
        put(&store, "/a", entry(10), Duration::ZERO).await;
        assert!(store.get("/a").await.is_none());
        store.clear();
        store.run_pending_tasks().await;
        assert_eq!(store.weighted_size(), 0);
    }

    #[test]
    fn invalid_sizing_is_fatal() {
        assert!(CacheStore::configure(0, 100, 64).is_err());
        assert!(CacheStore::configure(100, 0, 64).is_err());
        assert!(CacheStore::configure(100, 100, 0).is_err());
    }

    // ── expiry and bounds ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn ttl_entry_expires() {
        let store = CacheStore::configure(10_000, 100, 64).unwrap();
        put(&store, "/short", entry(10), Duration::from_secs(1)).await;
        put(&store, "/forever", entry(10), Duration::ZERO).await;
        assert!(store.get("/short").await.is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(store.get("/short").await.is_none());
        assert!(store.get("/forever").await.is_some());
    }

    #[tokio::test]
    async fn total_cost_stays_bounded() {
        let max_cost = 10_000;
        let store = CacheStore::configure(max_cost, 1_000, 64).unwrap();
        for i in 0..500 {
            put(&store, &format!("/post/{i}"), entry(100), Duration::ZERO).await;
        }
        store.run_pending_tasks().await;

        assert!(store.weighted_size() <= max_cost);
        assert!(store.entry_count() <= max_cost / 100);
    }

    #[tokio::test]
    async fn frequently_read_entry_survives_cold_inserts() {
        let store = CacheStore::configure(10_000, 1_000, 64).unwrap();
        for i in 0..100 {
            put(&store, &format!("/cold/{i}"), entry(100), Duration::ZERO).await;
        }
        store.run_pending_tasks().await;

        // Build up frequency for the hot key before and after it is admitted.
        for _ in 0..20 {
            let _ = store.get("/hot").await;
        }
        store.run_pending_tasks().await;
        put(&store, "/hot", entry(100), Duration::ZERO).await;
        store.run_pending_tasks().await;
        for _ in 0..20 {
            let _ = store.get("/hot").await;
        }
        store.run_pending_tasks().await;

        for i in 100..300 {
            put(&store, &format!("/cold/{i}"), entry(100), Duration::ZERO).await;
        }
        store.run_pending_tasks().await;

        assert!(store.get("/hot").await.is_some());
        assert!(store.weighted_size() <= 10_000);
    }
}
