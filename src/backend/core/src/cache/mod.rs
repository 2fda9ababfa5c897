//! Caching layer for CoursePulse.
//!
//! - **Backend Abstraction**: pluggable byte stores (in-memory, Redis)
//! - **Groups and Tiers**: keys carry a group; callers pick an expiry tier
//! - **Read-through**: [`Cache::get_or_compute`] wraps any async generator
//! - **Bulk Flush**: prefix deletion where the backend supports it, otherwise
//!   a namespace generation bump that orphans every existing key
//! - **List Versions**: per-partition version stamps ([`version`])
//!
//! # Architecture
//!
//! ```text
//!   StatsService / InvalidationTriggers
//!                  │
//!                  ▼
//!   ┌──────────────────────────────┐
//!   │ Cache (namespace, generation,│
//!   │ tiers, Lookup, absorb errors)│
//!   └──────────────┬───────────────┘
//!                  ▼
//!        CacheBackend trait
//!         │               │
//!         ▼               ▼
//!   InMemoryBackend   RedisBackend
//! ```
//!
//! The facade never returns backend failures: a failed read is a miss, a
//! failed write or delete is logged and dropped.
//!
//! # Usage
//!
//! ```rust,ignore
//! use coursepulse_core::cache::{Cache, CacheKey, ExpiryTier, Lookup};
//!
//! let cache = Cache::in_memory(10_000);
//! let key = CacheKey::course_stats(CourseId(42));
//!
//! cache.set(&key, &snapshot, ExpiryTier::Default).await;
//! if let Lookup::Found(snapshot) = cache.get::<Option<CourseStatsSnapshot>>(&key).await {
//!     // ...
//! }
//! cache.flush_all().await;
//! ```

pub mod backend;
pub mod key;
pub mod version;

pub use backend::{
    CacheBackend, CacheEntry, CacheStats, InMemoryBackend, InMemoryConfig, RedisBackend,
    RedisConfig,
};
pub use key::{CacheGroup, CacheKey, ExpiryTier};
pub use version::ListVersions;

use crate::config::{BackendKind, CacheSettings, TierSettings};
use crate::error::Result;
use metrics::{counter, gauge};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Lookup Result
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of a cache read.
///
/// `Found` carries whatever was stored, including `None`, `false`, `0` or an
/// empty list. Only `NotFound` means there is no usable entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }
}

/// Which strategy [`Cache::flush_all`] ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Keys under the namespace were deleted.
    Prefix,
    /// The namespace generation was bumped; old keys are unreachable.
    Generation,
    /// Neither strategy succeeded.
    Failed,
}

impl FlushMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::Generation => "generation",
            Self::Failed => "failed",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Main cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Namespace every key is stored under
    pub namespace: String,

    /// Durations for each expiry tier
    pub tiers: TierSettings,

    /// Values serializing larger than this are not stored
    pub max_entry_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "coursepulse".to_string(),
            tiers: TierSettings::default(),
            max_entry_size: 1024 * 1024,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration builder.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

/// Builder for cache configuration.
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn tiers(mut self, tiers: TierSettings) -> Self {
        self.config.tiers = tiers;
        self
    }

    pub fn tier(mut self, tier: ExpiryTier, duration: Duration) -> Self {
        match tier {
            ExpiryTier::Short => self.config.tiers.short = duration,
            ExpiryTier::Default => self.config.tiers.default = duration,
            ExpiryTier::Long => self.config.tiers.long = duration,
        }
        self
    }

    pub fn max_entry_size(mut self, size: usize) -> Self {
        self.config.max_entry_size = size;
        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Cache Interface
// ═══════════════════════════════════════════════════════════════════════════════

/// Namespaced, group-aware cache over a pluggable backend.
///
/// Cloning is cheap and clones share the backend.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    config: Arc<CacheConfig>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.backend.name())
            .field("namespace", &self.config.namespace)
            .finish()
    }
}

impl Cache {
    /// Create a new cache with the given backend.
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
        }
    }

    /// Create an in-memory cache with default tiers.
    pub fn in_memory(max_capacity: u64) -> Self {
        let backend = Arc::new(InMemoryBackend::new(InMemoryConfig::with_capacity(
            max_capacity,
        )));
        Self::new(backend, CacheConfig::default())
    }

    /// Create a Redis-backed cache with default tiers.
    pub async fn redis(url: &str) -> Result<Self> {
        let backend = Arc::new(
            RedisBackend::new(RedisConfig {
                url: url.to_string(),
                ..Default::default()
            })
            .await?,
        );
        Ok(Self::new(backend, CacheConfig::default()))
    }

    /// Build the cache described by the `[cache]` configuration section.
    pub async fn from_settings(settings: &CacheSettings) -> Result<Self> {
        let backend: Arc<dyn CacheBackend> = match settings.backend {
            BackendKind::Memory => Arc::new(InMemoryBackend::new(InMemoryConfig::with_capacity(
                settings.max_entries as u64,
            ))),
            BackendKind::Redis => Arc::new(
                RedisBackend::new(RedisConfig {
                    url: settings.redis_url.clone(),
                    ..Default::default()
                })
                .await?,
            ),
        };

        let config = CacheConfig::builder()
            .namespace(settings.namespace.clone())
            .tiers(settings.tiers)
            .build();

        info!(
            backend = backend.name(),
            namespace = %config.namespace,
            "Cache initialized"
        );
        Ok(Self::new(backend, config))
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Duration configured for a tier.
    pub fn tier_duration(&self, tier: ExpiryTier) -> Duration {
        self.config.tiers.duration(tier)
    }

    fn generation_key(&self) -> String {
        format!("{}#generation", self.config.namespace)
    }

    /// Current namespace generation. Zero until the first generation flush.
    pub async fn generation(&self) -> Result<u64> {
        self.backend.counter(&self.generation_key()).await
    }

    async fn full_key(&self, key: &CacheKey) -> Result<String> {
        let generation = self.generation().await?;
        Ok(format!(
            "{}:{}:{}",
            self.config.namespace,
            generation,
            key.build()
        ))
    }

    /// Read a value.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Lookup<T> {
        let group = key.group().as_str().to_string();

        let entry = match self.full_key(key).await {
            Ok(full_key) => self.backend.get(&full_key).await,
            Err(e) => Err(e),
        };

        match entry {
            Ok(Some(entry)) => match serde_json::from_slice::<T>(&entry.data) {
                Ok(value) => {
                    counter!("cache_hits_total", "group" => group).increment(1);
                    debug!("Cache hit");
                    Lookup::Found(value)
                }
                Err(e) => {
                    counter!("cache_misses_total", "group" => group, "reason" => "decode_error")
                        .increment(1);
                    warn!(error = %e, "Cached value could not be decoded, treating as miss");
                    Lookup::NotFound
                }
            },
            Ok(None) => {
                counter!("cache_misses_total", "group" => group, "reason" => "absent").increment(1);
                debug!("Cache miss");
                Lookup::NotFound
            }
            Err(e) => {
                counter!("cache_misses_total", "group" => group, "reason" => "backend_error")
                    .increment(1);
                counter!("cache_backend_errors_total", "op" => "get").increment(1);
                warn!(error = %e, "Cache read failed, treating as miss");
                Lookup::NotFound
            }
        }
    }

    /// Store a value for the tier's duration. Overwrites silently.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T, tier: ExpiryTier) {
        self.set_with_ttl(key, value, self.tier_duration(tier)).await
    }

    /// Store a value with an explicit TTL.
    #[instrument(skip(self, value), fields(key = %key, ttl_ms = ttl.as_millis() as u64))]
    pub async fn set_with_ttl<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let data = match serde_json::to_vec(value) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Value could not be serialized, not cached");
                return;
            }
        };

        if data.len() > self.config.max_entry_size {
            warn!(
                size = data.len(),
                max = self.config.max_entry_size,
                "Value exceeds maximum entry size, not cached"
            );
            return;
        }

        let entry = CacheEntry::new(data, key.group().as_str(), Some(ttl));
        let result = match self.full_key(key).await {
            Ok(full_key) => self.backend.set(&full_key, entry).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                counter!("cache_sets_total", "group" => key.group().as_str().to_string())
                    .increment(1);
                debug!("Cache set");
            }
            Err(e) => {
                counter!("cache_backend_errors_total", "op" => "set").increment(1);
                warn!(error = %e, "Cache write failed");
            }
        }
    }

    /// Remove a key. Idempotent; returns whether an entry was removed.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn delete(&self, key: &CacheKey) -> bool {
        let result = match self.full_key(key).await {
            Ok(full_key) => self.backend.delete(&full_key).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(deleted) => {
                counter!("cache_deletes_total", "group" => key.group().as_str().to_string())
                    .increment(1);
                debug!(deleted, "Cache delete");
                deleted
            }
            Err(e) => {
                counter!("cache_backend_errors_total", "op" => "delete").increment(1);
                warn!(error = %e, "Cache delete failed");
                false
            }
        }
    }

    /// Invalidate every entry under this namespace.
    ///
    /// Other namespaces on the same backend are untouched.
    #[instrument(skip(self), fields(namespace = %self.config.namespace))]
    pub async fn flush_all(&self) -> FlushMode {
        if self.backend.supports_prefix_flush() {
            let prefix = format!("{}:", self.config.namespace);
            match self.backend.delete_prefix(&prefix).await {
                Ok(removed) => {
                    counter!("cache_flushes_total", "mode" => "prefix").increment(1);
                    info!(removed, "Cache namespace flushed by prefix");
                    return FlushMode::Prefix;
                }
                Err(e) => {
                    counter!("cache_backend_errors_total", "op" => "delete_prefix").increment(1);
                    warn!(error = %e, "Prefix flush failed, falling back to generation bump");
                }
            }
        }

        match self.backend.incr(&self.generation_key()).await {
            Ok(generation) => {
                counter!("cache_flushes_total", "mode" => "generation").increment(1);
                gauge!("cache_generation").set(generation as f64);
                info!(generation, "Cache namespace flushed by generation bump");
                FlushMode::Generation
            }
            Err(e) => {
                counter!("cache_backend_errors_total", "op" => "incr").increment(1);
                warn!(error = %e, "Cache flush failed");
                FlushMode::Failed
            }
        }
    }

    /// Read-through: return the cached value or compute, store and return it.
    ///
    /// Concurrent misses may each compute and overwrite; generators must be
    /// idempotent. A generator error is returned and nothing is stored.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &CacheKey,
        tier: ExpiryTier,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.get_or_compute_if(key, tier, compute, |_| true).await
    }

    /// Like [`get_or_compute`](Self::get_or_compute), but only values for
    /// which `should_store` returns true are written back.
    #[instrument(skip(self, compute, should_store), fields(key = %key, tier = tier.as_str()))]
    pub async fn get_or_compute_if<T, F, Fut, P>(
        &self,
        key: &CacheKey,
        tier: ExpiryTier,
        compute: F,
        should_store: P,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnOnce(&T) -> bool,
    {
        if let Lookup::Found(value) = self.get(key).await {
            return Ok(value);
        }

        let value = compute().await?;
        if should_store(&value) {
            self.set(key, &value, tier).await;
        }
        Ok(value)
    }

    /// Sweep expired entries out of the backend. Errors are logged.
    pub async fn purge_expired(&self) -> u64 {
        match self.backend.purge_expired().await {
            Ok(purged) => purged,
            Err(e) => {
                counter!("cache_backend_errors_total", "op" => "purge").increment(1);
                warn!(error = %e, "Expired-entry sweep failed");
                0
            }
        }
    }

    /// Backend statistics annotated with namespace and generation.
    pub async fn stats(&self) -> Result<CacheStats> {
        let mut stats = self.backend.stats().await?;
        stats
            .backend_stats
            .insert("backend".to_string(), self.backend.name().to_string());
        stats
            .backend_stats
            .insert("namespace".to_string(), self.config.namespace.clone());
        if let Ok(generation) = self.generation().await {
            stats
                .backend_stats
                .insert("generation".to_string(), generation.to_string());
        }
        Ok(stats)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, PulseError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn key(id: u32) -> CacheKey {
        CacheKey::new(CacheGroup::Custom("test".into())).with_segment(id)
    }

    fn shared_backend(prefix_flush: bool) -> Arc<InMemoryBackend> {
        let config = if prefix_flush {
            InMemoryConfig::default()
        } else {
            InMemoryConfig::default().without_prefix_flush()
        };
        Arc::new(InMemoryBackend::new(config))
    }

    fn cache_on(backend: Arc<InMemoryBackend>, namespace: &str) -> Cache {
        Cache::new(backend, CacheConfig::builder().namespace(namespace).build())
    }

    /// Backend whose every operation fails.
    struct BrokenBackend;

    fn broken() -> PulseError {
        PulseError::new(ErrorCode::CacheConnectionFailed, "backend down")
    }

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
            Err(broken())
        }
        async fn set(&self, _key: &str, _entry: CacheEntry) -> Result<()> {
            Err(broken())
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(broken())
        }
        async fn counter(&self, _key: &str) -> Result<u64> {
            Err(broken())
        }
        async fn incr(&self, _key: &str) -> Result<u64> {
            Err(broken())
        }
        fn supports_prefix_flush(&self) -> bool {
            true
        }
        async fn delete_prefix(&self, _prefix: &str) -> Result<u64> {
            Err(broken())
        }
        async fn stats(&self) -> Result<CacheStats> {
            Err(broken())
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = Cache::in_memory(100);

        cache.set(&key(1), &"hello".to_string(), ExpiryTier::Default).await;
        assert_eq!(cache.get::<String>(&key(1)).await, Lookup::Found("hello".to_string()));

        assert!(cache.delete(&key(1)).await);
        assert_eq!(cache.get::<String>(&key(1)).await, Lookup::NotFound);
        // idempotent
        assert!(!cache.delete(&key(1)).await);
    }

    #[tokio::test]
    async fn test_falsy_values_are_found() {
        let cache = Cache::in_memory(100);

        cache.set(&key(1), &false, ExpiryTier::Default).await;
        cache.set(&key(2), &0u64, ExpiryTier::Default).await;
        cache.set(&key(3), &Option::<u64>::None, ExpiryTier::Default).await;
        cache.set(&key(4), &Vec::<u64>::new(), ExpiryTier::Default).await;

        assert_eq!(cache.get::<bool>(&key(1)).await, Lookup::Found(false));
        assert_eq!(cache.get::<u64>(&key(2)).await, Lookup::Found(0));
        assert_eq!(cache.get::<Option<u64>>(&key(3)).await, Lookup::Found(None));
        assert_eq!(cache.get::<Vec<u64>>(&key(4)).await, Lookup::Found(vec![]));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = Cache::new(
            Arc::new(InMemoryBackend::default()),
            CacheConfig::builder()
                .tier(ExpiryTier::Short, Duration::from_millis(30))
                .build(),
        );

        cache.set(&key(1), &7u32, ExpiryTier::Short).await;
        assert!(cache.get::<u32>(&key(1)).await.is_found());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get::<u32>(&key(1)).await, Lookup::NotFound);
    }

    #[tokio::test]
    async fn test_get_or_compute_caches() {
        let cache = Cache::in_memory(100);
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let value: u32 = cache
                .get_or_compute(&key(1), ExpiryTier::Default, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_error_not_cached() {
        let cache = Cache::in_memory(100);
        let calls = AtomicU32::new(0);

        let result: Result<u32> = cache
            .get_or_compute(&key(1), ExpiryTier::Default, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PulseError::internal("store unavailable"))
            })
            .await;
        assert!(result.is_err());

        let value: u32 = cache
            .get_or_compute(&key(1), ExpiryTier::Default, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(5)
            })
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_or_compute_if_skips_store() {
        let cache = Cache::in_memory(100);

        let value: Option<u32> = cache
            .get_or_compute_if(&key(1), ExpiryTier::Default, || async { Ok(None) }, |v| {
                v.is_some()
            })
            .await
            .unwrap();
        assert_eq!(value, None);
        assert_eq!(cache.get::<Option<u32>>(&key(1)).await, Lookup::NotFound);
    }

    #[tokio::test]
    async fn test_flush_all_by_prefix() {
        let backend = shared_backend(true);
        let cache = cache_on(backend.clone(), "coursepulse");
        let other = cache_on(backend.clone(), "gradebook");

        cache.set(&key(1), &1u32, ExpiryTier::Default).await;
        cache.set(&CacheKey::overview(), &2u32, ExpiryTier::Long).await;
        other.set(&key(1), &3u32, ExpiryTier::Default).await;

        assert_eq!(cache.flush_all().await, FlushMode::Prefix);

        assert_eq!(cache.get::<u32>(&key(1)).await, Lookup::NotFound);
        assert_eq!(cache.get::<u32>(&CacheKey::overview()).await, Lookup::NotFound);
        assert_eq!(other.get::<u32>(&key(1)).await, Lookup::Found(3));
        assert_eq!(cache.generation().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_flush_all_by_generation() {
        let backend = shared_backend(false);
        let cache = cache_on(backend.clone(), "coursepulse");
        let other = cache_on(backend.clone(), "gradebook");

        cache.set(&key(1), &1u32, ExpiryTier::Default).await;
        other.set(&key(1), &3u32, ExpiryTier::Default).await;

        assert_eq!(cache.flush_all().await, FlushMode::Generation);
        assert_eq!(cache.generation().await.unwrap(), 1);

        assert_eq!(cache.get::<u32>(&key(1)).await, Lookup::NotFound);
        assert_eq!(other.get::<u32>(&key(1)).await, Lookup::Found(3));

        // new writes land in the new generation
        cache.set(&key(1), &9u32, ExpiryTier::Default).await;
        assert_eq!(cache.get::<u32>(&key(1)).await, Lookup::Found(9));
    }

    #[tokio::test]
    async fn test_broken_backend_degrades_to_miss() {
        let cache = Cache::new(Arc::new(BrokenBackend), CacheConfig::default());

        cache.set(&key(1), &1u32, ExpiryTier::Default).await;
        assert_eq!(cache.get::<u32>(&key(1)).await, Lookup::NotFound);
        assert!(!cache.delete(&key(1)).await);
        assert_eq!(cache.flush_all().await, FlushMode::Failed);

        let value: u32 = cache
            .get_or_compute(&key(1), ExpiryTier::Default, || async { Ok(11) })
            .await
            .unwrap();
        assert_eq!(value, 11);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_miss() {
        let cache = Cache::in_memory(100);
        cache.set(&key(1), &"not a number", ExpiryTier::Default).await;
        assert_eq!(cache.get::<u32>(&key(1)).await, Lookup::NotFound);
    }

    #[tokio::test]
    async fn test_oversized_value_not_stored() {
        let cache = Cache::new(
            Arc::new(InMemoryBackend::default()),
            CacheConfig::builder().max_entry_size(8).build(),
        );
        cache
            .set(&key(1), &"a string that is far too long", ExpiryTier::Default)
            .await;
        assert_eq!(cache.get::<String>(&key(1)).await, Lookup::NotFound);
    }

    #[tokio::test]
    async fn test_stats_annotated() {
        let cache = Cache::in_memory(100);
        cache.set(&key(1), &1u32, ExpiryTier::Default).await;
        let _ = cache.get::<u32>(&key(1)).await;

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.backend_stats.get("namespace").map(String::as_str), Some("coursepulse"));
        assert_eq!(stats.backend_stats.get("generation").map(String::as_str), Some("0"));
    }
}
