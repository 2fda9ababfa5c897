//! Cache backend implementations.
//!
//! Backends are dumb byte stores keyed by fully-qualified strings; grouping,
//! namespacing, expiry tiers and flush strategy live in the [`Cache`] facade.
//!
//! - **InMemoryBackend**: sharded in-process map with LRU eviction
//! - **RedisBackend**: networked cache shared between server processes
//!
//! [`Cache`]: super::Cache

use crate::error::{ErrorCode, PulseError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Entry
// ═══════════════════════════════════════════════════════════════════════════════

/// A cached entry with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Serialized value
    pub data: Vec<u8>,

    /// Group the entry was stored under
    pub group: String,

    /// Time-to-live; `None` never expires
    #[serde(with = "duration_serde")]
    pub ttl: Option<Duration>,

    /// When this entry was stored
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(data: Vec<u8>, group: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            data,
            group: group.into(),
            ttl,
            created_at: Utc::now(),
        }
    }

    /// An entry is invisible once `now >= created_at + ttl`.
    pub fn is_expired(&self) -> bool {
        if let Some(ttl) = self.ttl {
            let elapsed = Utc::now()
                .signed_duration_since(self.created_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            elapsed >= ttl
        } else {
            false
        }
    }

    /// Get the remaining TTL.
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.ttl.and_then(|ttl| {
            let elapsed = Utc::now()
                .signed_duration_since(self.created_at)
                .to_std()
                .ok()?;
            ttl.checked_sub(elapsed)
        })
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => (d.as_millis() as u64).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Statistics
// ═══════════════════════════════════════════════════════════════════════════════

/// Cache statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total number of cache hits
    pub hits: u64,

    /// Total number of cache misses
    pub misses: u64,

    /// Total number of entries
    pub entries: u64,

    /// Total size in bytes
    pub size_bytes: u64,

    /// Eviction count
    pub evictions: u64,

    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,

    /// Average entry size in bytes
    pub avg_entry_size: f64,

    /// Backend-specific stats
    pub backend_stats: HashMap<String, String>,
}

impl CacheStats {
    /// Calculate the hit rate.
    pub fn calculate_hit_rate(&mut self) {
        let total = self.hits + self.misses;
        self.hit_rate = if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        };
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Backend Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for cache backends.
///
/// Only per-key operations are mandatory. Backends that can enumerate keys
/// advertise it through [`supports_prefix_flush`](CacheBackend::supports_prefix_flush);
/// the facade falls back to generation counters when they cannot.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a live entry. Expired entries are reported as absent.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Store an entry, overwriting any previous value.
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()>;

    /// Delete an entry. Returns whether something was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Read a persistent integer counter; absent counters read as zero.
    async fn counter(&self, key: &str) -> Result<u64>;

    /// Increment a persistent integer counter and return the new value.
    async fn incr(&self, key: &str) -> Result<u64>;

    /// Whether [`delete_prefix`](CacheBackend::delete_prefix) is available.
    fn supports_prefix_flush(&self) -> bool;

    /// Delete every entry whose key starts with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    /// Get cache statistics.
    async fn stats(&self) -> Result<CacheStats>;

    /// Drop expired entries the backend keeps around. Stores that expire
    /// entries themselves have nothing to do.
    async fn purge_expired(&self) -> Result<u64> {
        Ok(0)
    }

    /// Get the backend name.
    fn name(&self) -> &'static str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for in-memory cache.
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Maximum number of entries
    pub max_capacity: u64,

    /// Evict least-recently-used entries first when full
    pub enable_lru: bool,

    /// Shard count for concurrent access (power of 2)
    pub shard_count: usize,

    /// Advertise prefix deletion. Disabling it makes the backend behave like a
    /// store that only supports per-key deletes.
    pub prefix_flush: bool,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            enable_lru: true,
            shard_count: 16,
            prefix_flush: true,
        }
    }
}

impl InMemoryConfig {
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            max_capacity,
            ..Self::default()
        }
    }

    /// Per-key deletion only.
    pub fn without_prefix_flush(mut self) -> Self {
        self.prefix_flush = false;
        self
    }
}

/// In-process cache backend.
pub struct InMemoryBackend {
    /// Cached entries
    entries: DashMap<String, CacheEntry>,

    /// Persistent counters, never evicted
    counters: DashMap<String, u64>,

    /// LRU order tracking
    lru_order: Mutex<VecDeque<String>>,

    /// Configuration
    config: InMemoryConfig,

    /// Statistics
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    size_bytes: AtomicU64,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

impl InMemoryBackend {
    /// Create a new in-memory backend.
    pub fn new(config: InMemoryConfig) -> Self {
        let shards = config.shard_count.max(2).next_power_of_two();
        Self {
            entries: DashMap::with_shard_amount(shards),
            counters: DashMap::new(),
            lru_order: Mutex::new(VecDeque::with_capacity(config.max_capacity as usize)),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            size_bytes: AtomicU64::new(0),
        }
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_entry(&self, key: &str) -> Option<CacheEntry> {
        let (_, entry) = self.entries.remove(key)?;
        self.size_bytes
            .fetch_sub(entry.data.len() as u64, Ordering::Relaxed);
        Some(entry)
    }

    /// Remove `key` only if the entry stored under it right now is expired.
    /// A concurrent `set` that replaced it is left in place.
    fn remove_if_expired(&self, key: &str) -> bool {
        match self.entries.remove_if(key, |_, entry| entry.is_expired()) {
            Some((_, entry)) => {
                self.size_bytes
                    .fetch_sub(entry.data.len() as u64, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Evict entries if over capacity.
    async fn maybe_evict(&self) {
        if (self.entries.len() as u64) < self.config.max_capacity {
            return;
        }

        let to_evict = (self.config.max_capacity / 10).max(1) as usize;
        let mut evicted = 0;

        if self.config.enable_lru {
            let mut lru = self.lru_order.lock().await;
            while evicted < to_evict {
                let Some(key) = lru.pop_front() else { break };
                if self.remove_entry(&key).is_some() {
                    evicted += 1;
                }
            }
        } else {
            let keys: Vec<_> = self
                .entries
                .iter()
                .take(to_evict)
                .map(|e| e.key().clone())
                .collect();
            for key in keys {
                if self.remove_entry(&key).is_some() {
                    evicted += 1;
                }
            }
        }

        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        counter!("cache_evictions_total").increment(evicted as u64);
        debug!(evicted, "Evicted cache entries");
    }

    /// Move a key to the most-recently-used end.
    async fn touch_lru(&self, key: &str) {
        if self.config.enable_lru {
            let mut lru = self.lru_order.lock().await;
            lru.retain(|k| k != key);
            lru.push_back(key.to_string());
        }
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> u64 {
        let keys_to_remove: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired())
            .map(|e| e.key().clone())
            .collect();

        let mut expired = 0;
        for key in keys_to_remove {
            if self.remove_if_expired(&key) {
                expired += 1;
            }
        }

        if expired > 0 {
            let mut lru = self.lru_order.lock().await;
            lru.retain(|k| self.entries.contains_key(k.as_str()));
            debug!(expired, "Cleaned up expired cache entries");
        }

        expired
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let found = self.entries.get(key).map(|e| e.value().clone());

        match found {
            Some(entry) if entry.is_expired() => {
                self.remove_if_expired(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Some(entry) => {
                self.touch_lru(key).await;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        if !self.entries.contains_key(key) {
            self.maybe_evict().await;
        }

        let size = entry.data.len() as u64;
        if let Some(previous) = self.entries.insert(key.to_string(), entry) {
            self.size_bytes
                .fetch_sub(previous.data.len() as u64, Ordering::Relaxed);
        }
        self.size_bytes.fetch_add(size, Ordering::Relaxed);
        self.touch_lru(key).await;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.remove_entry(key).is_some())
    }

    async fn counter(&self, key: &str) -> Result<u64> {
        Ok(self.counters.get(key).map(|v| *v).unwrap_or(0))
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let mut value = self.counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    fn supports_prefix_flush(&self) -> bool {
        self.config.prefix_flush
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        if !self.config.prefix_flush {
            return Err(PulseError::new(
                ErrorCode::CacheError,
                "Prefix deletion is disabled for this backend",
            ));
        }

        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();

        let mut deleted = 0;
        for key in &keys {
            if self.remove_entry(key).is_some() {
                deleted += 1;
            }
        }
        self.lru_order
            .lock()
            .await
            .retain(|k| !k.starts_with(prefix));

        Ok(deleted)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let entries = self.entries.len() as u64;
        let size_bytes = self.size_bytes.load(Ordering::Relaxed);

        let mut stats = CacheStats {
            hits,
            misses,
            entries,
            size_bytes,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: 0.0,
            avg_entry_size: if entries > 0 {
                size_bytes as f64 / entries as f64
            } else {
                0.0
            },
            backend_stats: HashMap::new(),
        };
        stats.calculate_hit_rate();

        stats
            .backend_stats
            .insert("max_capacity".to_string(), self.config.max_capacity.to_string());
        stats
            .backend_stats
            .insert("prefix_flush".to_string(), self.config.prefix_flush.to_string());

        Ok(stats)
    }

    async fn purge_expired(&self) -> Result<u64> {
        Ok(self.cleanup_expired().await)
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redis Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for Redis cache.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Keys fetched per SCAN round during prefix deletion
    pub scan_count: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            scan_count: 100,
        }
    }
}

/// Redis cache backend.
pub struct RedisBackend {
    conn: redis::aio::ConnectionManager,
    config: RedisConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RedisBackend {
    /// Connect and verify the server answers PING.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            PulseError::with_internal(
                ErrorCode::CacheConnectionFailed,
                "Failed to create Redis client",
                e.to_string(),
            )
        })?;

        let mut conn = redis::aio::ConnectionManager::new(client).await.map_err(|e| {
            PulseError::with_internal(
                ErrorCode::CacheConnectionFailed,
                "Failed to connect to Redis",
                e.to_string(),
            )
        })?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(|e| {
            PulseError::with_internal(
                ErrorCode::CacheConnectionFailed,
                "Redis ping failed",
                e.to_string(),
            )
        })?;

        info!(url = %config.url, "Redis cache backend connected");

        Ok(Self {
            conn,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn conn(&self) -> redis::aio::ConnectionManager {
        self.conn.clone()
    }
}

/// Redis `PX` argument for a TTL: milliseconds rounded up, so Redis never
/// drops a key before the entry's logical expiry. At least 1, since Redis
/// rejects a zero expiry.
fn expiry_millis(ttl: Duration) -> u64 {
    let millis = ttl.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let mut conn = self.conn();
        let data: Option<Vec<u8>> = conn.get(key).await?;

        let entry = match data {
            Some(bytes) => Some(serde_json::from_slice::<CacheEntry>(&bytes)?),
            None => None,
        };

        // Redis expiry has second granularity; the entry's own TTL is authoritative.
        match entry {
            Some(entry) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry))
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let mut conn = self.conn();
        let data = serde_json::to_vec(&entry)?;

        match entry.ttl {
            Some(ttl) => {
                let _: () = redis::cmd("SET")
                    .arg(key)
                    .arg(data)
                    .arg("PX")
                    .arg(expiry_millis(ttl))
                    .query_async(&mut conn)
                    .await?;
            }
            None => conn.set::<_, _, ()>(key, data).await?,
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn();
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn counter(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn();
        let value: Option<u64> = conn.get(key).await?;
        Ok(value.unwrap_or(0))
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn();
        let value: u64 = conn.incr(key, 1u64).await?;
        Ok(value)
    }

    fn supports_prefix_flush(&self) -> bool {
        true
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.conn();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut total_deleted: u64 = 0;

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.config.scan_count)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = conn.del(&keys).await?;
                total_deleted += deleted;
            }

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }

        info!(prefix, deleted = total_deleted, "Deleted Redis keys by prefix");
        Ok(total_deleted)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut conn = self.conn();

        let info: String = redis::cmd("INFO").arg("memory").query_async(&mut conn).await?;
        let mut backend_stats = HashMap::new();
        for line in info.lines() {
            if let Some(value) = line.strip_prefix("used_memory_human:") {
                backend_stats.insert("used_memory_human".to_string(), value.trim().to_string());
            }
        }

        let dbsize: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;

        let mut stats = CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: dbsize,
            backend_stats,
            ..CacheStats::default()
        };
        stats.calculate_hit_rate();

        Ok(stats)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
