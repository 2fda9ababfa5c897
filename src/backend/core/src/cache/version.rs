//! Course-list version stamps.
//!
//! Which courses appear in a list cannot be invalidated key by key, so each
//! [`ListPartition`] carries a millisecond version stamp that list keys embed.
//! Bumping the stamp makes every previously cached list for that partition
//! unreachable; the orphaned entries expire on their own.
//!
//! A stamp lives for the retention window. Once it has expired the next read
//! regenerates it as "now", which also retires any list cached under the old
//! stamp.

use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tracing::{debug, instrument};

use super::{Cache, CacheKey, Lookup};
use crate::stats::model::ListPartition;

#[derive(Debug, Clone)]
pub struct ListVersions {
    cache: Cache,
    retention: Duration,
}

impl ListVersions {
    pub fn new(cache: Cache, retention: Duration) -> Self {
        Self { cache, retention }
    }

    /// Current stamp for a partition, regenerating it when absent or stale.
    #[instrument(skip(self), fields(partition = %partition))]
    pub async fn current(&self, partition: &ListPartition) -> i64 {
        let key = CacheKey::list_version(partition);
        match self.cache.get::<i64>(&key).await {
            Lookup::Found(version) => version,
            Lookup::NotFound => {
                let version = now_millis();
                self.cache.set_with_ttl(&key, &version, self.retention).await;
                debug!(version, "List version regenerated");
                version
            }
        }
    }

    /// Advance a partition's stamp. Strictly increasing even when called
    /// twice within the same millisecond.
    #[instrument(skip(self), fields(partition = %partition))]
    pub async fn bump(&self, partition: &ListPartition) -> i64 {
        let key = CacheKey::list_version(partition);
        let previous = self.cache.get::<i64>(&key).await.into_option();

        let now = now_millis();
        let version = match previous {
            Some(prev) if prev >= now => prev + 1,
            _ => now,
        };

        self.cache.set_with_ttl(&key, &version, self.retention).await;
        counter!("list_version_bumps_total", "partition" => partition.kind()).increment(1);
        debug!(version, "List version bumped");
        version
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, InMemoryBackend};
    use crate::stats::model::UserId;
    use std::sync::Arc;

    fn versions(retention: Duration) -> ListVersions {
        let cache = Cache::new(Arc::new(InMemoryBackend::default()), CacheConfig::default());
        ListVersions::new(cache, retention)
    }

    #[tokio::test]
    async fn test_current_is_stable() {
        let versions = versions(Duration::from_secs(3600));
        let first = versions.current(&ListPartition::Admin).await;
        let second = versions.current(&ListPartition::Admin).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_bump_is_strictly_increasing() {
        let versions = versions(Duration::from_secs(3600));
        let partition = ListPartition::Instructor(UserId(3));

        let mut last = versions.current(&partition).await;
        for _ in 0..5 {
            let next = versions.bump(&partition).await;
            assert!(next > last);
            assert_eq!(versions.current(&partition).await, next);
            last = next;
        }
    }

    #[tokio::test]
    async fn test_partitions_are_independent() {
        let versions = versions(Duration::from_secs(3600));
        let admin = versions.current(&ListPartition::Admin).await;
        versions.bump(&ListPartition::Instructor(UserId(9))).await;
        assert_eq!(versions.current(&ListPartition::Admin).await, admin);
    }

    #[tokio::test]
    async fn test_stale_stamp_regenerated() {
        let versions = versions(Duration::from_millis(20));
        let first = versions.bump(&ListPartition::Admin).await;

        tokio::time::sleep(Duration::from_millis(40)).await;

        let regenerated = versions.current(&ListPartition::Admin).await;
        assert!(regenerated >= first);
        assert_eq!(versions.current(&ListPartition::Admin).await, regenerated);
    }
}
