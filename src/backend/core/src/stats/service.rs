//! Cache-backed accessors.
//!
//! Every accessor is a read-through over a generator: a hit returns the
//! cached value, a miss computes, stores, and returns it.
//!
//! | Accessor        | Key                                   | Tier    |
//! |-----------------|---------------------------------------|---------|
//! | `course_stats`  | `course_stats:{course}`               | Default |
//! | `user_progress` | `user_progress:{user}:{course}`       | Short   |
//! | `course_list`   | `course_list:{partition}:v{version}`  | Long    |
//! | `overview`      | `overview:platform`                   | Long    |

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{instrument, warn};

use super::generator;
use super::model::{CourseId, CourseStatsSnapshot, DashboardOverview, ListPartition, UserId, UserProgress};
use super::store::LearningStore;
use crate::cache::{Cache, CacheKey, ExpiryTier, ListVersions};
use crate::config::CacheSettings;
use crate::error::Result;

/// Read-through accessors over the statistics generators.
#[derive(Clone)]
pub struct StatsService {
    cache: Cache,
    store: Arc<dyn LearningStore>,
    versions: ListVersions,
    cache_missing_courses: bool,
}

impl std::fmt::Debug for StatsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsService")
            .field("cache", &self.cache)
            .field("store", &self.store.name())
            .field("cache_missing_courses", &self.cache_missing_courses)
            .finish()
    }
}

impl StatsService {
    /// Accessors with default policy: one-hour list versions, missing courses cached.
    pub fn new(cache: Cache, store: Arc<dyn LearningStore>) -> Self {
        let versions = ListVersions::new(cache.clone(), Duration::from_secs(3600));
        Self {
            cache,
            store,
            versions,
            cache_missing_courses: true,
        }
    }

    pub fn from_settings(cache: Cache, store: Arc<dyn LearningStore>, settings: &CacheSettings) -> Self {
        Self::new(cache, store)
            .with_list_version_retention(settings.list_version_retention)
            .with_missing_courses_cached(settings.cache_missing_courses)
    }

    pub fn with_list_version_retention(mut self, retention: Duration) -> Self {
        self.versions = ListVersions::new(self.cache.clone(), retention);
        self
    }

    /// Whether a lookup of a nonexistent course is itself cached.
    pub fn with_missing_courses_cached(mut self, enabled: bool) -> Self {
        self.cache_missing_courses = enabled;
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn LearningStore> {
        &self.store
    }

    pub fn versions(&self) -> &ListVersions {
        &self.versions
    }

    /// Statistics for one course; `None` when the course does not exist.
    #[instrument(skip(self), fields(course_id = %course_id))]
    pub async fn course_stats(&self, course_id: CourseId) -> Result<Option<CourseStatsSnapshot>> {
        let cache_missing = self.cache_missing_courses;
        self.cache
            .get_or_compute_if(
                &CacheKey::course_stats(course_id),
                ExpiryTier::Default,
                || generator::course_stats(self.store.as_ref(), course_id),
                |snapshot| snapshot.is_some() || cache_missing,
            )
            .await
    }

    /// One learner's progress through a course.
    #[instrument(skip(self), fields(user_id = %user_id, course_id = %course_id))]
    pub async fn user_progress(&self, user_id: UserId, course_id: CourseId) -> Result<UserProgress> {
        self.cache
            .get_or_compute(
                &CacheKey::user_progress(user_id, course_id),
                ExpiryTier::Short,
                || generator::user_progress(self.store.as_ref(), user_id, course_id),
            )
            .await
    }

    /// Snapshots for every course in a list partition.
    ///
    /// Membership is cached under the partition's current version stamp, so a
    /// version bump forces the membership query to run again. Member
    /// snapshots come from [`course_stats`](Self::course_stats); members that
    /// no longer resolve or fail to load are left out, as are members of an
    /// instructor partition whose snapshot names a different owner.
    #[instrument(skip(self), fields(partition = %partition))]
    pub async fn course_list(&self, partition: ListPartition) -> Result<Vec<CourseStatsSnapshot>> {
        let version = self.versions.current(&partition).await;
        let course_ids: Vec<CourseId> = self
            .cache
            .get_or_compute(
                &CacheKey::course_list(&partition, version),
                ExpiryTier::Long,
                || self.store.list_course_ids(&partition),
            )
            .await?;

        let results = join_all(course_ids.iter().map(|id| self.course_stats(*id))).await;

        let mut snapshots = Vec::with_capacity(results.len());
        for (course_id, result) in course_ids.iter().zip(results) {
            match result {
                Ok(Some(snapshot)) if partition.includes(&snapshot) => snapshots.push(snapshot),
                Ok(_) => {}
                Err(e) => warn!(course_id = %course_id, error = %e, "Skipping course in list"),
            }
        }
        Ok(snapshots)
    }

    /// Platform totals for the admin dashboard.
    #[instrument(skip(self))]
    pub async fn overview(&self) -> Result<DashboardOverview> {
        self.cache
            .get_or_compute(&CacheKey::overview(), ExpiryTier::Long, || {
                generator::overview(self.store.as_ref())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Lookup;
    use crate::stats::memory::{InMemoryStore, StoreOp};

    fn setup() -> (StatsService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.add_user(UserId(1), "Grace");
        store.add_course(CourseId(42), "Compilers", UserId(1));
        let service = StatsService::new(Cache::in_memory(1_000), store.clone());
        (service, store)
    }

    #[tokio::test]
    async fn test_course_stats_computed_once() {
        let (service, store) = setup();

        let first = service.course_stats(CourseId(42)).await.unwrap();
        let second = service.course_stats(CourseId(42)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.calls(StoreOp::FindCourse), 1);
    }

    #[tokio::test]
    async fn test_missing_course_is_cached_by_default() {
        let (service, store) = setup();

        assert!(service.course_stats(CourseId(404)).await.unwrap().is_none());
        assert!(service.course_stats(CourseId(404)).await.unwrap().is_none());

        assert_eq!(store.calls(StoreOp::FindCourse), 1);
        assert_eq!(
            service
                .cache()
                .get::<Option<CourseStatsSnapshot>>(&CacheKey::course_stats(CourseId(404)))
                .await,
            Lookup::Found(None)
        );
    }

    #[tokio::test]
    async fn test_missing_course_not_cached_when_disabled() {
        let (service, store) = setup();
        let service = service.with_missing_courses_cached(false);

        assert!(service.course_stats(CourseId(404)).await.unwrap().is_none());
        assert!(service.course_stats(CourseId(404)).await.unwrap().is_none());

        assert_eq!(store.calls(StoreOp::FindCourse), 2);
    }

    #[tokio::test]
    async fn test_store_failure_not_cached() {
        let (service, store) = setup();
        store.fail(StoreOp::FindCourse);
        assert!(service.course_stats(CourseId(42)).await.is_err());

        store.recover(StoreOp::FindCourse);
        assert!(service.course_stats(CourseId(42)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_user_progress_uses_short_tier() {
        let store = Arc::new(InMemoryStore::new());
        store.add_course(CourseId(1), "Intro", UserId(9));
        store.enroll(UserId(2), CourseId(1));
        let cache = Cache::new(
            Arc::new(crate::cache::InMemoryBackend::default()),
            crate::cache::CacheConfig::builder()
                .tier(ExpiryTier::Short, Duration::from_millis(30))
                .build(),
        );
        let service = StatsService::new(cache, store.clone());

        service.user_progress(UserId(2), CourseId(1)).await.unwrap();
        service.user_progress(UserId(2), CourseId(1)).await.unwrap();
        assert_eq!(store.calls(StoreOp::UserProgress), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        service.user_progress(UserId(2), CourseId(1)).await.unwrap();
        assert_eq!(store.calls(StoreOp::UserProgress), 2);
    }

    #[tokio::test]
    async fn test_course_list_follows_version() {
        let (service, store) = setup();

        let list = service.course_list(ListPartition::Admin).await.unwrap();
        assert_eq!(list.len(), 1);

        store.add_course(CourseId(43), "Databases", UserId(1));
        // membership cached under the current version
        assert_eq!(service.course_list(ListPartition::Admin).await.unwrap().len(), 1);
        assert_eq!(store.calls(StoreOp::ListCourses), 1);

        service.versions().bump(&ListPartition::Admin).await;
        let list = service.course_list(ListPartition::Admin).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(store.calls(StoreOp::ListCourses), 2);
    }

    #[tokio::test]
    async fn test_course_list_skips_unresolved_members() {
        let (service, store) = setup();
        store.add_course(CourseId(43), "Databases", UserId(1));
        service.course_list(ListPartition::Admin).await.unwrap();

        store.remove_course(CourseId(43));
        service.cache().delete(&CacheKey::course_stats(CourseId(43))).await;

        let list = service.course_list(ListPartition::Admin).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, CourseId(42));
    }

    #[tokio::test]
    async fn test_instructor_list_drops_transferred_course() {
        let (service, store) = setup();
        store.add_user(UserId(2), "Barbara");
        let previous = ListPartition::Instructor(UserId(1));
        assert_eq!(service.course_list(previous).await.unwrap().len(), 1);

        // membership for the previous owner stays cached; only the snapshot is refreshed
        store.transfer_course(CourseId(42), UserId(2));
        service.cache().delete(&CacheKey::course_stats(CourseId(42))).await;

        assert!(service.course_list(previous).await.unwrap().is_empty());
        assert_eq!(store.calls(StoreOp::ListCourses), 1);
    }

    #[tokio::test]
    async fn test_overview_cached() {
        let (service, store) = setup();
        service.overview().await.unwrap();
        service.overview().await.unwrap();
        assert_eq!(store.calls(StoreOp::PlatformTotals), 1);
    }
}
