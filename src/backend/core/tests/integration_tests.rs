//! End-to-end tests for the cache, accessors and invalidation triggers,
//! wired the way the server wires them but over in-memory collaborators.

use std::sync::Arc;

use coursepulse_core::cache::{
    Cache, CacheConfig, CacheGroup, CacheKey, ExpiryTier, FlushMode, InMemoryBackend, InMemoryConfig,
    Lookup,
};
use coursepulse_core::events::{DomainEvent, EventBus};
use coursepulse_core::invalidation::InvalidationTriggers;
use coursepulse_core::stats::{
    CourseId, InMemoryStore, LessonId, ListPartition, QuizAttemptId, QuizId, StatsService, StoreOp,
    UserId,
};

struct Harness {
    store: Arc<InMemoryStore>,
    stats: StatsService,
    bus: EventBus,
    triggers: Arc<InvalidationTriggers>,
}

impl Harness {
    fn new() -> Self {
        Self::with_cache(Cache::in_memory(10_000))
    }

    fn with_cache(cache: Cache) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let stats = StatsService::new(cache, store.clone());
        let bus = EventBus::new();
        let triggers = Arc::new(InvalidationTriggers::new(&stats));
        // registration lives as long as the bus
        let _ = triggers.register(&bus);
        Self {
            store,
            stats,
            bus,
            triggers,
        }
    }

    /// Course 42: ten enrolled learners, four of them completed.
    fn seed_course_42(&self) {
        self.store.add_user(UserId(1), "Ada Instructor");
        self.store.add_course(CourseId(42), "Compilers", UserId(1));
        for user in 101..=110 {
            self.store.enroll(UserId(user), CourseId(42));
        }
        for user in 101..=104 {
            self.store.complete_course(UserId(user), CourseId(42));
        }
    }
}

#[tokio::test]
async fn test_enrollment_scenario_recomputes_completion_rate() {
    let h = Harness::new();
    h.seed_course_42();

    let before = h.stats.course_stats(CourseId(42)).await.unwrap().unwrap();
    assert_eq!(before.student_count, 10);
    assert_eq!(before.completed_students, 4);
    assert_eq!(before.completion_rate, 40.0);

    h.store.enroll(UserId(111), CourseId(42));
    h.bus
        .dispatch(&DomainEvent::UserEnrolled {
            user_id: UserId(111),
            course_id: CourseId(42),
        })
        .await;

    let after = h.stats.course_stats(CourseId(42)).await.unwrap().unwrap();
    assert_eq!(after.student_count, 11);
    assert_eq!(after.completed_students, 4);
    assert_eq!(after.completion_rate, 36.4);
}

#[tokio::test]
async fn test_repeated_reads_are_identical_and_computed_once() {
    let h = Harness::new();
    h.seed_course_42();

    let first = h.stats.course_stats(CourseId(42)).await.unwrap();
    let second = h.stats.course_stats(CourseId(42)).await.unwrap();

    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
    assert_eq!(h.store.calls(StoreOp::FindCourse), 1);
    assert_eq!(h.store.calls(StoreOp::EnrollmentCounts), 1);
}

#[tokio::test]
async fn test_course_update_evicts_only_that_course() {
    let h = Harness::new();
    h.seed_course_42();
    h.store.add_course(CourseId(43), "Databases", UserId(1));

    h.stats.course_stats(CourseId(42)).await.unwrap();
    h.stats.course_stats(CourseId(43)).await.unwrap();
    assert_eq!(h.store.calls(StoreOp::FindCourse), 2);

    h.store
        .update_course(CourseId(42), |course| course.title = "Compilers II".into());
    h.bus
        .dispatch(&DomainEvent::CourseUpdated {
            course_id: CourseId(42),
        })
        .await;
    // the trigger resolves the owner through the store
    let resolved = h.store.calls(StoreOp::FindCourse);

    let renamed = h.stats.course_stats(CourseId(42)).await.unwrap().unwrap();
    assert_eq!(renamed.title, "Compilers II");
    assert_eq!(h.store.calls(StoreOp::FindCourse), resolved + 1);

    h.stats.course_stats(CourseId(43)).await.unwrap();
    assert_eq!(h.store.calls(StoreOp::FindCourse), resolved + 1);
}

#[tokio::test]
async fn test_course_update_refreshes_instructor_list() {
    let h = Harness::new();
    h.seed_course_42();
    let partition = ListPartition::Instructor(UserId(1));

    assert_eq!(h.stats.course_list(partition).await.unwrap().len(), 1);

    h.store.add_course(CourseId(44), "Networks", UserId(1));
    h.bus
        .dispatch(&DomainEvent::CourseUpdated {
            course_id: CourseId(44),
        })
        .await;

    let list = h.stats.course_list(partition).await.unwrap();
    let ids: Vec<CourseId> = list.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![CourseId(42), CourseId(44)]);

    let admin = h.stats.course_list(ListPartition::Admin).await.unwrap();
    assert_eq!(admin.len(), 2);
}

#[tokio::test]
async fn test_ownership_change_moves_course_between_instructor_lists() {
    let h = Harness::new();
    h.seed_course_42();
    h.store.add_user(UserId(2), "Barbara");
    let previous = ListPartition::Instructor(UserId(1));
    let next = ListPartition::Instructor(UserId(2));

    assert_eq!(h.stats.course_list(previous).await.unwrap().len(), 1);
    assert!(h.stats.course_list(next).await.unwrap().is_empty());

    h.store.transfer_course(CourseId(42), UserId(2));
    h.bus
        .dispatch(&DomainEvent::CourseUpdated {
            course_id: CourseId(42),
        })
        .await;

    assert!(h.stats.course_list(previous).await.unwrap().is_empty());
    let moved = h.stats.course_list(next).await.unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].id, CourseId(42));
    assert_eq!(moved[0].instructor_id, Some(UserId(2)));
    assert_eq!(moved[0].instructor_name, "Barbara");
}

#[tokio::test]
async fn test_lesson_and_quiz_events_refresh_progress() {
    let h = Harness::new();
    h.seed_course_42();
    h.store.add_lesson(LessonId(1), CourseId(42));
    h.store.add_lesson(LessonId(2), CourseId(42));
    h.store.add_quiz(QuizId(5), CourseId(42));

    let progress = h.stats.user_progress(UserId(105), CourseId(42)).await.unwrap();
    assert_eq!(progress.progress, 0.0);

    h.store.complete_lesson(UserId(105), LessonId(1));
    h.bus
        .dispatch(&DomainEvent::LessonCompleted {
            user_id: UserId(105),
            lesson_id: LessonId(1),
        })
        .await;
    let progress = h.stats.user_progress(UserId(105), CourseId(42)).await.unwrap();
    assert_eq!(progress.progress, 50.0);

    let stats = h.stats.course_stats(CourseId(42)).await.unwrap().unwrap();
    assert_eq!(stats.avg_quiz_score, 0.0);

    h.store
        .record_attempt(QuizAttemptId(9), UserId(105), QuizId(5), 80.0);
    h.bus
        .dispatch(&DomainEvent::QuizFinished {
            attempt_id: QuizAttemptId(9),
        })
        .await;
    let stats = h.stats.course_stats(CourseId(42)).await.unwrap().unwrap();
    assert_eq!(stats.avg_quiz_score, 80.0);
}

#[tokio::test]
async fn test_unresolvable_events_leave_cache_alone() {
    let h = Harness::new();
    h.seed_course_42();
    h.stats.course_stats(CourseId(42)).await.unwrap();

    h.bus
        .dispatch(&DomainEvent::LessonCompleted {
            user_id: UserId(101),
            lesson_id: LessonId(404),
        })
        .await;
    h.bus
        .dispatch(&DomainEvent::QuizFinished {
            attempt_id: QuizAttemptId(404),
        })
        .await;

    let cached = h
        .stats
        .cache()
        .get::<serde_json::Value>(&CacheKey::course_stats(CourseId(42)))
        .await;
    assert!(cached.is_found());

    let log = h.triggers.log().recent(2);
    assert!(log.iter().all(|record| record.is_noop()));
}

#[tokio::test]
async fn test_delete_then_get_is_not_found_for_every_tier() {
    let cache = Cache::in_memory(100);
    for (id, tier) in [ExpiryTier::Short, ExpiryTier::Default, ExpiryTier::Long]
        .into_iter()
        .enumerate()
    {
        let key = CacheKey::new(CacheGroup::Custom("tiers".into())).with_segment(id);
        cache.set(&key, &id, tier).await;
        assert!(cache.delete(&key).await);
        assert_eq!(cache.get::<usize>(&key).await, Lookup::NotFound);
    }
}

async fn assert_flush_spares_other_namespace(backend: Arc<InMemoryBackend>, expected: FlushMode) {
    let ours = Cache::new(backend.clone(), CacheConfig::builder().namespace("coursepulse").build());
    let theirs = Cache::new(backend, CacheConfig::builder().namespace("gradebook").build());

    let stats_key = CacheKey::course_stats(CourseId(1));
    let overview_key = CacheKey::overview();
    ours.set(&stats_key, &1u8, ExpiryTier::Default).await;
    ours.set(&overview_key, &2u8, ExpiryTier::Long).await;
    theirs.set(&stats_key, &3u8, ExpiryTier::Default).await;

    assert_eq!(ours.flush_all().await, expected);

    assert_eq!(ours.get::<u8>(&stats_key).await, Lookup::NotFound);
    assert_eq!(ours.get::<u8>(&overview_key).await, Lookup::NotFound);
    assert_eq!(theirs.get::<u8>(&stats_key).await, Lookup::Found(3));
}

#[tokio::test]
async fn test_flush_by_prefix() {
    assert_flush_spares_other_namespace(Arc::new(InMemoryBackend::default()), FlushMode::Prefix).await;
}

#[tokio::test]
async fn test_flush_by_generation() {
    let backend = Arc::new(InMemoryBackend::new(
        InMemoryConfig::default().without_prefix_flush(),
    ));
    assert_flush_spares_other_namespace(backend, FlushMode::Generation).await;
}

#[tokio::test]
async fn test_plugin_toggle_flushes_namespace() {
    let h = Harness::new();
    h.seed_course_42();
    h.stats.course_stats(CourseId(42)).await.unwrap();
    h.stats.overview().await.unwrap();

    h.bus.dispatch(&DomainEvent::PluginActivated).await;

    h.stats.course_stats(CourseId(42)).await.unwrap();
    h.stats.overview().await.unwrap();
    assert_eq!(h.store.calls(StoreOp::FindCourse), 2);
    assert_eq!(h.store.calls(StoreOp::PlatformTotals), 2);
}

#[tokio::test]
async fn test_deregistered_triggers_stop_invalidating() {
    let store = Arc::new(InMemoryStore::new());
    store.add_course(CourseId(42), "Compilers", UserId(1));
    let stats = StatsService::new(Cache::in_memory(100), store.clone());
    let bus = EventBus::new();
    let triggers = Arc::new(InvalidationTriggers::new(&stats));

    let subscription = triggers.register(&bus);
    assert!(subscription.deregister());

    stats.course_stats(CourseId(42)).await.unwrap();
    assert_eq!(
        bus.dispatch(&DomainEvent::CourseUpdated {
            course_id: CourseId(42)
        })
        .await,
        0
    );
    stats.course_stats(CourseId(42)).await.unwrap();
    assert_eq!(store.calls(StoreOp::FindCourse), 1);
}

#[tokio::test]
async fn test_missing_course_lookup_is_a_hit() {
    let h = Harness::new();

    assert!(h.stats.course_stats(CourseId(999)).await.unwrap().is_none());
    assert!(h.stats.course_stats(CourseId(999)).await.unwrap().is_none());
    assert_eq!(h.store.calls(StoreOp::FindCourse), 1);
}
