//! Property tests over the read-through cache and course statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use coursepulse_core::cache::{Cache, CacheGroup, CacheKey, ExpiryTier, Lookup};
use coursepulse_core::stats::{CourseId, InMemoryStore, StatsService, StoreOp, UserId};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn repeated_reads_compute_once(course in 1i64..10_000, enrolled in 0i64..40, completed_frac in 0.0f64..=1.0) {
        let completed = (enrolled as f64 * completed_frac).floor() as i64;

        tokio_test::block_on(async {
            let store = Arc::new(InMemoryStore::new());
            store.add_course(CourseId(course), "Course", UserId(1));
            for user in 0..enrolled {
                store.enroll(UserId(1_000 + user), CourseId(course));
            }
            for user in 0..completed {
                store.complete_course(UserId(1_000 + user), CourseId(course));
            }
            let stats = StatsService::new(Cache::in_memory(100), store.clone());

            let first = stats.course_stats(CourseId(course)).await.unwrap().unwrap();
            let second = stats.course_stats(CourseId(course)).await.unwrap().unwrap();

            assert_eq!(serde_json::to_vec(&first).unwrap(), serde_json::to_vec(&second).unwrap());
            assert_eq!(store.calls(StoreOp::FindCourse), 1);
            assert!((0.0..=100.0).contains(&first.completion_rate));
            if enrolled == 0 {
                assert_eq!(first.completion_rate, 0.0);
            }
        });
    }

    #[test]
    fn get_or_compute_calls_generator_at_most_once(id in any::<u32>(), value in any::<i64>()) {
        tokio_test::block_on(async {
            let cache = Cache::in_memory(100);
            let key = CacheKey::new(CacheGroup::Custom("prop".into())).with_segment(id);
            let calls = AtomicUsize::new(0);

            for _ in 0..3 {
                let got: i64 = cache
                    .get_or_compute(&key, ExpiryTier::Default, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(value)
                    })
                    .await
                    .unwrap();
                assert_eq!(got, value);
            }
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn delete_always_wins(id in any::<u32>(), tier_index in 0usize..3) {
        let tier = [ExpiryTier::Short, ExpiryTier::Default, ExpiryTier::Long][tier_index];

        tokio_test::block_on(async {
            let cache = Cache::in_memory(100);
            let key = CacheKey::new(CacheGroup::Custom("prop".into())).with_segment(id);

            cache.set(&key, &id, tier).await;
            cache.delete(&key).await;
            assert_eq!(cache.get::<u32>(&key).await, Lookup::NotFound);
        });
    }
}
