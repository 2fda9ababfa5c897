//! Event-driven cache invalidation.
//!
//! | Event               | Evicts                                                     |
//! |---------------------|------------------------------------------------------------|
//! | `course_updated`    | course stats, overview; bumps admin, old + new owner lists |
//! | `user_enrolled`     | course stats, overview, the user's progress everywhere     |
//! | `lesson_completed`  | owning course's stats, overview, that user's progress      |
//! | `quiz_finished`     | attempt's course stats, overview, attempt owner progress   |
//! | `plugin_*`          | the whole namespace                                        |
//!
//! Indirect identifiers are resolved through the store first. When that
//! fails, or resolves to nothing, the trigger does nothing. Triggers never
//! return errors; every run is recorded in a bounded log.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cache::{Cache, CacheKey, FlushMode, ListVersions, Lookup};
use crate::events::{DomainEvent, EventBus, EventHandler, EventKind, Subscription};
use crate::stats::model::{
    CourseId, CourseStatsSnapshot, LessonId, ListPartition, QuizAttemptId, UserId,
};
use crate::stats::{LearningStore, StatsService};

/// Entries kept in the invalidation log.
pub const LOG_CAPACITY: usize = 1000;

// ═══════════════════════════════════════════════════════════════════════════════
// Invalidation Log
// ═══════════════════════════════════════════════════════════════════════════════

/// What one trigger run did.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationRecord {
    pub event: DomainEvent,

    /// Keys a delete was issued for
    pub keys: Vec<String>,

    /// How many of those actually held an entry
    pub removed: u64,

    /// List partitions whose version was bumped
    pub versions_bumped: Vec<ListPartition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush: Option<FlushMode>,

    /// Why nothing was invalidated, when nothing was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,

    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl InvalidationRecord {
    fn new(event: DomainEvent) -> Self {
        Self {
            event,
            keys: Vec::new(),
            removed: 0,
            versions_bumped: Vec::new(),
            flush: None,
            skipped: None,
            timestamp: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.keys.is_empty() && self.versions_bumped.is_empty() && self.flush.is_none()
    }
}

/// Bounded most-recent-first log of trigger runs.
#[derive(Debug)]
pub struct InvalidationLog {
    entries: Mutex<VecDeque<InvalidationRecord>>,
    capacity: usize,
}

impl Default for InvalidationLog {
    fn default() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }
}

impl InvalidationLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(LOG_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    fn push(&self, record: InvalidationRecord) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_back();
        }
        entries.push_front(record);
    }

    /// Most recent entries first.
    pub fn recent(&self, limit: usize) -> Vec<InvalidationRecord> {
        self.entries.lock().iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Triggers
// ═══════════════════════════════════════════════════════════════════════════════

/// Binds domain events to cache invalidation.
pub struct InvalidationTriggers {
    cache: Cache,
    store: Arc<dyn LearningStore>,
    versions: ListVersions,
    log: InvalidationLog,
}

impl std::fmt::Debug for InvalidationTriggers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationTriggers")
            .field("cache", &self.cache)
            .field("store", &self.store.name())
            .field("logged", &self.log.len())
            .finish()
    }
}

impl InvalidationTriggers {
    /// Triggers over the same cache, store and list versions as `stats`.
    pub fn new(stats: &StatsService) -> Self {
        Self {
            cache: stats.cache().clone(),
            store: stats.store().clone(),
            versions: stats.versions().clone(),
            log: InvalidationLog::default(),
        }
    }

    /// Subscribe to every domain event on `bus`.
    pub fn register(self: &Arc<Self>, bus: &EventBus) -> Subscription {
        let handler: Arc<dyn EventHandler> = self.clone();
        bus.subscribe(&EventKind::ALL, handler)
    }

    pub fn log(&self) -> &InvalidationLog {
        &self.log
    }

    /// Run the trigger for one event and record what it did.
    #[instrument(skip(self, event), fields(event = %event.kind()))]
    pub async fn apply(&self, event: &DomainEvent) -> InvalidationRecord {
        let started = Instant::now();
        let mut record = InvalidationRecord::new(*event);

        match *event {
            DomainEvent::CourseUpdated { course_id } => {
                self.course_updated(course_id, &mut record).await
            }
            DomainEvent::UserEnrolled { user_id, course_id } => {
                self.user_enrolled(user_id, course_id, &mut record).await
            }
            DomainEvent::LessonCompleted { user_id, lesson_id } => {
                self.lesson_completed(user_id, lesson_id, &mut record).await
            }
            DomainEvent::QuizFinished { attempt_id } => {
                self.quiz_finished(attempt_id, &mut record).await
            }
            DomainEvent::PluginActivated | DomainEvent::PluginDeactivated => {
                record.flush = Some(self.cache.flush_all().await);
            }
        }

        record.duration_ms = started.elapsed().as_millis() as u64;
        counter!("cache_invalidations_total", "event" => event.kind().as_str()).increment(1);
        info!(
            keys = record.keys.len(),
            removed = record.removed,
            versions_bumped = record.versions_bumped.len(),
            skipped = record.skipped.as_deref().unwrap_or(""),
            "Invalidation applied"
        );

        self.log.push(record.clone());
        record
    }

    async fn evict(&self, key: CacheKey, record: &mut InvalidationRecord) {
        if self.cache.delete(&key).await {
            record.removed += 1;
        }
        record.keys.push(key.build());
    }

    async fn evict_course(&self, course_id: CourseId, record: &mut InvalidationRecord) {
        self.evict(CacheKey::course_stats(course_id), record).await;
        self.evict(CacheKey::overview(), record).await;
    }

    async fn bump(&self, partition: ListPartition, record: &mut InvalidationRecord) {
        self.versions.bump(&partition).await;
        record.versions_bumped.push(partition);
    }

    async fn course_updated(&self, course_id: CourseId, record: &mut InvalidationRecord) {
        // owner the cached lists were built against, read before the snapshot goes
        let previous_owner = match self
            .cache
            .get::<Option<CourseStatsSnapshot>>(&CacheKey::course_stats(course_id))
            .await
        {
            Lookup::Found(Some(snapshot)) => snapshot.instructor_id,
            _ => None,
        };

        self.evict_course(course_id, record).await;
        self.bump(ListPartition::Admin, record).await;

        let current_owner = match self.store.find_course(course_id).await {
            Ok(course) => course.and_then(|c| c.instructor_id),
            Err(e) => {
                warn!(course_id = %course_id, error = %e, "Could not resolve course owner");
                None
            }
        };

        for owner in [previous_owner, current_owner].into_iter().flatten() {
            let partition = ListPartition::Instructor(owner);
            if !record.versions_bumped.contains(&partition) {
                self.bump(partition, record).await;
            }
        }
    }

    async fn user_enrolled(&self, user_id: UserId, course_id: CourseId, record: &mut InvalidationRecord) {
        self.evict_course(course_id, record).await;
        self.evict(CacheKey::user_progress(user_id, course_id), record)
            .await;

        match self.store.enrolled_course_ids(user_id).await {
            Ok(course_ids) => {
                for other in course_ids.into_iter().filter(|c| *c != course_id) {
                    self.evict(CacheKey::user_progress(user_id, other), record)
                        .await;
                }
            }
            Err(e) => warn!(user_id = %user_id, error = %e, "Could not list user's enrollments"),
        }
    }

    async fn lesson_completed(&self, user_id: UserId, lesson_id: LessonId, record: &mut InvalidationRecord) {
        let course_id = match self.store.lesson_course(lesson_id).await {
            Ok(Some(course_id)) => course_id,
            Ok(None) => {
                record.skipped = Some(format!("lesson {} has no course", lesson_id));
                return;
            }
            Err(e) => {
                warn!(lesson_id = %lesson_id, error = %e, "Could not resolve lesson's course");
                record.skipped = Some(format!("lesson {} could not be resolved", lesson_id));
                return;
            }
        };

        self.evict_course(course_id, record).await;
        self.evict(CacheKey::user_progress(user_id, course_id), record)
            .await;
    }

    async fn quiz_finished(&self, attempt_id: QuizAttemptId, record: &mut InvalidationRecord) {
        let attempt = match self.store.quiz_attempt(attempt_id).await {
            Ok(Some(attempt)) => attempt,
            Ok(None) => {
                record.skipped = Some(format!("quiz attempt {} not found", attempt_id));
                return;
            }
            Err(e) => {
                warn!(attempt_id = %attempt_id, error = %e, "Could not resolve quiz attempt");
                record.skipped = Some(format!("quiz attempt {} could not be resolved", attempt_id));
                return;
            }
        };

        self.evict_course(attempt.course_id, record).await;
        self.evict(CacheKey::user_progress(attempt.user_id, attempt.course_id), record)
            .await;
    }
}

#[async_trait]
impl EventHandler for InvalidationTriggers {
    async fn handle(&self, event: &DomainEvent) {
        self.apply(event).await;
    }

    fn name(&self) -> &'static str {
        "invalidation_triggers"
    }
}
