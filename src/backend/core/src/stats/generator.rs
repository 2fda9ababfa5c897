//! Derived-statistics generators.
//!
//! Each generator is a pure function of its arguments and the current store
//! state. A generator only fails when the primary record itself cannot be
//! read; a failing sub-query is logged, counted, and replaced by zero so the
//! rest of the snapshot still gets produced.

use std::future::Future;

use chrono::Utc;
use metrics::counter;
use tracing::{instrument, warn};

use super::model::{CourseId, CourseStatsSnapshot, DashboardOverview, UserId, UserProgress};
use super::store::LearningStore;
use crate::error::Result;

/// Round to one decimal, half away from zero. Non-finite input becomes 0.
pub fn round1(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 10.0).round() / 10.0
}

/// `part / whole` as a percentage with one decimal, clamped to `[0, 100]`.
/// A zero denominator yields 0.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round1((part as f64 / whole as f64 * 100.0).clamp(0.0, 100.0))
}

/// Normalize a store-reported percentage.
pub fn percent_value(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => round1(v.clamp(0.0, 100.0)),
        _ => 0.0,
    }
}

/// Await a sub-metric query, substituting the default on failure.
async fn contained<T, F>(metric: &'static str, query: F) -> T
where
    T: Default,
    F: Future<Output = Result<T>>,
{
    match query.await {
        Ok(value) => value,
        Err(e) => {
            counter!("stats_submetric_failures_total", "metric" => metric).increment(1);
            warn!(metric, error = %e, "Sub-metric query failed, using zero");
            T::default()
        }
    }
}

/// Compute a course's snapshot, or `None` when the course does not exist.
#[instrument(skip(store), fields(store = store.name()))]
pub async fn course_stats(
    store: &dyn LearningStore,
    course_id: CourseId,
) -> Result<Option<CourseStatsSnapshot>> {
    let Some(course) = store.find_course(course_id).await? else {
        return Ok(None);
    };

    let counts = contained("enrollment_counts", store.enrollment_counts(course_id)).await;
    let avg_progression = contained("average_progression", store.average_progression(course_id)).await;
    let avg_quiz_score = contained("average_quiz_score", store.average_quiz_score(course_id)).await;

    let completed_students = counts.completed.min(counts.total);

    counter!("stats_generations_total", "kind" => "course_stats").increment(1);

    Ok(Some(CourseStatsSnapshot {
        id: course.id,
        title: course.title,
        instructor_id: course.instructor_id,
        instructor_name: course.instructor_name.unwrap_or_default(),
        student_count: counts.total,
        completed_students,
        completion_rate: percentage(completed_students, counts.total),
        avg_progression: percent_value(avg_progression),
        avg_quiz_score: percent_value(avg_quiz_score),
        status: course.status,
        generated_at: Utc::now(),
    }))
}

/// One learner's progress. Not enrolled reads as 0.
#[instrument(skip(store), fields(store = store.name()))]
pub async fn user_progress(
    store: &dyn LearningStore,
    user_id: UserId,
    course_id: CourseId,
) -> Result<UserProgress> {
    let progress = store.user_progress(user_id, course_id).await?;

    counter!("stats_generations_total", "kind" => "user_progress").increment(1);

    Ok(UserProgress {
        user_id,
        course_id,
        progress: percent_value(progress),
    })
}

/// Platform-wide totals. The platform quiz average is a contained sub-metric.
#[instrument(skip(store), fields(store = store.name()))]
pub async fn overview(store: &dyn LearningStore) -> Result<DashboardOverview> {
    let totals = store.platform_totals().await?;
    let avg_quiz_score = contained("platform_quiz_score", store.platform_average_quiz_score()).await;

    let completed = totals.completed_enrollments.min(totals.total_enrollments);

    counter!("stats_generations_total", "kind" => "overview").increment(1);

    Ok(DashboardOverview {
        total_courses: totals.total_courses,
        total_students: totals.total_students,
        total_enrollments: totals.total_enrollments,
        completed_enrollments: completed,
        completion_rate: percentage(completed, totals.total_enrollments),
        avg_quiz_score: percent_value(avg_quiz_score),
        generated_at: Utc::now(),
    })
}
