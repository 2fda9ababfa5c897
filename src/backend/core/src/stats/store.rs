//! Read interface to the learning platform's data.
//!
//! The schema belongs to the host LMS; CoursePulse only reads it. Every
//! method is a bounded, parameterized query keyed by identifiers.

use async_trait::async_trait;

use super::model::{
    CourseId, CourseRecord, EnrollmentCounts, LessonId, ListPartition, PlatformTotals,
    QuizAttemptId, QuizAttemptRecord, UserId,
};
use crate::error::Result;

#[async_trait]
pub trait LearningStore: Send + Sync {
    /// The course row, or `None` when the id does not resolve.
    async fn find_course(&self, course_id: CourseId) -> Result<Option<CourseRecord>>;

    async fn enrollment_counts(&self, course_id: CourseId) -> Result<EnrollmentCounts>;

    /// Mean score (0-100) over finalized attempts on the course's quizzes.
    async fn average_quiz_score(&self, course_id: CourseId) -> Result<Option<f64>>;

    /// Mean per-learner progress (0-100) across enrolled learners.
    async fn average_progression(&self, course_id: CourseId) -> Result<Option<f64>>;

    /// One learner's progress (0-100), `None` when not enrolled.
    async fn user_progress(&self, user_id: UserId, course_id: CourseId) -> Result<Option<f64>>;

    /// Course that owns a lesson.
    async fn lesson_course(&self, lesson_id: LessonId) -> Result<Option<CourseId>>;

    async fn quiz_attempt(&self, attempt_id: QuizAttemptId) -> Result<Option<QuizAttemptRecord>>;

    async fn enrolled_course_ids(&self, user_id: UserId) -> Result<Vec<CourseId>>;

    /// Courses visible in a list partition, ordered by id.
    async fn list_course_ids(&self, partition: &ListPartition) -> Result<Vec<CourseId>>;

    async fn platform_totals(&self) -> Result<PlatformTotals>;

    /// Mean score over every finalized attempt on the platform.
    async fn platform_average_quiz_score(&self) -> Result<Option<f64>>;

    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}
