//! `LearningStore` over the LMS's PostgreSQL schema.
//!
//! Tables read:
//!
//! ```text
//! courses(id, title, instructor_id, status)
//! users(id, display_name)
//! enrollments(user_id, course_id, status)          -- 'active' | 'completed'
//! lessons(id, course_id)
//! lesson_progress(user_id, lesson_id, completed_at)
//! quizzes(id, course_id)
//! quiz_attempts(id, user_id, quiz_id, score_percent, status)
//! ```

use async_trait::async_trait;
use tracing::instrument;

use super::Database;
use crate::error::Result;
use crate::stats::model::{
    CourseId, CourseRecord, EnrollmentCounts, LessonId, ListPartition, PlatformTotals,
    QuizAttemptId, QuizAttemptRecord, QuizId, UserId,
};
use crate::stats::store::LearningStore;

/// Per-learner progress over a course's lessons, 0-100. Learners with no
/// lessons to complete count as 0.
const PROGRESS_PER_LEARNER: &str = r#"
    WITH course_lessons AS (
        SELECT id FROM lessons WHERE course_id = $1
    ),
    lesson_total AS (
        SELECT COUNT(*) AS n FROM course_lessons
    )
    SELECT e.user_id,
           CASE WHEN t.n = 0 THEN 0.0
                ELSE COUNT(lp.lesson_id)::float8 * 100.0 / t.n
           END AS progress
    FROM enrollments e
    CROSS JOIN lesson_total t
    LEFT JOIN lesson_progress lp
           ON lp.user_id = e.user_id
          AND lp.completed_at IS NOT NULL
          AND lp.lesson_id IN (SELECT id FROM course_lessons)
    WHERE e.course_id = $1
    GROUP BY e.user_id, t.n
"#;

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types
// ═══════════════════════════════════════════════════════════════════════════════

// The schema belongs to the LMS; anything it does not declare NOT NULL is
// decoded as an Option.

#[derive(Debug, sqlx::FromRow)]
struct CourseRow {
    id: i64,
    title: Option<String>,
    instructor_id: Option<i64>,
    display_name: Option<String>,
    status: Option<String>,
}

impl From<CourseRow> for CourseRecord {
    fn from(row: CourseRow) -> Self {
        Self {
            id: CourseId(row.id),
            title: row.title.unwrap_or_default(),
            instructor_id: row.instructor_id.map(UserId),
            instructor_name: row.display_name,
            status: row.status.unwrap_or_default(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EnrollmentCountsRow {
    total: i64,
    completed: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct QuizAttemptRow {
    id: i64,
    user_id: Option<i64>,
    quiz_id: i64,
    course_id: Option<i64>,
}

impl QuizAttemptRow {
    /// `None` when the attempt has no owner or its quiz no course.
    fn into_record(self) -> Option<QuizAttemptRecord> {
        Some(QuizAttemptRecord {
            id: QuizAttemptId(self.id),
            user_id: UserId(self.user_id?),
            quiz_id: QuizId(self.quiz_id),
            course_id: CourseId(self.course_id?),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlatformTotalsRow {
    total_courses: i64,
    total_students: i64,
    total_enrollments: i64,
    completed_enrollments: i64,
}

impl From<PlatformTotalsRow> for PlatformTotals {
    fn from(row: PlatformTotalsRow) -> Self {
        Self {
            total_courses: row.total_courses.max(0) as u64,
            total_students: row.total_students.max(0) as u64,
            total_enrollments: row.total_enrollments.max(0) as u64,
            completed_enrollments: row.completed_enrollments.max(0) as u64,
        }
    }
}

/// Reads statistics inputs from the LMS database.
#[derive(Debug, Clone)]
pub struct PgLearningStore {
    db: Database,
}

impl PgLearningStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl LearningStore for PgLearningStore {
    #[instrument(skip(self), fields(course_id = %course_id))]
    async fn find_course(&self, course_id: CourseId) -> Result<Option<CourseRecord>> {
        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            SELECT c.id, c.title, c.instructor_id, c.status, u.display_name
            FROM courses c
            LEFT JOIN users u ON u.id = c.instructor_id
            WHERE c.id = $1
            "#,
        )
        .bind(course_id.0)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(CourseRecord::from))
    }

    #[instrument(skip(self), fields(course_id = %course_id))]
    async fn enrollment_counts(&self, course_id: CourseId) -> Result<EnrollmentCounts> {
        let row = sqlx::query_as::<_, EnrollmentCountsRow>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'completed') AS completed
            FROM enrollments
            WHERE course_id = $1
            "#,
        )
        .bind(course_id.0)
        .fetch_one(self.db.pool())
        .await?;

        Ok(EnrollmentCounts {
            total: row.total.max(0) as u64,
            completed: row.completed.max(0) as u64,
        })
    }

    #[instrument(skip(self), fields(course_id = %course_id))]
    async fn average_quiz_score(&self, course_id: CourseId) -> Result<Option<f64>> {
        let avg: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT AVG(a.score_percent)::float8
            FROM quiz_attempts a
            JOIN quizzes q ON q.id = a.quiz_id
            WHERE q.course_id = $1 AND a.status = 'completed'
            "#,
        )
        .bind(course_id.0)
        .fetch_one(self.db.pool())
        .await?;

        Ok(avg)
    }

    #[instrument(skip(self), fields(course_id = %course_id))]
    async fn average_progression(&self, course_id: CourseId) -> Result<Option<f64>> {
        let query = format!("SELECT AVG(progress)::float8 FROM ({}) per_learner", PROGRESS_PER_LEARNER);
        let avg: Option<f64> = sqlx::query_scalar(&query)
            .bind(course_id.0)
            .fetch_one(self.db.pool())
            .await?;

        Ok(avg)
    }

    #[instrument(skip(self), fields(user_id = %user_id, course_id = %course_id))]
    async fn user_progress(&self, user_id: UserId, course_id: CourseId) -> Result<Option<f64>> {
        let query = format!(
            "SELECT progress::float8 FROM ({}) per_learner WHERE user_id = $2",
            PROGRESS_PER_LEARNER
        );
        let progress: Option<f64> = sqlx::query_scalar(&query)
            .bind(course_id.0)
            .bind(user_id.0)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(progress)
    }

    async fn lesson_course(&self, lesson_id: LessonId) -> Result<Option<CourseId>> {
        // outer None: no such lesson; inner None: lesson without a course
        let course_id: Option<Option<i64>> =
            sqlx::query_scalar("SELECT course_id FROM lessons WHERE id = $1")
                .bind(lesson_id.0)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(course_id.flatten().map(CourseId))
    }

    async fn quiz_attempt(&self, attempt_id: QuizAttemptId) -> Result<Option<QuizAttemptRecord>> {
        let row = sqlx::query_as::<_, QuizAttemptRow>(
            r#"
            SELECT a.id, a.user_id, a.quiz_id, q.course_id
            FROM quiz_attempts a
            JOIN quizzes q ON q.id = a.quiz_id
            WHERE a.id = $1
            "#,
        )
        .bind(attempt_id.0)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.and_then(QuizAttemptRow::into_record))
    }

    async fn enrolled_course_ids(&self, user_id: UserId) -> Result<Vec<CourseId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT course_id FROM enrollments WHERE user_id = $1 AND course_id IS NOT NULL ORDER BY course_id",
        )
        .bind(user_id.0)
        .fetch_all(self.db.pool())
        .await?;

        Ok(ids.into_iter().map(CourseId).collect())
    }

    #[instrument(skip(self), fields(partition = %partition))]
    async fn list_course_ids(&self, partition: &ListPartition) -> Result<Vec<CourseId>> {
        let ids: Vec<i64> = match partition {
            ListPartition::Admin => {
                sqlx::query_scalar("SELECT id FROM courses ORDER BY id")
                    .fetch_all(self.db.pool())
                    .await?
            }
            ListPartition::Instructor(instructor_id) => {
                sqlx::query_scalar("SELECT id FROM courses WHERE instructor_id = $1 ORDER BY id")
                    .bind(instructor_id.0)
                    .fetch_all(self.db.pool())
                    .await?
            }
        };

        Ok(ids.into_iter().map(CourseId).collect())
    }

    #[instrument(skip(self))]
    async fn platform_totals(&self) -> Result<PlatformTotals> {
        let row = sqlx::query_as::<_, PlatformTotalsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM courses) AS total_courses,
                (SELECT COUNT(DISTINCT user_id) FROM enrollments) AS total_students,
                COUNT(*) AS total_enrollments,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed_enrollments
            FROM enrollments
            "#,
        )
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.into())
    }

    async fn platform_average_quiz_score(&self) -> Result<Option<f64>> {
        let avg: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(score_percent)::float8 FROM quiz_attempts WHERE status = 'completed'",
        )
        .fetch_one(self.db.pool())
        .await?;

        Ok(avg)
    }

    async fn ping(&self) -> Result<()> {
        self.db.check_connectivity().await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_row_with_nulls() {
        let record = CourseRecord::from(CourseRow {
            id: 42,
            title: None,
            instructor_id: None,
            display_name: None,
            status: None,
        });

        assert_eq!(record.id, CourseId(42));
        assert_eq!(record.title, "");
        assert_eq!(record.instructor_id, None);
        assert_eq!(record.instructor_name, None);
        assert_eq!(record.status, "");
    }

    #[test]
    fn test_course_row_with_owner() {
        let record = CourseRecord::from(CourseRow {
            id: 7,
            title: Some("Compilers".into()),
            instructor_id: Some(3),
            display_name: Some("Grace".into()),
            status: Some("publish".into()),
        });

        assert_eq!(record.instructor_id, Some(UserId(3)));
        assert_eq!(record.instructor_name.as_deref(), Some("Grace"));
    }

    #[test]
    fn test_quiz_attempt_without_course_is_unresolved() {
        let orphan = QuizAttemptRow {
            id: 1,
            user_id: Some(5),
            quiz_id: 9,
            course_id: None,
        };
        assert!(orphan.into_record().is_none());

        let anonymous = QuizAttemptRow {
            id: 2,
            user_id: None,
            quiz_id: 9,
            course_id: Some(42),
        };
        assert!(anonymous.into_record().is_none());

        let resolved = QuizAttemptRow {
            id: 3,
            user_id: Some(5),
            quiz_id: 9,
            course_id: Some(42),
        };
        assert_eq!(
            resolved.into_record(),
            Some(QuizAttemptRecord {
                id: QuizAttemptId(3),
                user_id: UserId(5),
                quiz_id: QuizId(9),
                course_id: CourseId(42),
            })
        );
    }
}
