//! Identifiers, store records, and the derived values that get cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// A course in the host LMS.
    CourseId
);
id_type!(
    /// A learner or instructor account.
    UserId
);
id_type!(LessonId);
id_type!(QuizAttemptId);
id_type!(QuizId);

// ═══════════════════════════════════════════════════════════════════════════════
// List Partitions
// ═══════════════════════════════════════════════════════════════════════════════

/// A course-list view whose membership is versioned independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "instructor_id", rename_all = "snake_case")]
pub enum ListPartition {
    /// Every course on the platform.
    Admin,
    /// Courses owned by one instructor.
    Instructor(UserId),
}

impl ListPartition {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Instructor(_) => "instructor",
        }
    }

    /// Whether a snapshot belongs in this view as of its generation.
    pub fn includes(&self, snapshot: &CourseStatsSnapshot) -> bool {
        match self {
            Self::Admin => true,
            Self::Instructor(id) => snapshot.instructor_id == Some(*id),
        }
    }
}

impl fmt::Display for ListPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::Instructor(id) => write!(f, "instructor:{}", id),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store Records
// ═══════════════════════════════════════════════════════════════════════════════

/// A course row as the store reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub id: CourseId,
    pub title: String,
    /// `None` for courses with no owner on record
    pub instructor_id: Option<UserId>,
    pub instructor_name: Option<String>,
    pub status: String,
}

/// Enrollment totals for one course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentCounts {
    pub total: u64,
    pub completed: u64,
}

/// The owner and course of a finalized quiz attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAttemptRecord {
    pub id: QuizAttemptId,
    pub user_id: UserId,
    pub quiz_id: QuizId,
    pub course_id: CourseId,
}

/// Platform-wide counts behind the dashboard overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformTotals {
    pub total_courses: u64,
    /// Distinct users with at least one enrollment
    pub total_students: u64,
    pub total_enrollments: u64,
    pub completed_enrollments: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Derived Values
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregate statistics for one course. Always recomputed as a whole.
///
/// Percentages are in `[0, 100]` with one decimal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStatsSnapshot {
    pub id: CourseId,
    pub title: String,
    /// Owner at generation time. Read back by triggers to find the list
    /// partition a course is cached under.
    #[serde(default)]
    pub instructor_id: Option<UserId>,
    pub instructor_name: String,
    pub student_count: u64,
    pub completed_students: u64,
    pub completion_rate: f64,
    pub avg_progression: f64,
    pub avg_quiz_score: f64,
    pub status: String,
    pub generated_at: DateTime<Utc>,
}

/// Platform totals for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardOverview {
    pub total_courses: u64,
    pub total_students: u64,
    pub total_enrollments: u64,
    pub completed_enrollments: u64,
    pub completion_rate: f64,
    pub avg_quiz_score: f64,
    pub generated_at: DateTime<Utc>,
}

/// One learner's progress through one course, as a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub progress: f64,
}
