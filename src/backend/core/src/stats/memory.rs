//! In-process [`LearningStore`] for tests, demos and benchmarks.
//!
//! Holds the same relations the LMS schema does (courses, enrollments,
//! lessons, lesson completions, quizzes, attempts) and answers the store
//! queries from them. Individual queries can be made to fail, and every
//! query is counted, so callers can assert how often the store was hit.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::model::{
    CourseId, CourseRecord, EnrollmentCounts, LessonId, ListPartition, PlatformTotals,
    QuizAttemptId, QuizAttemptRecord, QuizId, UserId,
};
use super::store::LearningStore;
use crate::error::{ErrorCode, PulseError, Result};

/// Store queries, for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    FindCourse,
    EnrollmentCounts,
    AverageQuizScore,
    AverageProgression,
    UserProgress,
    LessonCourse,
    QuizAttempt,
    EnrolledCourses,
    ListCourses,
    PlatformTotals,
    PlatformQuizScore,
}

const ALL_OPS: usize = 11;

impl StoreOp {
    const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnrollmentStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    user_id: UserId,
    quiz_id: QuizId,
    score: f64,
    finalized: bool,
}

#[derive(Debug, Default)]
struct Data {
    users: HashMap<UserId, String>,
    courses: BTreeMap<CourseId, CourseRecord>,
    enrollments: BTreeMap<(UserId, CourseId), EnrollmentStatus>,
    lessons: HashMap<LessonId, CourseId>,
    completed_lessons: HashSet<(UserId, LessonId)>,
    quizzes: HashMap<QuizId, CourseId>,
    attempts: BTreeMap<QuizAttemptId, Attempt>,
}

impl Data {
    fn progress(&self, user_id: UserId, course_id: CourseId) -> f64 {
        let lessons: Vec<LessonId> = self
            .lessons
            .iter()
            .filter(|(_, course)| **course == course_id)
            .map(|(lesson, _)| *lesson)
            .collect();
        if lessons.is_empty() {
            return 0.0;
        }
        let done = lessons
            .iter()
            .filter(|lesson| self.completed_lessons.contains(&(user_id, **lesson)))
            .count();
        done as f64 / lessons.len() as f64 * 100.0
    }

    fn enrolled_users(&self, course_id: CourseId) -> impl Iterator<Item = UserId> + '_ {
        self.enrollments
            .keys()
            .filter(move |(_, course)| *course == course_id)
            .map(|(user, _)| *user)
    }
}

/// A complete learning store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<Data>,
    failing: RwLock<HashSet<StoreOp>>,
    calls: [AtomicU64; ALL_OPS],
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fixtures
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_user(&self, user_id: UserId, display_name: impl Into<String>) {
        self.data.write().users.insert(user_id, display_name.into());
    }

    /// Insert or replace a published course.
    pub fn add_course(&self, course_id: CourseId, title: impl Into<String>, instructor_id: UserId) {
        let mut data = self.data.write();
        let instructor_name = data.users.get(&instructor_id).cloned();
        data.courses.insert(
            course_id,
            CourseRecord {
                id: course_id,
                title: title.into(),
                instructor_id: Some(instructor_id),
                instructor_name,
                status: "publish".to_string(),
            },
        );
    }

    /// Edit a course row in place. Returns false when the course is unknown.
    pub fn update_course(&self, course_id: CourseId, edit: impl FnOnce(&mut CourseRecord)) -> bool {
        match self.data.write().courses.get_mut(&course_id) {
            Some(course) => {
                edit(course);
                true
            }
            None => false,
        }
    }

    /// Hand a course to another instructor. Returns false when the course is unknown.
    pub fn transfer_course(&self, course_id: CourseId, instructor_id: UserId) -> bool {
        let mut data = self.data.write();
        let instructor_name = data.users.get(&instructor_id).cloned();
        match data.courses.get_mut(&course_id) {
            Some(course) => {
                course.instructor_id = Some(instructor_id);
                course.instructor_name = instructor_name;
                true
            }
            None => false,
        }
    }

    pub fn remove_course(&self, course_id: CourseId) {
        self.data.write().courses.remove(&course_id);
    }

    pub fn enroll(&self, user_id: UserId, course_id: CourseId) {
        self.data
            .write()
            .enrollments
            .insert((user_id, course_id), EnrollmentStatus::Active);
    }

    /// Mark an enrollment completed, enrolling first if needed.
    pub fn complete_course(&self, user_id: UserId, course_id: CourseId) {
        self.data
            .write()
            .enrollments
            .insert((user_id, course_id), EnrollmentStatus::Completed);
    }

    pub fn add_lesson(&self, lesson_id: LessonId, course_id: CourseId) {
        self.data.write().lessons.insert(lesson_id, course_id);
    }

    pub fn complete_lesson(&self, user_id: UserId, lesson_id: LessonId) {
        self.data
            .write()
            .completed_lessons
            .insert((user_id, lesson_id));
    }

    pub fn add_quiz(&self, quiz_id: QuizId, course_id: CourseId) {
        self.data.write().quizzes.insert(quiz_id, course_id);
    }

    /// Record a finalized attempt with a 0-100 score.
    pub fn record_attempt(&self, attempt_id: QuizAttemptId, user_id: UserId, quiz_id: QuizId, score: f64) {
        self.data.write().attempts.insert(
            attempt_id,
            Attempt {
                user_id,
                quiz_id,
                score,
                finalized: true,
            },
        );
    }

    /// Record an attempt still in progress; it does not count toward scores.
    pub fn start_attempt(&self, attempt_id: QuizAttemptId, user_id: UserId, quiz_id: QuizId) {
        self.data.write().attempts.insert(
            attempt_id,
            Attempt {
                user_id,
                quiz_id,
                score: 0.0,
                finalized: false,
            },
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fault injection and call counting
    // ─────────────────────────────────────────────────────────────────────────

    /// Make a query fail until [`recover`](Self::recover) is called.
    pub fn fail(&self, op: StoreOp) {
        self.failing.write().insert(op);
    }

    pub fn recover(&self, op: StoreOp) {
        self.failing.write().remove(&op);
    }

    /// How many times a query has been issued.
    pub fn calls(&self, op: StoreOp) -> u64 {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    fn enter(&self, op: StoreOp) -> Result<()> {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        if self.failing.read().contains(&op) {
            return Err(PulseError::with_internal(
                ErrorCode::DatabaseQueryFailed,
                "A database error occurred",
                format!("injected failure for {:?}", op),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LearningStore for InMemoryStore {
    async fn find_course(&self, course_id: CourseId) -> Result<Option<CourseRecord>> {
        self.enter(StoreOp::FindCourse)?;
        Ok(self.data.read().courses.get(&course_id).cloned())
    }

    async fn enrollment_counts(&self, course_id: CourseId) -> Result<EnrollmentCounts> {
        self.enter(StoreOp::EnrollmentCounts)?;
        let data = self.data.read();
        let mut counts = EnrollmentCounts::default();
        for ((_, course), status) in &data.enrollments {
            if *course == course_id {
                counts.total += 1;
                if *status == EnrollmentStatus::Completed {
                    counts.completed += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn average_quiz_score(&self, course_id: CourseId) -> Result<Option<f64>> {
        self.enter(StoreOp::AverageQuizScore)?;
        let data = self.data.read();
        let scores: Vec<f64> = data
            .attempts
            .values()
            .filter(|a| a.finalized && data.quizzes.get(&a.quiz_id) == Some(&course_id))
            .map(|a| a.score)
            .collect();
        Ok(mean(&scores))
    }

    async fn average_progression(&self, course_id: CourseId) -> Result<Option<f64>> {
        self.enter(StoreOp::AverageProgression)?;
        let data = self.data.read();
        let progress: Vec<f64> = data
            .enrolled_users(course_id)
            .map(|user| data.progress(user, course_id))
            .collect();
        Ok(mean(&progress))
    }

    async fn user_progress(&self, user_id: UserId, course_id: CourseId) -> Result<Option<f64>> {
        self.enter(StoreOp::UserProgress)?;
        let data = self.data.read();
        if !data.enrollments.contains_key(&(user_id, course_id)) {
            return Ok(None);
        }
        Ok(Some(data.progress(user_id, course_id)))
    }

    async fn lesson_course(&self, lesson_id: LessonId) -> Result<Option<CourseId>> {
        self.enter(StoreOp::LessonCourse)?;
        Ok(self.data.read().lessons.get(&lesson_id).copied())
    }

    async fn quiz_attempt(&self, attempt_id: QuizAttemptId) -> Result<Option<QuizAttemptRecord>> {
        self.enter(StoreOp::QuizAttempt)?;
        let data = self.data.read();
        let record = data.attempts.get(&attempt_id).and_then(|attempt| {
            let course_id = *data.quizzes.get(&attempt.quiz_id)?;
            Some(QuizAttemptRecord {
                id: attempt_id,
                user_id: attempt.user_id,
                quiz_id: attempt.quiz_id,
                course_id,
            })
        });
        Ok(record)
    }

    async fn enrolled_course_ids(&self, user_id: UserId) -> Result<Vec<CourseId>> {
        self.enter(StoreOp::EnrolledCourses)?;
        Ok(self
            .data
            .read()
            .enrollments
            .keys()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, course)| *course)
            .collect())
    }

    async fn list_course_ids(&self, partition: &ListPartition) -> Result<Vec<CourseId>> {
        self.enter(StoreOp::ListCourses)?;
        let data = self.data.read();
        let ids = data
            .courses
            .values()
            .filter(|course| match partition {
                ListPartition::Admin => true,
                ListPartition::Instructor(instructor) => course.instructor_id == Some(*instructor),
            })
            .map(|course| course.id)
            .collect();
        Ok(ids)
    }

    async fn platform_totals(&self) -> Result<PlatformTotals> {
        self.enter(StoreOp::PlatformTotals)?;
        let data = self.data.read();
        let students: HashSet<UserId> = data.enrollments.keys().map(|(user, _)| *user).collect();
        Ok(PlatformTotals {
            total_courses: data.courses.len() as u64,
            total_students: students.len() as u64,
            total_enrollments: data.enrollments.len() as u64,
            completed_enrollments: data
                .enrollments
                .values()
                .filter(|status| **status == EnrollmentStatus::Completed)
                .count() as u64,
        })
    }

    async fn platform_average_quiz_score(&self) -> Result<Option<f64>> {
        self.enter(StoreOp::PlatformQuizScore)?;
        let data = self.data.read();
        let scores: Vec<f64> = data
            .attempts
            .values()
            .filter(|a| a.finalized)
            .map(|a| a.score)
            .collect();
        Ok(mean(&scores))
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
