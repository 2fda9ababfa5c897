//! Course statistics: the data model, the store interface the generators
//! read from, the generators themselves, and the cache-backed accessors.
//!
//! ```text
//! caller ─▶ StatsService ─▶ Cache ──hit──▶ value
//!                              │
//!                             miss
//!                              ▼
//!                          generator ─▶ LearningStore ─▶ value (stored, returned)
//! ```

pub mod generator;
pub mod memory;
pub mod model;
pub mod service;
pub mod store;

pub use memory::{InMemoryStore, StoreOp};
pub use model::{
    CourseId, CourseRecord, CourseStatsSnapshot, DashboardOverview, EnrollmentCounts, LessonId,
    ListPartition, PlatformTotals, QuizAttemptId, QuizAttemptRecord, QuizId, UserId,
    UserProgress,
};
pub use service::StatsService;
pub use store::LearningStore;
