//! Domain events emitted by the learning platform.
//!
//! Payloads carry identifiers only; handlers resolve anything else they need
//! from the store.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stats::model::{CourseId, LessonId, QuizAttemptId, UserId};

/// Something happened on the platform that may make cached values stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A course entity was created or edited.
    CourseUpdated { course_id: CourseId },
    /// A user enrolled in a course.
    UserEnrolled { user_id: UserId, course_id: CourseId },
    /// A user marked a lesson completed.
    LessonCompleted { user_id: UserId, lesson_id: LessonId },
    /// A quiz attempt was finalized.
    QuizFinished { attempt_id: QuizAttemptId },
    /// The analytics plugin was switched on.
    PluginActivated,
    /// The analytics plugin was switched off.
    PluginDeactivated,
}

impl DomainEvent {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::CourseUpdated { .. } => EventKind::CourseUpdated,
            Self::UserEnrolled { .. } => EventKind::UserEnrolled,
            Self::LessonCompleted { .. } => EventKind::LessonCompleted,
            Self::QuizFinished { .. } => EventKind::QuizFinished,
            Self::PluginActivated => EventKind::PluginActivated,
            Self::PluginDeactivated => EventKind::PluginDeactivated,
        }
    }
}

/// Event names handlers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CourseUpdated,
    UserEnrolled,
    LessonCompleted,
    QuizFinished,
    PluginActivated,
    PluginDeactivated,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::CourseUpdated,
        EventKind::UserEnrolled,
        EventKind::LessonCompleted,
        EventKind::QuizFinished,
        EventKind::PluginActivated,
        EventKind::PluginDeactivated,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CourseUpdated => "course_updated",
            Self::UserEnrolled => "user_enrolled",
            Self::LessonCompleted => "lesson_completed",
            Self::QuizFinished => "quiz_finished",
            Self::PluginActivated => "plugin_activated",
            Self::PluginDeactivated => "plugin_deactivated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
