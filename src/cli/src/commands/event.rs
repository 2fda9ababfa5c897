//! Publish domain events to the server.
//!
//! The server dispatches each event synchronously, so by the time the
//! command returns the affected cache entries are gone.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum EventCommands {
    /// A course was created or edited
    CourseUpdated {
        /// Course ID
        course_id: i64,
    },

    /// A user enrolled in a course
    UserEnrolled {
        /// User ID
        user_id: i64,
        /// Course ID
        course_id: i64,
    },

    /// A user completed a lesson
    LessonCompleted {
        /// User ID
        user_id: i64,
        /// Lesson ID
        lesson_id: i64,
    },

    /// A quiz attempt was finalized
    QuizFinished {
        /// Quiz attempt ID
        attempt_id: i64,
    },

    /// The analytics plugin was switched on
    PluginActivated,

    /// The analytics plugin was switched off
    PluginDeactivated,
}

impl EventCommands {
    fn payload(&self) -> serde_json::Value {
        use serde_json::json;

        match self {
            Self::CourseUpdated { course_id } => {
                json!({ "event": "course_updated", "course_id": course_id })
            }
            Self::UserEnrolled { user_id, course_id } => {
                json!({ "event": "user_enrolled", "user_id": user_id, "course_id": course_id })
            }
            Self::LessonCompleted { user_id, lesson_id } => {
                json!({ "event": "lesson_completed", "user_id": user_id, "lesson_id": lesson_id })
            }
            Self::QuizFinished { attempt_id } => {
                json!({ "event": "quiz_finished", "attempt_id": attempt_id })
            }
            Self::PluginActivated => json!({ "event": "plugin_activated" }),
            Self::PluginDeactivated => json!({ "event": "plugin_deactivated" }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct EventAccepted {
    event: String,
    handlers: usize,
}

pub async fn execute(cmd: EventCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let accepted: EventAccepted = client.post("/api/v1/events", &cmd.payload()).await?;

    match format {
        OutputFormat::Table => {
            output::print_success(&format!(
                "{} dispatched to {} handler(s)",
                accepted.event, accepted.handlers
            ));
            Ok(())
        }
        _ => output::print_item(&accepted, format),
    }
}
