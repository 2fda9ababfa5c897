//! Course statistics commands: per-course stats, course lists, learner
//! progress and the platform overview.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum CourseCommands {
    /// Show statistics for one course
    Stats {
        /// Course ID
        course_id: i64,
    },

    /// List course statistics (all courses, or one instructor's)
    List {
        /// Only courses owned by this instructor
        #[arg(short, long)]
        instructor: Option<i64>,
    },
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
struct CourseStats {
    id: i64,
    title: String,
    instructor_name: Option<String>,
    student_count: u64,
    completed_students: u64,
    completion_rate: f64,
    avg_progression: f64,
    avg_quiz_score: f64,
    status: String,
    generated_at: DateTime<Utc>,
}

#[derive(Debug, Tabled)]
struct CourseRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Instructor")]
    instructor: String,
    #[tabled(rename = "Students")]
    students: u64,
    #[tabled(rename = "Completed")]
    completed: u64,
    #[tabled(rename = "Completion")]
    completion_rate: String,
    #[tabled(rename = "Avg Quiz")]
    avg_quiz_score: String,
}

impl From<&CourseStats> for CourseRow {
    fn from(s: &CourseStats) -> Self {
        Self {
            id: s.id,
            title: s.title.clone(),
            instructor: s.instructor_name.clone().unwrap_or_else(|| "-".into()),
            students: s.student_count,
            completed: s.completed_students,
            completion_rate: output::percent(s.completion_rate),
            avg_quiz_score: output::percent(s.avg_quiz_score),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct UserProgress {
    user_id: i64,
    course_id: i64,
    progress: f64,
}

#[derive(Debug, Deserialize, Serialize)]
struct Overview {
    total_courses: u64,
    total_students: u64,
    total_enrollments: u64,
    completed_enrollments: u64,
    completion_rate: f64,
    avg_quiz_score: f64,
    generated_at: DateTime<Utc>,
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: CourseCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        CourseCommands::Stats { course_id } => {
            let stats: CourseStats = client
                .get(&format!("/api/v1/courses/{}/stats", course_id))
                .await?;

            match format {
                OutputFormat::Table => {
                    output::print_header(&format!("Course {}: {}", stats.id, stats.title));
                    output::print_detail(
                        "Instructor",
                        stats.instructor_name.as_deref().unwrap_or("-"),
                    );
                    output::print_detail("Status", &stats.status);
                    output::print_detail("Students", &stats.student_count.to_string());
                    output::print_detail("Completed", &stats.completed_students.to_string());
                    output::print_detail("Completion rate", &output::percent(stats.completion_rate));
                    output::print_detail("Avg progression", &output::percent(stats.avg_progression));
                    output::print_detail("Avg quiz score", &output::percent(stats.avg_quiz_score));
                    output::print_detail("Generated at", &stats.generated_at.to_rfc3339());
                    Ok(())
                }
                _ => output::print_item(&stats, format),
            }
        }

        CourseCommands::List { instructor } => {
            let path = match instructor {
                Some(id) => format!("/api/v1/courses?instructor={}", id),
                None => "/api/v1/courses".to_string(),
            };
            let courses: Vec<CourseStats> = client.get(&path).await?;
            let rows: Vec<CourseRow> = courses.iter().map(CourseRow::from).collect();
            output::print_list(&rows, &courses, format)
        }
    }
}

pub async fn progress(user_id: i64, course_id: i64, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let progress: UserProgress = client
        .get(&format!("/api/v1/users/{}/courses/{}/progress", user_id, course_id))
        .await?;

    match format {
        OutputFormat::Table => {
            output::print_header("Learner Progress");
            output::print_detail("User", &progress.user_id.to_string());
            output::print_detail("Course", &progress.course_id.to_string());
            output::print_detail("Progress", &output::percent(progress.progress));
            Ok(())
        }
        _ => output::print_item(&progress, format),
    }
}

pub async fn overview(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let overview: Overview = client.get("/api/v1/overview").await?;

    match format {
        OutputFormat::Table => {
            output::print_header("Platform Overview");
            output::print_detail("Courses", &overview.total_courses.to_string());
            output::print_detail("Students", &overview.total_students.to_string());
            output::print_detail("Enrollments", &overview.total_enrollments.to_string());
            output::print_detail("Completed", &overview.completed_enrollments.to_string());
            output::print_detail("Completion rate", &output::percent(overview.completion_rate));
            output::print_detail("Avg quiz score", &output::percent(overview.avg_quiz_score));
            output::print_detail("Generated at", &overview.generated_at.to_rfc3339());
            Ok(())
        }
        _ => output::print_item(&overview, format),
    }
}
