//! CoursePulse CLI - query course analytics and administer the cache.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{cache, config, course, event, health};
use output::OutputFormat;

/// CoursePulse - course analytics CLI
#[derive(Parser)]
#[command(
    name = "coursepulse",
    version,
    about = "CoursePulse - course analytics for your LMS",
    long_about = "Query cached course statistics, publish platform events, and manage the analytics cache.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "COURSEPULSE_API_URL")]
    api_url: Option<String>,

    /// API key for /api/v1 routes
    #[arg(long, global = true, env = "COURSEPULSE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Course statistics
    #[command(subcommand)]
    Course(course::CourseCommands),

    /// One learner's progress through a course
    Progress {
        /// User ID
        user_id: i64,
        /// Course ID
        course_id: i64,
    },

    /// Platform-wide totals
    Overview,

    /// Publish a platform event
    #[command(subcommand)]
    Event(event::EventCommands),

    /// Cache administration
    #[command(subcommand)]
    Cache(cache::CacheCommands),

    /// Check system health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let saved = config::load_saved();
    let api_url = cli
        .api_url
        .clone()
        .or(saved.api_url)
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let api_key = cli.api_key.clone().or(saved.api_key);

    let client = client::ApiClient::new(&api_url, api_key)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Course(cmd) => course::execute(cmd, &client, format).await,
        Commands::Progress { user_id, course_id } => {
            course::progress(user_id, course_id, &client, format).await
        }
        Commands::Overview => course::overview(&client, format).await,
        Commands::Event(cmd) => event::execute(cmd, &client, format).await,
        Commands::Cache(cmd) => cache::execute(cmd, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
