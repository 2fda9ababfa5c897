//! Health check command.
//!
//! Queries the `/health` endpoint and displays component status.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Include per-component status
    #[arg(short, long)]
    detailed: bool,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;

    if !matches!(format, OutputFormat::Table) {
        return output::print_item(&health, format);
    }

    let status = health
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    output::print_header("System Health");
    output::print_detail("Status", status);
    output::print_detail("API URL", client.base_url());

    if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
        output::print_detail("Version", version);
    }

    if let Some(ts) = health.get("timestamp").and_then(|v| v.as_str()) {
        output::print_detail("Timestamp", ts);
    }

    if args.detailed {
        if let Some(components) = health.get("components").and_then(|v| v.as_object()) {
            output::print_header("Components");
            for (name, component) in components {
                let comp_status = component
                    .get("status")
                    .and_then(|v| v.as_str())
                    .unwrap_or("?");
                match component.get("error").and_then(|v| v.as_str()) {
                    Some(error) => output::print_detail(name, &format!("{} ({})", comp_status, error)),
                    None => output::print_detail(name, comp_status),
                }
            }
        }
    }

    match status {
        "healthy" => output::print_success("All systems operational"),
        "degraded" => output::print_info("Serving without cache; reads go to the database"),
        _ => output::print_error(&format!("System status: {}", status)),
    }

    Ok(())
}
