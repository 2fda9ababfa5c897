//! Cache administration: flush, statistics and the invalidation log.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Remove every cached entry in the server's namespace
    Flush {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Show cache statistics
    Stats,

    /// Show recent invalidations
    Log {
        /// Maximum number of entries
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
struct FlushResult {
    mode: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct CacheStats {
    hits: u64,
    misses: u64,
    entries: u64,
    evictions: u64,
    hit_rate: f64,
    #[serde(default)]
    backend_stats: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct InvalidationRecord {
    event: serde_json::Value,
    keys: Vec<String>,
    removed: u64,
    #[serde(default)]
    versions_bumped: Vec<serde_json::Value>,
    #[serde(default)]
    flush: Option<String>,
    #[serde(default)]
    skipped: Option<String>,
    timestamp: DateTime<Utc>,
    duration_ms: u64,
}

#[derive(Debug, Tabled)]
struct InvalidationRow {
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Keys")]
    keys: usize,
    #[tabled(rename = "Removed")]
    removed: u64,
    #[tabled(rename = "Versions")]
    versions: usize,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "ms")]
    duration_ms: u64,
}

impl From<&InvalidationRecord> for InvalidationRow {
    fn from(r: &InvalidationRecord) -> Self {
        let outcome = match (&r.flush, &r.skipped) {
            (Some(mode), _) => format!("flush ({})", mode),
            (None, Some(reason)) => format!("skipped: {}", reason),
            (None, None) => "evicted".to_string(),
        };
        Self {
            timestamp: r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            event: r
                .event
                .get("event")
                .and_then(|v| v.as_str())
                .unwrap_or("?")
                .to_string(),
            keys: r.keys.len(),
            removed: r.removed,
            versions: r.versions_bumped.len(),
            outcome,
            duration_ms: r.duration_ms,
        }
    }
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: CacheCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        CacheCommands::Flush { force } => {
            if !force {
                output::print_info("This will drop every cached statistic. Use --force to confirm.");
                return Ok(());
            }

            let result: FlushResult = client.post_empty("/api/v1/cache/flush").await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Cache flushed ({})", result.mode));
                    Ok(())
                }
                _ => output::print_item(&result, format),
            }
        }

        CacheCommands::Stats => {
            let stats: CacheStats = client.get("/api/v1/cache/stats").await?;
            match format {
                OutputFormat::Table => {
                    output::print_header("Cache Statistics");
                    output::print_detail("Entries", &stats.entries.to_string());
                    output::print_detail("Hits", &stats.hits.to_string());
                    output::print_detail("Misses", &stats.misses.to_string());
                    output::print_detail("Hit rate", &output::percent(stats.hit_rate * 100.0));
                    output::print_detail("Evictions", &stats.evictions.to_string());
                    for (k, v) in &stats.backend_stats {
                        output::print_detail(k, v);
                    }
                    Ok(())
                }
                _ => output::print_item(&stats, format),
            }
        }

        CacheCommands::Log { limit } => {
            let records: Vec<InvalidationRecord> = client
                .get(&format!("/api/v1/cache/invalidations?limit={}", limit))
                .await?;
            let rows: Vec<InvalidationRow> = records.iter().map(InvalidationRow::from).collect();
            output::print_list(&rows, &records, format)
        }
    }
}
