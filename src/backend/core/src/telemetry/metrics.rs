//! Prometheus metrics.
//!
//! Counters are emitted inline with the `metrics` macros where the work
//! happens; this module installs the recorder and registers descriptions.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and describe every metric.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    tracing::info!("Metrics recorder installed");
    Ok(handle)
}

/// Register metric descriptions.
pub fn describe_metrics() {
    // Cache facade
    describe_counter!("cache_hits_total", "Cache lookups that found a live entry");
    describe_counter!(
        "cache_misses_total",
        "Cache lookups that found nothing, by reason (absent, backend_error, decode_error)"
    );
    describe_counter!("cache_sets_total", "Entries written to the cache");
    describe_counter!("cache_deletes_total", "Explicit cache deletions");
    describe_counter!(
        "cache_flushes_total",
        "Namespace flushes, by mode (prefix or generation)"
    );
    describe_counter!(
        "cache_backend_errors_total",
        "Cache backend failures absorbed by the facade, by operation"
    );
    describe_counter!("cache_evictions_total", "Entries evicted by the in-memory LRU");
    describe_gauge!("cache_generation", "Current namespace generation");

    // Invalidation
    describe_counter!(
        "cache_invalidations_total",
        "Invalidation trigger runs, by domain event"
    );
    describe_counter!("list_version_bumps_total", "Course-list version bumps, by partition kind");

    // Statistics
    describe_counter!(
        "stats_generations_total",
        "Derived statistics recomputed on a cache miss, by kind"
    );
    describe_counter!(
        "stats_submetric_failures_total",
        "Sub-metric queries that failed and were zeroed, by metric"
    );

    // Errors
    describe_counter!("coursepulse_errors_total", "Errors constructed, by code and category");
}
