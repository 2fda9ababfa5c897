//! Configuration management.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `COURSEPULSE__SECTION__KEY` environment variables.

use std::time::Duration;

use serde::Deserialize;

use crate::cache::ExpiryTier;
use crate::telemetry::LogFormat;

/// Environment variable prefix for every setting.
pub const ENV_PREFIX: &str = "COURSEPULSE";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret required on `/api/v1` routes when set
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL of the LMS database
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout: default_acquire_timeout(),
        }
    }
}

/// Which cache backend the server should construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub backend: BackendKind,

    /// Namespace every key is stored under
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Capacity of the in-memory backend
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default)]
    pub tiers: TierSettings,

    /// Age after which a list version stamp is regenerated
    #[serde(default = "default_list_version_retention", with = "humantime_serde")]
    pub list_version_retention: Duration,

    /// Whether a lookup of a nonexistent course is itself cached
    #[serde(default = "default_cache_missing_courses")]
    pub cache_missing_courses: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            namespace: default_namespace(),
            max_entries: default_max_entries(),
            redis_url: default_redis_url(),
            tiers: TierSettings::default(),
            list_version_retention: default_list_version_retention(),
            cache_missing_courses: default_cache_missing_courses(),
        }
    }
}

/// Durations behind the three expiry tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TierSettings {
    #[serde(default = "default_short_tier", with = "humantime_serde")]
    pub short: Duration,

    #[serde(default = "default_default_tier", with = "humantime_serde")]
    pub default: Duration,

    #[serde(default = "default_long_tier", with = "humantime_serde")]
    pub long: Duration,
}

impl TierSettings {
    pub fn duration(&self, tier: ExpiryTier) -> Duration {
        match tier {
            ExpiryTier::Short => self.short,
            ExpiryTier::Default => self.default,
            ExpiryTier::Long => self.long,
        }
    }
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            short: default_short_tier(),
            default: default_default_tier(),
            long: default_long_tier(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// OpenTelemetry OTLP endpoint
    pub otlp_endpoint: Option<String>,

    /// Log level / EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_database_url() -> String { "postgres://coursepulse@localhost:5432/lms".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_namespace() -> String { "coursepulse".to_string() }
fn default_max_entries() -> usize { 10_000 }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_short_tier() -> Duration { Duration::from_secs(60) }
fn default_default_tier() -> Duration { Duration::from_secs(300) }
fn default_long_tier() -> Duration { Duration::from_secs(3600) }
fn default_list_version_retention() -> Duration { Duration::from_secs(3600) }
fn default_cache_missing_courses() -> bool { true }
fn default_log_level() -> String { "info".to_string() }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> crate::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides on top.
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.cache.backend, BackendKind::Memory);
        assert_eq!(cfg.cache.namespace, "coursepulse");
        assert_eq!(cfg.cache.tiers.duration(ExpiryTier::Short), Duration::from_secs(60));
        assert_eq!(cfg.cache.tiers.duration(ExpiryTier::Default), Duration::from_secs(300));
        assert_eq!(cfg.cache.tiers.duration(ExpiryTier::Long), Duration::from_secs(3600));
        assert!(cfg.cache.cache_missing_courses);
        assert_eq!(cfg.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9000
api_key = "s3cret"

[cache]
backend = "redis"
namespace = "lms-stats"
list_version_retention = "30m"
cache_missing_courses = false

[cache.tiers]
short = "15s"
long = "2h"

[observability]
log_format = "pretty"
"#
        )
        .unwrap();

        let cfg = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.api_key.as_deref(), Some("s3cret"));
        assert_eq!(cfg.cache.backend, BackendKind::Redis);
        assert_eq!(cfg.cache.namespace, "lms-stats");
        assert_eq!(cfg.cache.list_version_retention, Duration::from_secs(1800));
        assert!(!cfg.cache.cache_missing_courses);
        assert_eq!(cfg.cache.tiers.short, Duration::from_secs(15));
        assert_eq!(cfg.cache.tiers.default, Duration::from_secs(300));
        assert_eq!(cfg.cache.tiers.long, Duration::from_secs(7200));
        assert_eq!(cfg.observability.log_format, LogFormat::Pretty);
        // untouched sections fall back to defaults
        assert_eq!(cfg.database.max_connections, 20);
    }
}
