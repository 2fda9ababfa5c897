//! Database layer for CoursePulse.
//!
//! Reads the host LMS's PostgreSQL database with sqlx. The schema is owned
//! by the LMS; nothing here writes to it or migrates it.

mod store;

use std::time::{Duration, Instant};

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::Result;

pub use store::PgLearningStore;

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    max_connections: u32,
    min_connections: u32,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("pool_size", &self.pool.size())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Database {
    /// Open a pool and wait for the first connection.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config).connect(&config.url).await?;
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Database pool ready"
        );
        Ok(Self::from_pool(pool, config))
    }

    /// Build a pool that connects on first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config).connect_lazy(&config.url)?;
        Ok(Self::from_pool(pool, config))
    }

    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
    }

    fn from_pool(pool: PgPool, config: &DatabaseConfig) -> Self {
        Self {
            pool,
            max_connections: config.max_connections,
            min_connections: config.min_connections,
        }
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query; returns its latency.
    #[instrument(skip(self))]
    pub async fn check_connectivity(&self) -> Result<Duration> {
        let started = Instant::now();
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(started.elapsed())
    }

    pub fn pool_metrics(&self) -> PoolMetrics {
        let pool_size = self.pool.size();
        let idle_connections = self.pool.num_idle() as u32;
        let active_connections = pool_size.saturating_sub(idle_connections);
        let utilization_pct = if self.max_connections > 0 {
            active_connections as f64 / self.max_connections as f64 * 100.0
        } else {
            0.0
        };

        PoolMetrics {
            pool_size,
            idle_connections,
            active_connections,
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            utilization_pct,
        }
    }
}

/// Snapshot of the connection pool.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolMetrics {
    pub pool_size: u32,
    pub idle_connections: u32,
    pub active_connections: u32,
    pub max_connections: u32,
    pub min_connections: u32,
    pub utilization_pct: f64,
}
