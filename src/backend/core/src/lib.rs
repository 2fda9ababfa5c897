#![allow(clippy::result_large_err)]
//! # CoursePulse Core
//!
//! Course analytics for a learning-management platform, served from a cache
//! that domain events keep fresh.
//!
//! ## Architecture
//!
//! - **Cache**: pluggable backends, key groups, expiry tiers, bulk flush with a
//!   generation fallback, per-partition list versions
//! - **Stats**: generators that derive course statistics from the LMS data,
//!   and read-through accessors over them
//! - **Events**: a synchronous in-process bus for platform events
//! - **Invalidation**: triggers that evict exactly the entries an event makes stale
//! - **API**: REST surface over the accessors, event ingestion and cache administration
//! - **Telemetry**: structured logging and Prometheus metrics

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod invalidation;
pub mod stats;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, PulseError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{
        Cache, CacheBackend, CacheConfig, CacheGroup, CacheKey, CacheStats, ExpiryTier, FlushMode,
        InMemoryBackend, InMemoryConfig, ListVersions, Lookup, RedisBackend, RedisConfig,
    };
    pub use crate::config::{CacheSettings, Config};
    pub use crate::error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, PulseError, Result};
    pub use crate::events::{DomainEvent, EventBus, EventHandler, EventKind, Subscription};
    pub use crate::invalidation::{InvalidationLog, InvalidationRecord, InvalidationTriggers};
    pub use crate::stats::{
        CourseId, CourseStatsSnapshot, DashboardOverview, InMemoryStore, LearningStore, LessonId,
        ListPartition, QuizAttemptId, StatsService, UserId, UserProgress,
    };
}
