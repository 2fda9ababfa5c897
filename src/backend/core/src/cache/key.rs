//! Cache key generation.
//!
//! A key is a [`CacheGroup`] plus ordered segments. The facade prefixes it
//! with the namespace and the current generation before it reaches a backend:
//!
//! ```text
//! coursepulse:0:course_stats:42
//! coursepulse:0:user_progress:7:42
//! coursepulse:0:course_list:instructor:3:v1718000000123
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::stats::model::{CourseId, ListPartition, UserId};

// ═══════════════════════════════════════════════════════════════════════════════
// Expiry Tiers
// ═══════════════════════════════════════════════════════════════════════════════

/// How long a value may be served from cache. The caller picks the tier per
/// kind of data; actual durations come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryTier {
    /// Fast-changing per-user values
    Short,
    /// Per-course aggregates
    Default,
    /// Rarely-changing aggregate views
    Long,
}

impl ExpiryTier {
    /// Built-in duration when no configuration overrides it.
    pub const fn default_duration(&self) -> Duration {
        match self {
            Self::Short => Duration::from_secs(60),
            Self::Default => Duration::from_secs(300),
            Self::Long => Duration::from_secs(3600),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Default => "default",
            Self::Long => "long",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Groups
// ═══════════════════════════════════════════════════════════════════════════════

/// Logical grouping of cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheGroup {
    CourseStats,
    UserProgress,
    CourseList,
    Overview,
    ListVersions,
    /// Free-form group for callers outside the statistics pipeline
    Custom(String),
}

impl CacheGroup {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CourseStats => "course_stats",
            Self::UserProgress => "user_progress",
            Self::CourseList => "course_list",
            Self::Overview => "overview",
            Self::ListVersions => "list_versions",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for CacheGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Key
// ═══════════════════════════════════════════════════════════════════════════════

/// A cache key: group plus identifying segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    group: CacheGroup,
    segments: Vec<String>,
}

impl CacheKey {
    /// Create a key with no segments.
    pub fn new(group: CacheGroup) -> Self {
        Self {
            group,
            segments: Vec::new(),
        }
    }

    /// Append a segment.
    pub fn with_segment(mut self, segment: impl fmt::Display) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    pub fn group(&self) -> &CacheGroup {
        &self.group
    }

    /// The group-qualified key, without namespace or generation.
    pub fn build(&self) -> String {
        let mut parts = Vec::with_capacity(self.segments.len() + 1);
        parts.push(self.group.as_str());
        parts.extend(self.segments.iter().map(String::as_str));
        parts.join(":")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Keys used by the statistics pipeline
    // ─────────────────────────────────────────────────────────────────────────

    pub fn course_stats(course_id: CourseId) -> Self {
        Self::new(CacheGroup::CourseStats).with_segment(course_id)
    }

    pub fn user_progress(user_id: UserId, course_id: CourseId) -> Self {
        Self::new(CacheGroup::UserProgress)
            .with_segment(user_id)
            .with_segment(course_id)
    }

    /// Membership of a course list, bound to the partition's version stamp.
    pub fn course_list(partition: &ListPartition, version: i64) -> Self {
        Self::new(CacheGroup::CourseList)
            .with_segment(partition)
            .with_segment(format_args!("v{}", version))
    }

    pub fn overview() -> Self {
        Self::new(CacheGroup::Overview).with_segment("platform")
    }

    pub fn list_version(partition: &ListPartition) -> Self {
        Self::new(CacheGroup::ListVersions).with_segment(partition)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build())
    }
}
