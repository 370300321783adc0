//! Configuration for the detector, sweeper and quality calculator.
//!
//! Thresholds the original system left implicit are explicit tunables
//! here with documented defaults.

use chrono::Duration;

use crate::resolution::ResolutionStrategy;

/// Conflict detector tunables.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Absolute tolerance for numeric agreement. Two numeric values whose
    /// difference is within this epsilon are not a conflict. Integer
    /// pairs always compare exactly.
    pub numeric_epsilon: f64,

    /// How far an `observed_at` may lead wall-clock time before the
    /// observation is rejected as a future timestamp.
    pub clock_skew_tolerance: Duration,

    /// Rolling window for thrash detection.
    pub thrash_window: Duration,

    /// Authoritative commits within `thrash_window` beyond which a new
    /// disagreement is classified as a timestamp conflict.
    pub thrash_limit: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            numeric_epsilon: 1e-9,
            clock_skew_tolerance: Duration::seconds(30),
            thrash_window: Duration::minutes(5),
            thrash_limit: 3,
        }
    }
}

/// Background sweeper tunables.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Interval between sweep cycles.
    pub interval: std::time::Duration,

    /// Strategy applied to pending conflicts each cycle. Must be an
    /// automatic strategy; `Manual` is only ever invoked by an explicit
    /// administrative call.
    pub strategy: ResolutionStrategy,

    /// Run quality evaluation every N sweep cycles (0 disables it).
    pub quality_every: usize,

    /// History window handed to quality evaluation when the sweeper
    /// drives it.
    pub quality_window: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: std::time::Duration::from_secs(60),
            strategy: ResolutionStrategy::PriorityBased,
            quality_every: 5,
            quality_window: Duration::hours(1),
        }
    }
}

/// Quality metric tunables.
///
/// Timeliness and validity are computed from these thresholds rather than
/// hard-coded formulas; per-source-type deployments override them.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Maximum acceptable lag between `observed_at` and ingestion for an
    /// entry to count as timely.
    pub max_lag: Duration,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_lag: Duration::minutes(15),
        }
    }
}
