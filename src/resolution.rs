//! Resolution types: the recorded outcome of arbitrating a conflict.
//!
//! A Resolution is created exactly once, at the moment a conflict
//! transitions to `resolved`, and is immutable thereafter.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conflict::ConflictId;
use crate::value::FieldValue;

/// Source id stamped on synthetic lineage entries written when a
/// resolution commits an authoritative value.
pub const ENGINE_SOURCE_ID: &str = "reconciliation-engine";

/// How a conflict's winning value is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// An operator supplies the chosen value explicitly.
    Manual,

    /// Highest source priority level wins; ties broken by higher
    /// confidence multiplier, then lexical `source_id` ascending.
    PriorityBased,

    /// Latest `observed_at` wins; ties broken by `source_id` ascending.
    TimestampBased,

    /// Highest effective confidence wins
    /// (`confidence_score * source multiplier * field override`);
    /// ties broken by `source_id` ascending.
    ConfidenceBased,
}

impl ResolutionStrategy {
    /// Returns true for strategies the background sweep may apply without
    /// an operator.
    #[must_use]
    pub const fn is_automatic(&self) -> bool {
        !matches!(self, Self::Manual)
    }

    /// Short stable identifier suitable for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::PriorityBased => "priority_based",
            Self::TimestampBased => "timestamp_based",
            Self::ConfidenceBased => "confidence_based",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The outcome of arbitrating one conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// The conflict this resolution settles.
    pub conflict_id: ConflictId,

    /// The value committed as authoritative.
    pub chosen_value: FieldValue,

    /// The strategy that selected it.
    pub strategy: ResolutionStrategy,

    /// When the resolution was recorded.
    pub resolved_at: DateTime<Utc>,

    /// Operator id for manual resolutions, or the engine source id for
    /// automatic strategies.
    pub resolved_by: String,
}

impl Resolution {
    /// Creates a resolution record stamped with the current time.
    #[must_use]
    pub fn new(
        conflict_id: ConflictId,
        chosen_value: FieldValue,
        strategy: ResolutionStrategy,
        resolved_by: impl Into<String>,
    ) -> Self {
        Self {
            conflict_id,
            chosen_value,
            strategy,
            resolved_at: Utc::now(),
            resolved_by: resolved_by.into(),
        }
    }
}
