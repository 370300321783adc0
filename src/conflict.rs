//! Conflict types for tracking multi-source disagreement.
//!
//! Conflicts are explicit records, not hidden errors. When active sources
//! materially disagree on a field we create a Conflict that tracks the
//! disagreement and, eventually, its resolution. Resolved and ignored
//! conflicts are never deleted; they remain as history.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::FieldValue;

/// Unique identifier for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Creates a new random conflict ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The classification of a detected disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Sources report materially different values of the same kind.
    ValueMismatch,

    /// Candidate values differ in value kind (e.g. string vs number).
    SchemaConflict,

    /// The authoritative value has been thrashing: it changed more than
    /// the configured limit within the rolling window.
    TimestampConflict,

    /// The two highest-priority sources are the ones disagreeing.
    SourcePriorityConflict,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValueMismatch => write!(f, "value_mismatch"),
            Self::SchemaConflict => write!(f, "schema_conflict"),
            Self::TimestampConflict => write!(f, "timestamp_conflict"),
            Self::SourcePriorityConflict => write!(f, "source_priority_conflict"),
        }
    }
}

/// The status of a conflict.
///
/// `Pending` is the only non-terminal state; `Resolved` and `Ignored`
/// admit no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Awaiting arbitration.
    Pending,

    /// Arbitrated; exactly one Resolution exists.
    Resolved,

    /// Administratively suppressed; no Resolution recorded.
    Ignored,
}

impl Default for ConflictStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Resolved => write!(f, "resolved"),
            Self::Ignored => write!(f, "ignored"),
        }
    }
}

/// One disagreeing source's entry in a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateValue {
    /// The source that reported this value.
    pub source_id: String,

    /// The reported value.
    pub value: FieldValue,

    /// Source-reported confidence.
    pub confidence_score: f64,

    /// When the source observed the value.
    pub observed_at: DateTime<Utc>,
}

/// A detected disagreement on one entity/field at a point in time.
///
/// `candidate_values` is an ordered list sorted by `source_id` ascending,
/// one entry per source, giving deterministic iteration for tie-breaking
/// without relying on map-iteration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// Unique identifier for this conflict.
    pub id: ConflictId,

    /// The entity involved.
    pub entity_id: String,

    /// The field the sources disagree on.
    pub field_name: String,

    /// Classification of the disagreement.
    pub conflict_type: ConflictType,

    /// One entry per source, sorted by `source_id` ascending.
    pub candidate_values: Vec<CandidateValue>,

    /// Current status.
    pub status: ConflictStatus,

    /// When the conflict was opened.
    pub created_at: DateTime<Utc>,
}

impl Conflict {
    /// Creates a new pending conflict.
    ///
    /// Candidates are sorted by `source_id` ascending on construction.
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        field_name: impl Into<String>,
        conflict_type: ConflictType,
        mut candidate_values: Vec<CandidateValue>,
    ) -> Self {
        candidate_values.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Self {
            id: ConflictId::new(),
            entity_id: entity_id.into(),
            field_name: field_name.into(),
            conflict_type,
            candidate_values,
            status: ConflictStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Returns true if the conflict is awaiting arbitration.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ConflictStatus::Pending
    }

    /// Returns true if the conflict has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.status == ConflictStatus::Resolved
    }

    /// Inserts or replaces the candidate for `source_id`, keeping the
    /// list sorted by `source_id` ascending.
    pub fn upsert_candidate(&mut self, candidate: CandidateValue) {
        match self
            .candidate_values
            .binary_search_by(|c| c.source_id.cmp(&candidate.source_id))
        {
            Ok(idx) => self.candidate_values[idx] = candidate,
            Err(idx) => self.candidate_values.insert(idx, candidate),
        }
    }

    /// Returns the candidate for a source, if present.
    #[must_use]
    pub fn candidate_for(&self, source_id: &str) -> Option<&CandidateValue> {
        self.candidate_values
            .binary_search_by(|c| c.source_id.as_str().cmp(source_id))
            .ok()
            .map(|idx| &self.candidate_values[idx])
    }

    /// Returns true if `value` is among the candidate values.
    #[must_use]
    pub fn contains_value(&self, value: &FieldValue) -> bool {
        self.candidate_values.iter().any(|c| &c.value == value)
    }

    /// Number of distinct values among the candidates.
    #[must_use]
    pub fn distinct_value_count(&self) -> usize {
        let mut distinct: Vec<&FieldValue> = Vec::with_capacity(self.candidate_values.len());
        for c in &self.candidate_values {
            if !distinct.contains(&&c.value) {
                distinct.push(&c.value);
            }
        }
        distinct.len()
    }
}

impl PartialEq for Conflict {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Conflict {}

impl std::hash::Hash for Conflict {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
