//! Lineage ledger types.
//!
//! Lineage is the full historical record of observations for an entity:
//! an append-only ledger with a stable, monotonic sequence key per entry.
//! Conflicts never suppress lineage recording, and quarantined
//! observations are recorded with a flag rather than dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::observation::Observation;

/// Why a lineage entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageEntryKind {
    /// A collector reported this value.
    Observed,

    /// The resolution engine committed this value
    /// (`source_id = "reconciliation-engine"`).
    Resolved,
}

impl std::fmt::Display for LineageEntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Observed => write!(f, "observed"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// One ledger entry.
///
/// `seq` is assigned by the store at append time and is the stable
/// ordering key for queries; arrival order, not `observed_at` order
/// (out-of-order delivery from slow collectors is expected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEntry {
    /// Monotonic sequence number, unique across the ledger.
    pub seq: u64,

    /// The recorded observation (synthetic for `Resolved` entries).
    pub observation: Observation,

    /// When the entry was appended.
    pub recorded_at: DateTime<Utc>,

    /// True if the value failed its schema check and was excluded from
    /// conflict detection and resolution.
    pub quarantined: bool,

    /// Entry kind.
    pub kind: LineageEntryKind,
}

impl LineageEntry {
    /// Ingestion lag for this entry.
    #[must_use]
    pub fn lag(&self) -> chrono::Duration {
        self.recorded_at - self.observation.observed_at
    }
}

/// A page of lineage entries plus the cursor to continue from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineagePage {
    /// Entries ordered by `seq` ascending (oldest first).
    pub entries: Vec<LineageEntry>,

    /// Pass as `after_seq` to fetch the next page; `None` when this page
    /// exhausted the ledger.
    pub next_cursor: Option<u64>,
}
