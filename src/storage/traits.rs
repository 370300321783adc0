//! Abstract storage traits.
//!
//! These traits define the contract that storage backends must implement.
//! The engine only ever talks to these seams, so a transactional
//! relational backend can replace the in-memory reference implementation
//! without touching detection or resolution logic.

use thiserror::Error;

use crate::conflict::{CandidateValue, Conflict, ConflictId, ConflictStatus};
use crate::lineage::{LineageEntry, LineageEntryKind, LineagePage};
use crate::observation::{NaturalKey, Observation};
use crate::priority::SourcePriority;
use crate::quality::{MetricType, QualityMetric};
use crate::resolution::Resolution;
use crate::window::Window;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Conflict not found.
    #[error("Conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StorageError {
    /// Returns true for backend-level failures (possibly transient).
    #[must_use]
    pub const fn is_backend(&self) -> bool {
        matches!(self, Self::BackendError(_))
    }
}

/// Result of an append against the lineage ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// The entry was appended with this sequence number.
    Appended(LineageEntry),

    /// An entry with the same natural key already exists.
    Duplicate {
        /// Sequence number of the existing entry.
        existing_seq: u64,
    },
}

/// Append-only ledger of observations.
///
/// No update or delete operation exists. Concurrent appends are totally
/// ordered by arrival; query results are ordered by the assigned
/// sequence key, not by `observed_at`.
pub trait LineageStore: Send + Sync {
    /// Appends an entry, deduplicating by `dedup_key` when supplied.
    fn append(
        &self,
        observation: Observation,
        kind: LineageEntryKind,
        quarantined: bool,
        dedup_key: Option<NaturalKey>,
    ) -> Result<AppendOutcome, StorageError>;

    /// Pages entries for an entity (optionally one field), oldest first,
    /// restartable via the `after_seq` cursor.
    fn query(
        &self,
        entity_id: &str,
        field_name: Option<&str>,
        after_seq: Option<u64>,
        limit: usize,
    ) -> Result<LineagePage, StorageError>;

    /// All entries recorded by a source within a window (by
    /// `recorded_at`).
    fn find_by_source(
        &self,
        source_id: &str,
        window: &Window,
    ) -> Result<Vec<LineageEntry>, StorageError>;
}

/// Outcome of a compare-and-set status transition.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The conflict was pending and has transitioned; the updated record
    /// is returned.
    Transitioned(Conflict),

    /// The conflict was already in a terminal state; nothing changed.
    Lost {
        /// The status that won the race.
        current: ConflictStatus,
    },
}

/// Storage for conflict records.
pub trait ConflictStore: Send + Sync {
    /// Inserts a new conflict.
    fn insert(&self, conflict: Conflict) -> Result<(), StorageError>;

    /// Gets a conflict by ID.
    fn get(&self, id: ConflictId) -> Result<Option<Conflict>, StorageError>;

    /// Inserts or replaces one source's candidate on a pending conflict.
    ///
    /// Returns the updated record. Fails with `ConflictNotFound` if the
    /// conflict does not exist.
    fn upsert_candidate(
        &self,
        id: ConflictId,
        candidate: CandidateValue,
    ) -> Result<Conflict, StorageError>;

    /// Returns the single pending conflict for a key, if one exists.
    fn find_pending_for_key(
        &self,
        entity_id: &str,
        field_name: &str,
    ) -> Result<Option<Conflict>, StorageError>;

    /// Lists conflicts, optionally filtered by status, ordered by
    /// `created_at` ascending.
    fn list(&self, status: Option<ConflictStatus>) -> Result<Vec<Conflict>, StorageError>;

    /// Atomically transitions `pending -> to`. The store guarantees at
    /// most one caller observes `Transitioned` per conflict.
    fn transition_if_pending(
        &self,
        id: ConflictId,
        to: ConflictStatus,
    ) -> Result<CasOutcome, StorageError>;

    /// Conflicts created within a window.
    fn find_created_in(&self, window: &Window) -> Result<Vec<Conflict>, StorageError>;
}

/// Storage for resolution records (one per resolved conflict, immutable).
pub trait ResolutionStore: Send + Sync {
    /// Inserts a resolution. Fails with `DuplicateKey` if the conflict
    /// already has one.
    fn insert(&self, resolution: Resolution) -> Result<(), StorageError>;

    /// Gets the resolution for a conflict.
    fn get(&self, conflict_id: ConflictId) -> Result<Option<Resolution>, StorageError>;

    /// Resolutions recorded within a window.
    fn find_in_window(&self, window: &Window) -> Result<Vec<Resolution>, StorageError>;
}

/// Storage for source trust configuration (one row per source).
pub trait PriorityStore: Send + Sync {
    /// Gets a source's stored configuration, if registered.
    fn get(&self, source_id: &str) -> Result<Option<SourcePriority>, StorageError>;

    /// Inserts or replaces a source's configuration.
    fn upsert(&self, priority: SourcePriority) -> Result<(), StorageError>;

    /// Lists all registered sources.
    fn list(&self) -> Result<Vec<SourcePriority>, StorageError>;
}

/// Append-only time series of quality metrics.
pub trait MetricStore: Send + Sync {
    /// Appends a metric (prior metrics are retained for trend queries).
    fn insert(&self, metric: QualityMetric) -> Result<(), StorageError>;

    /// Queries metrics, optionally filtered by source and/or type,
    /// ordered by `calculated_at` ascending.
    fn query(
        &self,
        source_id: Option<&str>,
        metric_type: Option<MetricType>,
    ) -> Result<Vec<QualityMetric>, StorageError>;
}
