//! Conflict detection over the incoming observation stream.
//!
//! The detector is the single write path for observations. Every
//! observation is appended to lineage regardless of outcome; agreement
//! with the active set commits the value directly, disagreement opens or
//! updates the one pending conflict allowed per `(entity_id, field_name)`
//! key. Same-key ingestion is serialized through the field projection so
//! the active set is always consistent.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::catalog::EntityCatalog;
use crate::config::DetectorConfig;
use crate::conflict::{CandidateValue, Conflict, ConflictId, ConflictType};
use crate::error::{ReconcileResult, ValidationError};
use crate::lineage::LineageEntryKind;
use crate::observation::Observation;
use crate::priority::PriorityRegistry;
use crate::projection::{FieldProjection, FieldState};
use crate::storage::{AppendOutcome, ConflictStore, LineageStore};
use crate::value::FieldValue;

/// What happened to an ingested observation.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// All active sources agree; the value was committed directly.
    Committed {
        /// The committed authoritative value.
        value: FieldValue,
    },

    /// A new conflict was opened for the key.
    ConflictOpened {
        /// The opened conflict.
        conflict_id: ConflictId,
    },

    /// The observation joined the key's existing pending conflict.
    ConflictUpdated {
        /// The updated conflict.
        conflict_id: ConflictId,
    },

    /// The value failed its schema check and was recorded in lineage
    /// with the quarantine flag; it takes no part in detection.
    Quarantined {
        /// Lineage sequence number of the quarantined entry.
        seq: u64,
    },

    /// An identical observation was already recorded; no-op.
    Duplicate,
}

/// Consumes observations and maintains the conflict set.
pub struct ConflictDetector {
    lineage: Arc<dyn LineageStore>,
    conflicts: Arc<dyn ConflictStore>,
    registry: PriorityRegistry,
    catalog: Arc<dyn EntityCatalog>,
    projection: Arc<FieldProjection>,
    config: DetectorConfig,
}

impl ConflictDetector {
    /// Creates a detector over the given stores and projection.
    #[must_use]
    pub fn new(
        lineage: Arc<dyn LineageStore>,
        conflicts: Arc<dyn ConflictStore>,
        registry: PriorityRegistry,
        catalog: Arc<dyn EntityCatalog>,
        projection: Arc<FieldProjection>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            lineage,
            conflicts,
            registry,
            catalog,
            projection,
            config,
        }
    }

    /// Ingests one observation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for malformed observations (empty keys,
    /// out-of-range confidence, future timestamp beyond the clock-skew
    /// tolerance). Validation failures are rejected before any state
    /// mutation and never affect other entities.
    pub fn ingest(&self, observation: Observation) -> ReconcileResult<IngestOutcome> {
        observation.validate()?;

        let now = Utc::now();
        if observation.observed_at > now + self.config.clock_skew_tolerance {
            warn!(
                entity = %observation.entity_id,
                field = %observation.field_name,
                source = %observation.source_id,
                observed_at = %observation.observed_at,
                "rejected observation with future timestamp"
            );
            return Err(ValidationError::FutureTimestamp {
                observed_at: observation.observed_at,
                now,
            }
            .into());
        }

        // Schema check: nonconforming values are quarantined into lineage
        // and excluded from detection; the stream keeps flowing.
        if let Some(spec) = self.catalog.field_spec(&observation.field_name) {
            if !spec.conforms(&observation.value) {
                warn!(
                    entity = %observation.entity_id,
                    field = %observation.field_name,
                    source = %observation.source_id,
                    expected = %spec.kind,
                    "quarantined observation failing schema check"
                );
                let key = observation.natural_key();
                let outcome = self.lineage.append(
                    observation,
                    LineageEntryKind::Observed,
                    true,
                    Some(key),
                )?;
                return Ok(match outcome {
                    AppendOutcome::Appended(entry) => IngestOutcome::Quarantined { seq: entry.seq },
                    AppendOutcome::Duplicate { .. } => IngestOutcome::Duplicate,
                });
            }
        }

        let field_key = observation.field_key();
        self.projection.with_state(&field_key, |state| {
            let natural_key = observation.natural_key();
            let outcome = self.lineage.append(
                observation.clone(),
                LineageEntryKind::Observed,
                false,
                Some(natural_key),
            )?;
            if matches!(outcome, AppendOutcome::Duplicate { .. }) {
                return Ok(IngestOutcome::Duplicate);
            }

            let candidate = CandidateValue {
                source_id: observation.source_id.clone(),
                value: observation.value.clone(),
                confidence_score: observation.confidence_score,
                observed_at: observation.observed_at,
            };

            let disagreeing: Vec<CandidateValue> = state
                .active
                .values()
                .filter(|c| {
                    c.source_id != observation.source_id
                        && !c
                            .value
                            .agrees_with(&observation.value, self.config.numeric_epsilon)
                })
                .cloned()
                .collect();

            state
                .active
                .insert(observation.source_id.clone(), candidate.clone());

            if disagreeing.is_empty() {
                state.commit(
                    observation.value.clone(),
                    observation.source_id.clone(),
                    self.config.thrash_window,
                );
                debug!(
                    entity = %observation.entity_id,
                    field = %observation.field_name,
                    source = %observation.source_id,
                    "committed observation directly"
                );
                return Ok(IngestOutcome::Committed {
                    value: observation.value,
                });
            }

            if let Some(pending) = self
                .conflicts
                .find_pending_for_key(&observation.entity_id, &observation.field_name)?
            {
                let updated = self.conflicts.upsert_candidate(pending.id, candidate)?;
                debug!(
                    conflict = %updated.id,
                    source = %observation.source_id,
                    "joined pending conflict"
                );
                return Ok(IngestOutcome::ConflictUpdated {
                    conflict_id: updated.id,
                });
            }

            let conflict_type = self.classify(state)?;
            // The whole active set participates in the conflict, not just
            // the pair that tripped detection.
            let candidates: Vec<CandidateValue> = state.active.values().cloned().collect();
            let conflict = Conflict::new(
                observation.entity_id.clone(),
                observation.field_name.clone(),
                conflict_type,
                candidates,
            );
            let conflict_id = conflict.id;
            self.conflicts.insert(conflict)?;
            debug!(
                conflict = %conflict_id,
                entity = %observation.entity_id,
                field = %observation.field_name,
                kind = %conflict_type,
                "opened conflict"
            );
            Ok(IngestOutcome::ConflictOpened { conflict_id })
        })
    }

    /// Classifies a fresh disagreement. `state.active` already contains
    /// the new candidate.
    fn classify(&self, state: &FieldState) -> ReconcileResult<ConflictType> {
        let kinds: Vec<_> = state.active.values().map(|c| c.value.kind()).collect();
        if kinds.windows(2).any(|pair| pair[0] != pair[1]) {
            return Ok(ConflictType::SchemaConflict);
        }

        if state.recent_commit_count(self.config.thrash_window) > self.config.thrash_limit {
            return Ok(ConflictType::TimestampConflict);
        }

        // Highest two priority levels among the active sources; the
        // active map's source_id order makes the pick deterministic.
        // Equal-priority disagreement stays a value mismatch: the trust
        // hierarchy is only at stake when a higher-trust source is
        // contradicted by the next-trusted one.
        let mut ranked: Vec<(&CandidateValue, u8)> = Vec::with_capacity(state.active.len());
        for candidate in state.active.values() {
            let priority = self.registry.get(&candidate.source_id)?;
            ranked.push((candidate, priority.priority_level));
        }
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.source_id.cmp(&b.0.source_id)));
        if let [(first, first_level), (second, second_level), ..] = ranked.as_slice() {
            if first_level != second_level
                && !first
                    .value
                    .agrees_with(&second.value, self.config.numeric_epsilon)
            {
                return Ok(ConflictType::SourcePriorityConflict);
            }
        }

        Ok(ConflictType::ValueMismatch)
    }
}

impl std::fmt::Debug for ConflictDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictDetector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
