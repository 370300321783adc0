//! Conflict arbitration.
//!
//! The resolution engine applies a strategy to a pending conflict's
//! candidate values, commits the winner as the authoritative field value,
//! and records exactly one Resolution. The `pending -> resolved` and
//! `pending -> ignored` transitions are compare-and-set: of two racing
//! callers exactly one wins, the other gets `AlreadyResolved` and the
//! winner's record is untouched.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use crate::conflict::{CandidateValue, Conflict, ConflictId, ConflictStatus};
use crate::error::{EngineError, ReconcileResult, ValidationError};
use crate::lineage::LineageEntryKind;
use crate::observation::{FieldKey, Observation};
use crate::priority::PriorityRegistry;
use crate::projection::FieldProjection;
use crate::resolution::{Resolution, ResolutionStrategy, ENGINE_SOURCE_ID};
use crate::storage::{CasOutcome, ConflictStore, LineageStore, ResolutionStore};
use crate::value::FieldValue;

/// Applies resolution strategies to pending conflicts.
pub struct ResolutionEngine {
    conflicts: Arc<dyn ConflictStore>,
    resolutions: Arc<dyn ResolutionStore>,
    lineage: Arc<dyn LineageStore>,
    registry: PriorityRegistry,
    projection: Arc<FieldProjection>,
    thrash_window: Duration,
}

impl ResolutionEngine {
    /// Creates a resolution engine over the given stores and projection.
    ///
    /// `thrash_window` must match the detector's so resolution commits
    /// count toward the same thrash history.
    #[must_use]
    pub fn new(
        conflicts: Arc<dyn ConflictStore>,
        resolutions: Arc<dyn ResolutionStore>,
        lineage: Arc<dyn LineageStore>,
        registry: PriorityRegistry,
        projection: Arc<FieldProjection>,
        thrash_window: Duration,
    ) -> Self {
        Self {
            conflicts,
            resolutions,
            lineage,
            registry,
            projection,
            thrash_window,
        }
    }

    /// Resolves a pending conflict.
    ///
    /// `chosen_value` is required for (and only allowed to matter in) the
    /// manual strategy and must be one of the conflict's candidate
    /// values. `resolved_by` identifies the operator for manual
    /// resolutions; automatic strategies default to the engine source id.
    ///
    /// # Errors
    ///
    /// - `ConflictNotFound` for an unknown id.
    /// - `ValidationError` for a missing or non-candidate manual value,
    ///   raised before any state mutation.
    /// - `AlreadyResolved` when the conflict is no longer pending; the
    ///   original Resolution is untouched.
    pub fn resolve(
        &self,
        conflict_id: ConflictId,
        strategy: ResolutionStrategy,
        chosen_value: Option<FieldValue>,
        resolved_by: Option<&str>,
    ) -> ReconcileResult<Resolution> {
        let conflict = self
            .conflicts
            .get(conflict_id)?
            .ok_or(EngineError::ConflictNotFound { id: conflict_id })?;

        let chosen = match strategy {
            ResolutionStrategy::Manual => {
                let value = chosen_value.ok_or(ValidationError::MissingChosenValue)?;
                if !conflict.contains_value(&value) {
                    return Err(ValidationError::InvalidResolution {
                        value: value.to_string(),
                    }
                    .into());
                }
                value
            }
            ResolutionStrategy::PriorityBased => self.select_by_priority(&conflict)?.value.clone(),
            ResolutionStrategy::TimestampBased => select_by_timestamp(&conflict)
                .ok_or_else(|| {
                    crate::error::ReconcileError::internal("conflict has no candidates")
                })?
                .value
                .clone(),
            ResolutionStrategy::ConfidenceBased => {
                self.select_by_confidence(&conflict)?.value.clone()
            }
        };

        match self
            .conflicts
            .transition_if_pending(conflict_id, ConflictStatus::Resolved)?
        {
            CasOutcome::Transitioned(_) => {}
            CasOutcome::Lost { current } => {
                return Err(EngineError::AlreadyResolved {
                    id: conflict_id,
                    status: current.to_string(),
                }
                .into());
            }
        }

        let resolution = Resolution::new(
            conflict_id,
            chosen.clone(),
            strategy,
            resolved_by.unwrap_or(ENGINE_SOURCE_ID),
        );
        self.resolutions.insert(resolution.clone())?;

        self.commit_authoritative(&conflict, &resolution)?;

        debug!(
            conflict = %conflict_id,
            strategy = %strategy,
            chosen = %resolution.chosen_value,
            "resolved conflict"
        );
        Ok(resolution)
    }

    /// Suppresses a pending conflict without arbitration.
    ///
    /// Terminal like `resolve`, but no Resolution is recorded and the
    /// authoritative value is untouched.
    ///
    /// # Errors
    ///
    /// - `ConflictNotFound` for an unknown id.
    /// - `AlreadyResolved` when the conflict is no longer pending.
    pub fn ignore(&self, conflict_id: ConflictId) -> ReconcileResult<Conflict> {
        match self
            .conflicts
            .transition_if_pending(conflict_id, ConflictStatus::Ignored)
        {
            Ok(CasOutcome::Transitioned(conflict)) => {
                debug!(conflict = %conflict_id, "ignored conflict");
                Ok(conflict)
            }
            Ok(CasOutcome::Lost { current }) => Err(EngineError::AlreadyResolved {
                id: conflict_id,
                status: current.to_string(),
            }
            .into()),
            Err(crate::storage::StorageError::ConflictNotFound(id)) => {
                Err(EngineError::ConflictNotFound { id }.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Highest priority level wins; ties broken by higher confidence
    /// multiplier, then lexical `source_id` ascending. Candidates are
    /// already sorted by `source_id`, so keeping the incumbent on a full
    /// tie realizes the last tie-break.
    fn select_by_priority<'c>(&self, conflict: &'c Conflict) -> ReconcileResult<&'c CandidateValue> {
        let mut best: Option<(&CandidateValue, u8, f64)> = None;
        for candidate in &conflict.candidate_values {
            let priority = self.registry.get(&candidate.source_id)?;
            let key = (priority.priority_level, priority.confidence_multiplier);
            let better = match &best {
                None => true,
                Some((_, level, mult)) => {
                    key.0 > *level || (key.0 == *level && key.1 > *mult)
                }
            };
            if better {
                best = Some((candidate, key.0, key.1));
            }
        }
        best.map(|(c, _, _)| c)
            .ok_or_else(|| crate::error::ReconcileError::internal("conflict has no candidates"))
    }

    /// Highest effective confidence wins
    /// (`confidence_score * multiplier * field override`); ties broken by
    /// `source_id` ascending.
    fn select_by_confidence<'c>(
        &self,
        conflict: &'c Conflict,
    ) -> ReconcileResult<&'c CandidateValue> {
        let mut best: Option<(&CandidateValue, f64)> = None;
        for candidate in &conflict.candidate_values {
            let priority = self.registry.get(&candidate.source_id)?;
            let effective =
                priority.effective_confidence(candidate.confidence_score, &conflict.field_name);
            let better = best.as_ref().map_or(true, |(_, b)| effective > *b);
            if better {
                best = Some((candidate, effective));
            }
        }
        best.map(|(c, _)| c)
            .ok_or_else(|| crate::error::ReconcileError::internal("conflict has no candidates"))
    }

    fn commit_authoritative(
        &self,
        conflict: &Conflict,
        resolution: &Resolution,
    ) -> ReconcileResult<()> {
        let key = FieldKey::new(&conflict.entity_id, &conflict.field_name);
        self.projection.with_state(&key, |state| {
            state.commit(
                resolution.chosen_value.clone(),
                ENGINE_SOURCE_ID,
                self.thrash_window,
            );
        });

        // Synthetic lineage entry marking the field as resolved.
        let marker = Observation::new(
            conflict.entity_id.clone(),
            conflict.field_name.clone(),
            ENGINE_SOURCE_ID,
            resolution.chosen_value.clone(),
            resolution.resolved_at,
            1.0,
        )
        .map_err(crate::error::ReconcileError::from)?;
        self.lineage
            .append(marker, LineageEntryKind::Resolved, false, None)?;
        Ok(())
    }
}

/// Latest `observed_at` wins; ties broken by `source_id` ascending
/// (candidates are sorted, and the incumbent is kept on ties).
fn select_by_timestamp(conflict: &Conflict) -> Option<&CandidateValue> {
    let mut iter = conflict.candidate_values.iter();
    let mut best = iter.next()?;
    for candidate in iter {
        if candidate.observed_at > best.observed_at {
            best = candidate;
        }
    }
    Some(best)
}

impl std::fmt::Debug for ResolutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionEngine").finish_non_exhaustive()
    }
}
