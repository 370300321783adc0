//! Source trust configuration and the priority registry.
//!
//! Every collector gets a `SourcePriority`: a priority level, a confidence
//! multiplier, and optional per-field override multipliers. Unregistered
//! sources read as documented defaults without a persisted row;
//! registration is explicit, and out-of-range input is rejected at write
//! time, never clamped.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileResult, ValidationError};
use crate::storage::PriorityStore;

/// Default priority level for unregistered sources.
pub const DEFAULT_PRIORITY_LEVEL: u8 = 5;

/// Default confidence multiplier for unregistered sources.
pub const DEFAULT_CONFIDENCE_MULTIPLIER: f64 = 1.0;

/// Trust configuration for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePriority {
    /// The source this configuration applies to.
    pub source_id: String,

    /// Priority level in [1, 10]; higher wins priority-based resolution.
    pub priority_level: u8,

    /// Confidence multiplier in [0.0, 2.0] applied to reported scores.
    pub confidence_multiplier: f64,

    /// Per-field override multipliers in [0.0, 3.0].
    #[serde(default)]
    pub field_priorities: HashMap<String, f64>,
}

impl SourcePriority {
    /// Creates a validated source priority.
    ///
    /// # Errors
    ///
    /// Rejects `priority_level` outside [1, 10], `confidence_multiplier`
    /// outside [0.0, 2.0], and any override outside [0.0, 3.0]. Values are
    /// never clamped.
    pub fn new(
        source_id: impl Into<String>,
        priority_level: i64,
        confidence_multiplier: f64,
        field_priorities: HashMap<String, f64>,
    ) -> Result<Self, ValidationError> {
        let source_id = source_id.into();
        if source_id.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "source_id" });
        }
        if !(1..=10).contains(&priority_level) {
            return Err(ValidationError::PriorityLevelOutOfRange {
                value: priority_level,
            });
        }
        if !(0.0..=2.0).contains(&confidence_multiplier) || !confidence_multiplier.is_finite() {
            return Err(ValidationError::MultiplierOutOfRange {
                value: confidence_multiplier,
            });
        }
        for (field, mult) in &field_priorities {
            if !(0.0..=3.0).contains(mult) || !mult.is_finite() {
                return Err(ValidationError::FieldOverrideOutOfRange {
                    field: field.clone(),
                    value: *mult,
                });
            }
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(Self {
            source_id,
            priority_level: priority_level as u8,
            confidence_multiplier,
            field_priorities,
        })
    }

    /// Returns the documented defaults for an unregistered source.
    #[must_use]
    pub fn default_for(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            priority_level: DEFAULT_PRIORITY_LEVEL,
            confidence_multiplier: DEFAULT_CONFIDENCE_MULTIPLIER,
            field_priorities: HashMap::new(),
        }
    }

    /// Returns the override multiplier for a field, defaulting to 1.0
    /// when none is configured.
    #[must_use]
    pub fn field_multiplier(&self, field_name: &str) -> f64 {
        self.field_priorities
            .get(field_name)
            .copied()
            .unwrap_or(1.0)
    }

    /// Effective confidence for a reported score on a field:
    /// `score * confidence_multiplier * field override`.
    #[must_use]
    pub fn effective_confidence(&self, reported_score: f64, field_name: &str) -> f64 {
        reported_score * self.confidence_multiplier * self.field_multiplier(field_name)
    }
}

/// Repository fronting source trust configuration.
///
/// `get` on an unregistered source returns the documented defaults
/// without creating a persisted row; `upsert` validates and then writes
/// (one row per source, upsert semantics).
#[derive(Clone)]
pub struct PriorityRegistry {
    store: Arc<dyn PriorityStore>,
}

impl PriorityRegistry {
    /// Creates a registry over a priority store.
    #[must_use]
    pub fn new(store: Arc<dyn PriorityStore>) -> Self {
        Self { store }
    }

    /// Returns the stored configuration for a source, or the defaults if
    /// the source is unregistered.
    pub fn get(&self, source_id: &str) -> ReconcileResult<SourcePriority> {
        Ok(self
            .store
            .get(source_id)?
            .unwrap_or_else(|| SourcePriority::default_for(source_id)))
    }

    /// Validates and stores a source's trust configuration.
    ///
    /// On validation failure nothing is written: any previously stored
    /// row is left untouched.
    pub fn upsert(
        &self,
        source_id: impl Into<String>,
        priority_level: i64,
        confidence_multiplier: f64,
        field_priorities: HashMap<String, f64>,
    ) -> ReconcileResult<()> {
        let priority = SourcePriority::new(
            source_id,
            priority_level,
            confidence_multiplier,
            field_priorities,
        )?;
        self.store.upsert(priority)?;
        Ok(())
    }
}

impl std::fmt::Debug for PriorityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityRegistry").finish_non_exhaustive()
    }
}
