//! Observation types.
//!
//! An observation is one fact reported by one source about one entity
//! field. Observations are immutable once written; the lineage ledger is
//! append-only and deduplicates by natural key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::value::FieldValue;

/// One source's reported value for one entity field at one time.
///
/// # Examples
///
/// ```
/// use netrecon::{FieldValue, Observation};
/// use chrono::Utc;
///
/// let obs = Observation::new(
///     "router-17",
///     "ip_address",
///     "nmap-scanner",
///     FieldValue::String("10.0.0.5".to_string()),
///     Utc::now(),
///     0.9,
/// ).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// The entity this observation is about.
    pub entity_id: String,

    /// The field being reported.
    pub field_name: String,

    /// The collector that reported it.
    pub source_id: String,

    /// The reported value.
    pub value: FieldValue,

    /// When the source observed the value.
    pub observed_at: DateTime<Utc>,

    /// Source-reported confidence in [0.0, 1.0].
    pub confidence_score: f64,
}

impl Observation {
    /// Creates a validated observation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if `entity_id`, `field_name` or
    /// `source_id` is empty, or `confidence_score` is outside [0.0, 1.0].
    /// Future-timestamp checks belong to the detector, which knows the
    /// configured clock-skew tolerance.
    pub fn new(
        entity_id: impl Into<String>,
        field_name: impl Into<String>,
        source_id: impl Into<String>,
        value: FieldValue,
        observed_at: DateTime<Utc>,
        confidence_score: f64,
    ) -> Result<Self, ValidationError> {
        let observation = Self {
            entity_id: entity_id.into(),
            field_name: field_name.into(),
            source_id: source_id.into(),
            value,
            observed_at,
            confidence_score,
        };
        observation.validate()?;
        Ok(observation)
    }

    /// Re-checks the construction invariants.
    ///
    /// Observations arriving over a deserialization boundary bypass
    /// `new`; the detector validates them again before any state
    /// mutation.
    ///
    /// # Errors
    ///
    /// Same conditions as `new`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.entity_id.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "entity_id" });
        }
        if self.field_name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "field_name",
            });
        }
        if self.source_id.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "source_id" });
        }
        if !(0.0..=1.0).contains(&self.confidence_score) || !self.confidence_score.is_finite() {
            return Err(ValidationError::ConfidenceOutOfRange {
                value: self.confidence_score,
            });
        }
        Ok(())
    }

    /// Returns the `(entity_id, field_name)` key this observation targets.
    #[must_use]
    pub fn field_key(&self) -> FieldKey {
        FieldKey {
            entity_id: self.entity_id.clone(),
            field_name: self.field_name.clone(),
        }
    }

    /// Stable digest of the observation's natural key
    /// (entity/field/source/value/timestamp).
    ///
    /// Re-ingesting a byte-identical observation produces the same digest,
    /// which is what lineage append-once deduplication keys on.
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.entity_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.field_name.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.source_id.as_bytes());
        hasher.update(&[0]);
        // FieldValue serialization is canonical for our closed union.
        let value_json =
            serde_json::to_vec(&self.value).unwrap_or_else(|_| self.value.to_string().into_bytes());
        hasher.update(&value_json);
        hasher.update(&[0]);
        hasher.update(&self.observed_at.timestamp_micros().to_le_bytes());
        NaturalKey(*hasher.finalize().as_bytes())
    }
}

/// Identifies one field of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey {
    /// The entity.
    pub entity_id: String,
    /// The field.
    pub field_name: String,
}

impl FieldKey {
    /// Creates a field key.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            field_name: field_name.into(),
        }
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_id, self.field_name)
    }
}

/// Blake3 digest of an observation's natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NaturalKey(pub [u8; 32]);
