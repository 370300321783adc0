//! Error types for netrecon.
//!
//! All errors are strongly typed using thiserror. This enables pattern
//! matching on specific error conditions and provides clear error messages.
//! Validation errors are always raised before any state mutation.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::conflict::ConflictId;

/// Validation errors raised during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field '{field}' is empty")]
    EmptyField {
        field: &'static str,
    },

    #[error("Confidence score {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        value: f64,
    },

    #[error("Priority level {value} is out of range [1, 10]")]
    PriorityLevelOutOfRange {
        value: i64,
    },

    #[error("Confidence multiplier {value} is out of range [0.0, 2.0]")]
    MultiplierOutOfRange {
        value: f64,
    },

    #[error("Field override multiplier {value} for '{field}' is out of range [0.0, 3.0]")]
    FieldOverrideOutOfRange {
        field: String,
        value: f64,
    },

    #[error("Observation timestamp {observed_at} is beyond the clock-skew tolerance (now: {now})")]
    FutureTimestamp {
        observed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Invalid window: start ({start}) must be before end ({end})")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Manual resolution requires a chosen value")]
    MissingChosenValue,

    #[error("Chosen value is not among the conflict's candidates: {value}")]
    InvalidResolution {
        value: String,
    },
}

/// Engine-level errors raised while executing an operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Conflict not found: {id}")]
    ConflictNotFound {
        id: ConflictId,
    },

    #[error("Entity not found: {entity_id}")]
    EntityNotFound {
        entity_id: String,
    },

    #[error("No authoritative value for {entity_id}/{field_name}")]
    NoAuthoritativeValue {
        entity_id: String,
        field_name: String,
    },

    #[error("Conflict {id} is already {status}")]
    AlreadyResolved {
        id: ConflictId,
        status: String,
    },

    #[error("Strategy '{strategy}' cannot run from the automatic sweep")]
    StrategyNotAutomatic {
        strategy: String,
    },
}

/// Top-level error type for netrecon.
///
/// This enum encompasses all possible errors surfaced by the
/// reconciliation engine.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ReconcileError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a lost resolution race.
    #[must_use]
    pub const fn is_already_resolved(&self) -> bool {
        matches!(self, Self::Engine(EngineError::AlreadyResolved { .. }))
    }

    /// Returns true if this is a not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Engine(
                EngineError::ConflictNotFound { .. }
                    | EngineError::EntityNotFound { .. }
                    | EngineError::NoAuthoritativeValue { .. }
            )
        )
    }

    /// Returns true if this error is worth retrying on a later sweep cycle.
    ///
    /// `AlreadyResolved` is final for the losing caller; storage backend
    /// failures may clear up.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Engine(_) | Self::Internal { .. } => false,
            Self::Storage(e) => e.is_backend(),
        }
    }
}

/// Result type alias for netrecon operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_confidence() {
        let err = ValidationError::ConfidenceOutOfRange { value: 1.5 };
        let msg = format!("{err}");
        assert!(msg.contains("1.5"));
        assert!(msg.contains("out of range"));
    }

    #[test]
    fn test_validation_error_priority_level() {
        let err = ValidationError::PriorityLevelOutOfRange { value: 11 };
        let msg = format!("{err}");
        assert!(msg.contains("11"));
        assert!(msg.contains("[1, 10]"));
    }

    #[test]
    fn test_validation_error_future_timestamp() {
        let now = Utc::now();
        let later = now + chrono::Duration::hours(1);
        let err = ValidationError::FutureTimestamp {
            observed_at: later,
            now,
        };
        let msg = format!("{err}");
        assert!(msg.contains("clock-skew"));
    }

    #[test]
    fn test_engine_error_conflict_not_found() {
        let id = ConflictId::new();
        let err = EngineError::ConflictNotFound { id };
        let msg = format!("{err}");
        assert!(msg.contains("Conflict not found"));
    }

    #[test]
    fn test_engine_error_already_resolved() {
        let err = EngineError::AlreadyResolved {
            id: ConflictId::new(),
            status: "resolved".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("already resolved"));
    }

    #[test]
    fn test_reconcile_error_from_validation() {
        let err: ReconcileError = ValidationError::MissingChosenValue.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_reconcile_error_classification() {
        let err: ReconcileError = EngineError::ConflictNotFound {
            id: ConflictId::new(),
        }
        .into();
        assert!(err.is_not_found());
        assert!(!err.is_already_resolved());

        let err: ReconcileError = EngineError::AlreadyResolved {
            id: ConflictId::new(),
            status: "ignored".to_string(),
        }
        .into();
        assert!(err.is_already_resolved());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_reconcile_error_internal() {
        let err = ReconcileError::internal("unexpected state");
        assert!(!err.is_retryable());
        let msg = format!("{err}");
        assert!(msg.contains("unexpected state"));
    }

    #[test]
    fn test_storage_error_retryable() {
        let err: ReconcileError =
            crate::storage::StorageError::BackendError("poisoned lock".to_string()).into();
        assert!(err.is_retryable());
    }
}
