//! # netrecon - Multi-Source Reconciliation Engine
//!
//! netrecon sits between raw collector observations and the
//! authoritative network-topology record. The same logical entity (a
//! device, service or connection) is independently observed by several
//! heterogeneous collectors; these observations disagree, arrive late,
//! and carry different trustworthiness. netrecon detects disagreement,
//! decides an authoritative value per field, records why, and exposes an
//! audit trail and quality signal per source.
//!
//! ## Core Concepts
//!
//! - **Observation**: one source's reported value for one entity field
//! - **Conflict**: a detected disagreement among active observations
//! - **Resolution**: the recorded outcome of arbitrating a conflict
//! - **Source Priority**: configured trust level and confidence weighting
//! - **Lineage**: the append-only history of observations per entity
//! - **Quality Metric**: a normalized per-source score derived from
//!   lineage and conflict history
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use netrecon::{
//!     FieldValue, InMemoryCatalog, Observation, ReconcileConfig, ReconcileEngine,
//! };
//!
//! let engine = ReconcileEngine::in_memory(
//!     Arc::new(InMemoryCatalog::new()),
//!     ReconcileConfig::default(),
//! );
//!
//! let observation = Observation::new(
//!     "router-17",
//!     "ip_address",
//!     "nmap-scanner",
//!     FieldValue::String("10.0.0.5".to_string()),
//!     Utc::now(),
//!     0.9,
//! ).unwrap();
//!
//! engine.ingest(observation).unwrap();
//! let value = engine.get_authoritative_value("router-17", "ip_address").unwrap();
//! assert_eq!(value, FieldValue::String("10.0.0.5".to_string()));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod catalog;
pub mod config;
pub mod conflict;
pub mod error;
pub mod lineage;
pub mod observation;
pub mod priority;
pub mod resolution;
pub mod value;
pub mod window;

// Components
pub mod detector;
pub mod engine;
pub mod projection;
pub mod quality;
pub mod resolver;
pub mod storage;
pub mod sweep;

// Re-export primary types at crate root for convenience
pub use catalog::{EntityCatalog, FieldSpec, InMemoryCatalog};
pub use config::{DetectorConfig, QualityConfig, SweepConfig};
pub use conflict::{CandidateValue, Conflict, ConflictId, ConflictStatus, ConflictType};
pub use detector::{ConflictDetector, IngestOutcome};
pub use engine::{ReconcileConfig, ReconcileEngine, SweepStats};
pub use error::{EngineError, ReconcileError, ReconcileResult, ValidationError};
pub use lineage::{LineageEntry, LineageEntryKind, LineagePage};
pub use observation::{FieldKey, NaturalKey, Observation};
pub use priority::{PriorityRegistry, SourcePriority};
pub use projection::{AuthoritativeValue, FieldProjection};
pub use quality::{MetricType, QualityCalculator, QualityMetric};
pub use resolution::{Resolution, ResolutionStrategy, ENGINE_SOURCE_ID};
pub use resolver::ResolutionEngine;
pub use storage::{
    AppendOutcome, CasOutcome, ConflictStore, InMemoryStores, LineageStore, MetricStore,
    PriorityStore, ResolutionStore, StorageError,
};
pub use sweep::ReconcileSweeper;
pub use value::{FieldValue, ValueKind};
pub use window::Window;
