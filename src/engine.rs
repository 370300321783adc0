//! The reconciliation engine façade.
//!
//! `ReconcileEngine` wires the stores, priority registry, catalog, field
//! projection, conflict detector, resolution engine and quality
//! calculator behind the administrative operations the UI layer
//! consumes. All methods are safe to call from concurrent ingestion
//! workers; same-key serialization happens inside the detector/resolver
//! pair.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::EntityCatalog;
use crate::config::{DetectorConfig, QualityConfig};
use crate::conflict::{Conflict, ConflictId, ConflictStatus};
use crate::detector::{ConflictDetector, IngestOutcome};
use crate::error::{EngineError, ReconcileResult};
use crate::lineage::LineagePage;
use crate::observation::{FieldKey, Observation};
use crate::priority::{PriorityRegistry, SourcePriority};
use crate::projection::FieldProjection;
use crate::quality::{MetricType, QualityCalculator, QualityMetric};
use crate::resolution::{Resolution, ResolutionStrategy};
use crate::resolver::ResolutionEngine;
use crate::storage::{
    ConflictStore, InMemoryStores, LineageStore, MetricStore, PriorityStore, ResolutionStore,
};
use crate::value::FieldValue;
use crate::window::Window;

/// Engine-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct ReconcileConfig {
    /// Detector tunables.
    pub detector: DetectorConfig,

    /// Quality metric tunables.
    pub quality: QualityConfig,
}

/// Outcome counters for one automatic sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Pending conflicts visited.
    pub pending_seen: usize,

    /// Conflicts resolved this cycle.
    pub resolved: usize,

    /// Races lost to a concurrent resolution (retried implicitly: the
    /// conflict is no longer pending).
    pub lost_races: usize,

    /// Failures left for the next cycle.
    pub failed: usize,
}

/// The reconciliation engine.
pub struct ReconcileEngine {
    conflicts: Arc<dyn ConflictStore>,
    metrics: Arc<dyn MetricStore>,
    priorities: Arc<dyn PriorityStore>,
    lineage: Arc<dyn LineageStore>,
    registry: PriorityRegistry,
    projection: Arc<FieldProjection>,
    detector: ConflictDetector,
    resolver: ResolutionEngine,
    calculator: QualityCalculator,
}

impl ReconcileEngine {
    /// Creates an engine over explicit store implementations.
    #[must_use]
    pub fn new(
        lineage: Arc<dyn LineageStore>,
        conflicts: Arc<dyn ConflictStore>,
        resolutions: Arc<dyn ResolutionStore>,
        priorities: Arc<dyn PriorityStore>,
        metrics: Arc<dyn MetricStore>,
        catalog: Arc<dyn EntityCatalog>,
        config: ReconcileConfig,
    ) -> Self {
        let registry = PriorityRegistry::new(Arc::clone(&priorities));
        let projection = Arc::new(FieldProjection::new());

        let detector = ConflictDetector::new(
            Arc::clone(&lineage),
            Arc::clone(&conflicts),
            registry.clone(),
            Arc::clone(&catalog),
            Arc::clone(&projection),
            config.detector.clone(),
        );
        let resolver = ResolutionEngine::new(
            Arc::clone(&conflicts),
            Arc::clone(&resolutions),
            Arc::clone(&lineage),
            registry.clone(),
            Arc::clone(&projection),
            config.detector.thrash_window,
        );
        let calculator = QualityCalculator::new(
            Arc::clone(&lineage),
            Arc::clone(&conflicts),
            resolutions,
            catalog,
            config.quality,
        );

        Self {
            conflicts,
            metrics,
            priorities,
            lineage,
            registry,
            projection,
            detector,
            resolver,
            calculator,
        }
    }

    /// Creates an engine backed by the in-memory reference stores.
    #[must_use]
    pub fn in_memory(catalog: Arc<dyn EntityCatalog>, config: ReconcileConfig) -> Self {
        let stores = InMemoryStores::default();
        Self::new(
            Arc::new(stores.lineage),
            Arc::new(stores.conflicts),
            Arc::new(stores.resolutions),
            Arc::new(stores.priorities),
            Arc::new(stores.metrics),
            catalog,
            config,
        )
    }

    /// Ingests one observation from a collector stream.
    ///
    /// # Errors
    ///
    /// `ValidationError` for malformed observations; the failure is
    /// local to this observation and never affects other entities.
    pub fn ingest(&self, observation: Observation) -> ReconcileResult<IngestOutcome> {
        self.detector.ingest(observation)
    }

    /// Lists conflicts, optionally filtered by status.
    pub fn list_conflicts(
        &self,
        status: Option<ConflictStatus>,
    ) -> ReconcileResult<Vec<Conflict>> {
        Ok(self.conflicts.list(status)?)
    }

    /// Fetches one conflict.
    ///
    /// # Errors
    ///
    /// `ConflictNotFound` for an unknown id.
    pub fn get_conflict(&self, conflict_id: ConflictId) -> ReconcileResult<Conflict> {
        self.conflicts
            .get(conflict_id)?
            .ok_or_else(|| EngineError::ConflictNotFound { id: conflict_id }.into())
    }

    /// Resolves a conflict with the given strategy.
    ///
    /// See [`ResolutionEngine::resolve`] for the error contract.
    pub fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        strategy: ResolutionStrategy,
        chosen_value: Option<FieldValue>,
        resolved_by: Option<&str>,
    ) -> ReconcileResult<Resolution> {
        self.resolver
            .resolve(conflict_id, strategy, chosen_value, resolved_by)
    }

    /// Administratively suppresses a pending conflict.
    pub fn ignore_conflict(&self, conflict_id: ConflictId) -> ReconcileResult<Conflict> {
        self.resolver.ignore(conflict_id)
    }

    /// Returns a source's trust configuration (defaulted when
    /// unregistered).
    pub fn get_source_priority(&self, source_id: &str) -> ReconcileResult<SourcePriority> {
        self.registry.get(source_id)
    }

    /// Validates and stores a source's trust configuration.
    pub fn set_source_priority(
        &self,
        source_id: impl Into<String>,
        priority_level: i64,
        confidence_multiplier: f64,
        field_priorities: std::collections::HashMap<String, f64>,
    ) -> ReconcileResult<()> {
        self.registry.upsert(
            source_id,
            priority_level,
            confidence_multiplier,
            field_priorities,
        )
    }

    /// Pages an entity's lineage, oldest first, restartable via the
    /// returned cursor.
    ///
    /// # Errors
    ///
    /// `EntityNotFound` when the entity has no lineage at all.
    pub fn query_lineage(
        &self,
        entity_id: &str,
        field_name: Option<&str>,
        after_seq: Option<u64>,
        limit: usize,
    ) -> ReconcileResult<LineagePage> {
        let page = self
            .lineage
            .query(entity_id, field_name, after_seq, limit)?;

        if page.entries.is_empty() && after_seq.is_none() {
            // Distinguish an unknown entity from a field with no entries.
            let unfiltered = self.lineage.query(entity_id, None, None, 1)?;
            if unfiltered.entries.is_empty() {
                return Err(EngineError::EntityNotFound {
                    entity_id: entity_id.to_string(),
                }
                .into());
            }
        }
        Ok(page)
    }

    /// Reads stored quality metrics, optionally filtered by source
    /// and/or type.
    pub fn get_quality_metrics(
        &self,
        source_id: Option<&str>,
        metric_type: Option<MetricType>,
    ) -> ReconcileResult<Vec<QualityMetric>> {
        Ok(self.metrics.query(source_id, metric_type)?)
    }

    /// Computes a source's quality metrics over a window, appends them
    /// to the metric time series, and returns them.
    pub fn evaluate_quality(
        &self,
        source_id: &str,
        window: &Window,
    ) -> ReconcileResult<Vec<QualityMetric>> {
        let metrics = self.calculator.evaluate(source_id, window)?;
        for metric in &metrics {
            self.metrics.insert(metric.clone())?;
        }
        Ok(metrics)
    }

    /// Evaluates every registered source over a window. Returns the
    /// number of metrics recorded.
    pub fn evaluate_registered_sources(&self, window: &Window) -> ReconcileResult<usize> {
        let mut recorded = 0;
        for priority in self.priorities.list()? {
            recorded += self.evaluate_quality(&priority.source_id, window)?.len();
        }
        Ok(recorded)
    }

    /// Reads the authoritative value for a field: the read path consumed
    /// by topology rendering and alerting.
    ///
    /// # Errors
    ///
    /// `NoAuthoritativeValue` when no value has been committed for the
    /// key.
    pub fn get_authoritative_value(
        &self,
        entity_id: &str,
        field_name: &str,
    ) -> ReconcileResult<FieldValue> {
        let key = FieldKey::new(entity_id, field_name);
        self.projection
            .authoritative(&key)
            .map(|auth| auth.value)
            .ok_or_else(|| {
                EngineError::NoAuthoritativeValue {
                    entity_id: entity_id.to_string(),
                    field_name: field_name.to_string(),
                }
                .into()
            })
    }

    /// Runs one automatic resolution pass over all pending conflicts.
    ///
    /// Lost races and per-conflict failures are swallowed and counted;
    /// they are retried on the next cycle rather than treated as
    /// pipeline-fatal.
    ///
    /// # Errors
    ///
    /// `StrategyNotAutomatic` if called with the manual strategy.
    pub fn run_sweep_cycle(&self, strategy: ResolutionStrategy) -> ReconcileResult<SweepStats> {
        if !strategy.is_automatic() {
            return Err(EngineError::StrategyNotAutomatic {
                strategy: strategy.to_string(),
            }
            .into());
        }

        let pending = self.conflicts.list(Some(ConflictStatus::Pending))?;
        let mut stats = SweepStats {
            pending_seen: pending.len(),
            ..SweepStats::default()
        };

        for conflict in pending {
            match self.resolver.resolve(conflict.id, strategy, None, None) {
                Ok(_) => stats.resolved += 1,
                Err(e) if e.is_already_resolved() => {
                    debug!(conflict = %conflict.id, "sweep lost resolution race");
                    stats.lost_races += 1;
                }
                Err(e) => {
                    warn!(conflict = %conflict.id, error = %e, "sweep resolution failed");
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }
}

impl std::fmt::Debug for ReconcileEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileEngine").finish_non_exhaustive()
    }
}
