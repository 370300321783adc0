//! Per-source quality scoring.
//!
//! The calculator aggregates lineage, conflict and resolution history
//! into normalized scores per source. It is purely read-and-aggregate:
//! it never feeds back into detection or resolution, and may run
//! concurrently with both against an eventually-consistent snapshot.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::catalog::EntityCatalog;
use crate::config::QualityConfig;
use crate::error::ReconcileResult;
use crate::lineage::{LineageEntry, LineageEntryKind};
use crate::storage::{ConflictStore, LineageStore, ResolutionStore};
use crate::window::Window;

/// The dimension a quality score measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// How often this source's value won arbitration when it was a
    /// candidate.
    Accuracy,

    /// Coverage of the fields expected for the entities this source
    /// observes.
    Completeness,

    /// Share of observations that did not land in a conflict.
    Consistency,

    /// Share of observations delivered within the configured lag.
    Timeliness,

    /// Share of observations passing their schema checks.
    Validity,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accuracy => write!(f, "accuracy"),
            Self::Completeness => write!(f, "completeness"),
            Self::Consistency => write!(f, "consistency"),
            Self::Timeliness => write!(f, "timeliness"),
            Self::Validity => write!(f, "validity"),
        }
    }
}

/// One periodic score for one source, in [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetric {
    /// The source being scored.
    pub source_id: String,

    /// The measured dimension.
    pub metric_type: MetricType,

    /// Normalized score in [0, 100].
    pub value: f64,

    /// When the score was computed.
    pub calculated_at: DateTime<Utc>,

    /// Supporting figures (numerators, denominators, thresholds).
    pub metadata: serde_json::Value,
}

impl QualityMetric {
    fn new(source_id: &str, metric_type: MetricType, value: f64, metadata: serde_json::Value) -> Self {
        Self {
            source_id: source_id.to_string(),
            metric_type,
            value: value.clamp(0.0, 100.0),
            calculated_at: Utc::now(),
            metadata,
        }
    }
}

/// Read-only aggregator over lineage/conflict/resolution history.
pub struct QualityCalculator {
    lineage: Arc<dyn LineageStore>,
    conflicts: Arc<dyn ConflictStore>,
    resolutions: Arc<dyn ResolutionStore>,
    catalog: Arc<dyn EntityCatalog>,
    config: QualityConfig,
}

impl QualityCalculator {
    /// Creates a calculator over the given stores and catalog.
    #[must_use]
    pub fn new(
        lineage: Arc<dyn LineageStore>,
        conflicts: Arc<dyn ConflictStore>,
        resolutions: Arc<dyn ResolutionStore>,
        catalog: Arc<dyn EntityCatalog>,
        config: QualityConfig,
    ) -> Self {
        Self {
            lineage,
            conflicts,
            resolutions,
            catalog,
            config,
        }
    }

    /// Computes the quality metrics for a source over a window.
    ///
    /// Returns one metric per type whose denominator is non-zero;
    /// metrics with an empty denominator (no observations, no expected
    /// fields, never a resolution candidate) are omitted rather than
    /// reported as a misleading zero. Every returned value is clamped
    /// into [0, 100].
    pub fn evaluate(
        &self,
        source_id: &str,
        window: &Window,
    ) -> ReconcileResult<Vec<QualityMetric>> {
        let entries = self.lineage.find_by_source(source_id, window)?;
        let observed: Vec<_> = entries
            .iter()
            .filter(|e| e.kind == LineageEntryKind::Observed)
            .collect();

        let mut metrics = Vec::with_capacity(5);

        if let Some(m) = self.completeness(source_id, &observed) {
            metrics.push(m);
        }
        if let Some(m) = self.consistency(source_id, window, &observed)? {
            metrics.push(m);
        }
        if let Some(m) = self.accuracy(source_id, window)? {
            metrics.push(m);
        }
        if let Some(m) = timeliness(source_id, &observed, &self.config) {
            metrics.push(m);
        }
        if let Some(m) = validity(source_id, &observed) {
            metrics.push(m);
        }

        Ok(metrics)
    }

    /// `observed_fields / expected_fields * 100`, capped at 100. Expected
    /// fields are summed over the distinct entities the source observed;
    /// entities the catalog cannot type contribute nothing.
    fn completeness(
        &self,
        source_id: &str,
        observed: &[&LineageEntry],
    ) -> Option<QualityMetric> {
        let entities: HashSet<&str> = observed
            .iter()
            .map(|e| e.observation.entity_id.as_str())
            .collect();

        let mut expected_total = 0usize;
        let mut observed_total = 0usize;
        for entity_id in entities {
            let Some(entity_type) = self.catalog.entity_type(entity_id) else {
                continue;
            };
            let expected = self.catalog.expected_fields(&entity_type);
            if expected.is_empty() {
                continue;
            }
            expected_total += expected.len();

            let seen: HashSet<&str> = observed
                .iter()
                .filter(|e| e.observation.entity_id == entity_id)
                .map(|e| e.observation.field_name.as_str())
                .collect();
            observed_total += expected
                .iter()
                .filter(|f| seen.contains(f.as_str()))
                .count();
        }

        if expected_total == 0 {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let score = observed_total as f64 / expected_total as f64 * 100.0;
        Some(QualityMetric::new(
            source_id,
            MetricType::Completeness,
            score.min(100.0),
            json!({
                "observed_fields": observed_total,
                "expected_fields": expected_total,
            }),
        ))
    }

    /// `100 - conflicts_involving_source / observations * 100`, floored
    /// at 0.
    fn consistency(
        &self,
        source_id: &str,
        window: &Window,
        observed: &[&LineageEntry],
    ) -> ReconcileResult<Option<QualityMetric>> {
        if observed.is_empty() {
            return Ok(None);
        }

        let involving = self
            .conflicts
            .find_created_in(window)?
            .iter()
            .filter(|c| c.candidate_for(source_id).is_some())
            .count();

        #[allow(clippy::cast_precision_loss)]
        let score = 100.0 - (involving as f64 / observed.len() as f64) * 100.0;
        Ok(Some(QualityMetric::new(
            source_id,
            MetricType::Consistency,
            score.max(0.0),
            json!({
                "conflicts_involving_source": involving,
                "observations": observed.len(),
            }),
        )))
    }

    /// `resolutions_where_chosen / resolutions_where_candidate * 100`,
    /// omitted when the source was never a candidate in the window.
    fn accuracy(&self, source_id: &str, window: &Window) -> ReconcileResult<Option<QualityMetric>> {
        let mut candidate_count = 0usize;
        let mut chosen_count = 0usize;

        for resolution in self.resolutions.find_in_window(window)? {
            let Some(conflict) = self.conflicts.get(resolution.conflict_id)? else {
                continue;
            };
            let Some(candidate) = conflict.candidate_for(source_id) else {
                continue;
            };
            candidate_count += 1;
            if candidate.value == resolution.chosen_value {
                chosen_count += 1;
            }
        }

        if candidate_count == 0 {
            return Ok(None);
        }

        #[allow(clippy::cast_precision_loss)]
        let score = chosen_count as f64 / candidate_count as f64 * 100.0;
        Ok(Some(QualityMetric::new(
            source_id,
            MetricType::Accuracy,
            score,
            json!({
                "chosen": chosen_count,
                "candidate": candidate_count,
            }),
        )))
    }
}

/// Share of entries within the configured ingestion lag.
fn timeliness(
    source_id: &str,
    observed: &[&LineageEntry],
    config: &QualityConfig,
) -> Option<QualityMetric> {
    if observed.is_empty() {
        return None;
    }
    let timely = observed
        .iter()
        .filter(|e| e.lag() <= config.max_lag)
        .count();

    #[allow(clippy::cast_precision_loss)]
    let score = timely as f64 / observed.len() as f64 * 100.0;
    Some(QualityMetric::new(
        source_id,
        MetricType::Timeliness,
        score,
        json!({
            "timely": timely,
            "observations": observed.len(),
            "max_lag_seconds": config.max_lag.num_seconds(),
        }),
    ))
}

/// Share of entries that passed their schema checks.
fn validity(source_id: &str, observed: &[&LineageEntry]) -> Option<QualityMetric> {
    if observed.is_empty() {
        return None;
    }
    let conforming = observed.iter().filter(|e| !e.quarantined).count();

    #[allow(clippy::cast_precision_loss)]
    let score = conforming as f64 / observed.len() as f64 * 100.0;
    Some(QualityMetric::new(
        source_id,
        MetricType::Validity,
        score,
        json!({
            "conforming": conforming,
            "observations": observed.len(),
        }),
    ))
}

impl std::fmt::Debug for QualityCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityCalculator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::catalog::InMemoryCatalog;
    use crate::config::DetectorConfig;
    use crate::detector::ConflictDetector;
    use crate::observation::Observation;
    use crate::priority::PriorityRegistry;
    use crate::projection::FieldProjection;
    use crate::resolution::ResolutionStrategy;
    use crate::resolver::ResolutionEngine;
    use crate::storage::{
        InMemoryConflictStore, InMemoryLineageStore, InMemoryPriorityStore,
        InMemoryResolutionStore, PriorityStore,
    };
    use crate::value::FieldValue;

    struct Fixture {
        detector: ConflictDetector,
        resolver: ResolutionEngine,
        calculator: QualityCalculator,
        catalog: Arc<InMemoryCatalog>,
        conflicts: Arc<InMemoryConflictStore>,
    }

    fn fixture() -> Fixture {
        let lineage = Arc::new(InMemoryLineageStore::default());
        let conflicts = Arc::new(InMemoryConflictStore::default());
        let resolutions = Arc::new(InMemoryResolutionStore::default());
        let priorities = Arc::new(InMemoryPriorityStore::default());
        let catalog = Arc::new(InMemoryCatalog::new());
        let projection = Arc::new(FieldProjection::new());
        let registry = PriorityRegistry::new(priorities.clone() as Arc<dyn PriorityStore>);

        let detector = ConflictDetector::new(
            lineage.clone(),
            conflicts.clone(),
            registry.clone(),
            catalog.clone(),
            projection.clone(),
            DetectorConfig::default(),
        );
        let resolver = ResolutionEngine::new(
            conflicts.clone(),
            resolutions.clone(),
            lineage.clone(),
            registry,
            projection,
            Duration::minutes(5),
        );
        let calculator = QualityCalculator::new(
            lineage,
            conflicts.clone(),
            resolutions,
            catalog.clone(),
            QualityConfig::default(),
        );
        Fixture {
            detector,
            resolver,
            calculator,
            catalog,
            conflicts,
        }
    }

    fn window() -> Window {
        Window::last(Duration::hours(1))
    }

    fn metric(metrics: &[QualityMetric], metric_type: MetricType) -> Option<&QualityMetric> {
        metrics.iter().find(|m| m.metric_type == metric_type)
    }

    #[test]
    fn test_no_history_yields_no_metrics() {
        let fx = fixture();
        let metrics = fx.calculator.evaluate("ghost", &window()).unwrap();
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_completeness_eight_of_ten_fields() {
        let fx = fixture();
        let fields: Vec<String> = (0..10).map(|i| format!("field_{i}")).collect();
        fx.catalog.register_entity("switch-1", "network_device");
        fx.catalog.define_type("network_device", fields.clone());

        for field in fields.iter().take(8) {
            fx.detector
                .ingest(
                    Observation::new(
                        "switch-1",
                        field.clone(),
                        "nmap",
                        FieldValue::Int(1),
                        Utc::now(),
                        0.9,
                    )
                    .unwrap(),
                )
                .unwrap();
        }

        let metrics = fx.calculator.evaluate("nmap", &window()).unwrap();
        let completeness = metric(&metrics, MetricType::Completeness).unwrap();
        assert!((completeness.value - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_consistency_counts_conflicts() {
        let fx = fixture();
        // Four observations from zeek; one lands in a conflict.
        for i in 0..3 {
            fx.detector
                .ingest(
                    Observation::new(
                        format!("host-{i}"),
                        "hostname",
                        "zeek",
                        FieldValue::String(format!("h{i}")),
                        Utc::now(),
                        0.9,
                    )
                    .unwrap(),
                )
                .unwrap();
        }
        fx.detector
            .ingest(
                Observation::new(
                    "host-x",
                    "hostname",
                    "zeek",
                    FieldValue::String("a".into()),
                    Utc::now(),
                    0.9,
                )
                .unwrap(),
            )
            .unwrap();
        fx.detector
            .ingest(
                Observation::new(
                    "host-x",
                    "hostname",
                    "nmap",
                    FieldValue::String("b".into()),
                    Utc::now(),
                    0.9,
                )
                .unwrap(),
            )
            .unwrap();

        let metrics = fx.calculator.evaluate("zeek", &window()).unwrap();
        let consistency = metric(&metrics, MetricType::Consistency).unwrap();
        // 4 observations, 1 conflict involving zeek: 100 - 25 = 75.
        assert!((consistency.value - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_tracks_won_arbitrations() {
        let fx = fixture();

        // Both sources sit at default priority, so "alpha" wins the
        // lexical tie-break.
        fx.detector
            .ingest(
                Observation::new(
                    "host-1",
                    "os",
                    "alpha",
                    FieldValue::String("linux".into()),
                    Utc::now(),
                    0.9,
                )
                .unwrap(),
            )
            .unwrap();
        fx.detector
            .ingest(
                Observation::new(
                    "host-1",
                    "os",
                    "beta",
                    FieldValue::String("windows".into()),
                    Utc::now(),
                    0.9,
                )
                .unwrap(),
            )
            .unwrap();
        let conflict_id = fx.conflicts.list(None).unwrap()[0].id;
        fx.resolver
            .resolve(conflict_id, ResolutionStrategy::PriorityBased, None, None)
            .unwrap();

        let metrics = fx.calculator.evaluate("alpha", &window()).unwrap();
        let accuracy = metric(&metrics, MetricType::Accuracy).unwrap();
        assert!((accuracy.value - 100.0).abs() < 1e-9);

        let metrics = fx.calculator.evaluate("beta", &window()).unwrap();
        let accuracy = metric(&metrics, MetricType::Accuracy).unwrap();
        assert!((accuracy.value - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_omitted_without_candidacy() {
        let fx = fixture();
        fx.detector
            .ingest(
                Observation::new(
                    "host-1",
                    "os",
                    "solo",
                    FieldValue::String("linux".into()),
                    Utc::now(),
                    0.9,
                )
                .unwrap(),
            )
            .unwrap();

        let metrics = fx.calculator.evaluate("solo", &window()).unwrap();
        assert!(metric(&metrics, MetricType::Accuracy).is_none());
        // But timeliness/validity exist for the lone observation.
        assert!(metric(&metrics, MetricType::Timeliness).is_some());
        assert!(metric(&metrics, MetricType::Validity).is_some());
    }

    #[test]
    fn test_timeliness_against_lag_threshold() {
        let fx = fixture();
        // One fresh observation, one delivered hours late.
        fx.detector
            .ingest(
                Observation::new(
                    "host-1",
                    "os",
                    "laggy",
                    FieldValue::String("linux".into()),
                    Utc::now(),
                    0.9,
                )
                .unwrap(),
            )
            .unwrap();
        fx.detector
            .ingest(
                Observation::new(
                    "host-2",
                    "os",
                    "laggy",
                    FieldValue::String("linux".into()),
                    Utc::now() - Duration::hours(3),
                    0.9,
                )
                .unwrap(),
            )
            .unwrap();

        let metrics = fx.calculator.evaluate("laggy", &window()).unwrap();
        let timeliness = metric(&metrics, MetricType::Timeliness).unwrap();
        assert!((timeliness.value - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_validity_counts_quarantines() {
        let fx = fixture();
        fx.catalog.define_field(
            "ip_address",
            crate::catalog::FieldSpec::of_kind(crate::value::ValueKind::String),
        );

        fx.detector
            .ingest(
                Observation::new(
                    "host-1",
                    "ip_address",
                    "noisy",
                    FieldValue::String("10.0.0.5".into()),
                    Utc::now(),
                    0.9,
                )
                .unwrap(),
            )
            .unwrap();
        fx.detector
            .ingest(
                Observation::new(
                    "host-2",
                    "ip_address",
                    "noisy",
                    FieldValue::Int(99),
                    Utc::now(),
                    0.9,
                )
                .unwrap(),
            )
            .unwrap();

        let metrics = fx.calculator.evaluate("noisy", &window()).unwrap();
        let validity = metric(&metrics, MetricType::Validity).unwrap();
        assert!((validity.value - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_metrics_bounded() {
        let fx = fixture();
        fx.catalog.register_entity("host-1", "device");
        fx.catalog
            .define_type("device", vec!["os".to_string(), "ip".to_string()]);

        fx.detector
            .ingest(
                Observation::new(
                    "host-1",
                    "os",
                    "src",
                    FieldValue::String("linux".into()),
                    Utc::now(),
                    0.9,
                )
                .unwrap(),
            )
            .unwrap();

        let metrics = fx.calculator.evaluate("src", &window()).unwrap();
        assert!(!metrics.is_empty());
        for m in &metrics {
            assert!(
                (0.0..=100.0).contains(&m.value),
                "{} out of bounds: {}",
                m.metric_type,
                m.value
            );
        }
    }
}
