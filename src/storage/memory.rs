//! In-memory storage backend.
//!
//! Thread-safe reference implementations of the storage traits, intended
//! for embedded usage and tests. A transactional relational backend can
//! replace this module by implementing the same traits.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::conflict::{CandidateValue, Conflict, ConflictId, ConflictStatus};
use crate::lineage::{LineageEntry, LineageEntryKind, LineagePage};
use crate::observation::{NaturalKey, Observation};
use crate::priority::SourcePriority;
use crate::quality::{MetricType, QualityMetric};
use crate::resolution::Resolution;
use crate::storage::traits::{
    AppendOutcome, CasOutcome, ConflictStore, LineageStore, MetricStore, PriorityStore,
    ResolutionStore, StorageError,
};
use crate::window::Window;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct LineageState {
    entries: Vec<LineageEntry>,
    seen: HashMap<NaturalKey, u64>,
    next_seq: u64,
}

/// In-memory append-only lineage ledger.
#[derive(Debug, Default)]
pub struct InMemoryLineageStore {
    state: RwLock<LineageState>,
}

impl LineageStore for InMemoryLineageStore {
    fn append(
        &self,
        observation: Observation,
        kind: LineageEntryKind,
        quarantined: bool,
        dedup_key: Option<NaturalKey>,
    ) -> Result<AppendOutcome, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("lineage"))?;

        if let Some(key) = dedup_key {
            if let Some(existing_seq) = state.seen.get(&key) {
                return Ok(AppendOutcome::Duplicate {
                    existing_seq: *existing_seq,
                });
            }
        }

        state.next_seq += 1;
        let entry = LineageEntry {
            seq: state.next_seq,
            observation,
            recorded_at: Utc::now(),
            quarantined,
            kind,
        };
        if let Some(key) = dedup_key {
            state.seen.insert(key, entry.seq);
        }
        state.entries.push(entry.clone());
        Ok(AppendOutcome::Appended(entry))
    }

    fn query(
        &self,
        entity_id: &str,
        field_name: Option<&str>,
        after_seq: Option<u64>,
        limit: usize,
    ) -> Result<LineagePage, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("lineage"))?;
        let cursor = after_seq.unwrap_or(0);

        // Entries are stored in seq order; a filtered scan preserves it.
        let mut matching = state.entries.iter().filter(|e| {
            e.seq > cursor
                && e.observation.entity_id == entity_id
                && field_name.map_or(true, |f| e.observation.field_name == f)
        });

        let mut entries = Vec::new();
        for entry in matching.by_ref() {
            if entries.len() == limit {
                // One more match exists, so the page is not the last.
                return Ok(LineagePage {
                    next_cursor: entries.last().map(|e: &LineageEntry| e.seq),
                    entries,
                });
            }
            entries.push(entry.clone());
        }

        Ok(LineagePage {
            entries,
            next_cursor: None,
        })
    }

    fn find_by_source(
        &self,
        source_id: &str,
        window: &Window,
    ) -> Result<Vec<LineageEntry>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("lineage"))?;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.observation.source_id == source_id && window.contains(e.recorded_at))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
struct ConflictState {
    by_id: HashMap<ConflictId, Conflict>,
    pending_by_key: HashMap<(String, String), ConflictId>,
}

/// In-memory conflict store.
#[derive(Debug, Default)]
pub struct InMemoryConflictStore {
    state: RwLock<ConflictState>,
}

impl ConflictStore for InMemoryConflictStore {
    fn insert(&self, conflict: Conflict) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("conflicts"))?;

        if state.by_id.contains_key(&conflict.id) {
            return Err(StorageError::DuplicateKey(conflict.id.to_string()));
        }
        let key = (conflict.entity_id.clone(), conflict.field_name.clone());
        if conflict.status == ConflictStatus::Pending {
            if state.pending_by_key.contains_key(&key) {
                return Err(StorageError::DuplicateKey(format!(
                    "pending conflict for {}/{}",
                    key.0, key.1
                )));
            }
            state.pending_by_key.insert(key, conflict.id);
        }
        state.by_id.insert(conflict.id, conflict);
        Ok(())
    }

    fn get(&self, id: ConflictId) -> Result<Option<Conflict>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("conflicts"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn upsert_candidate(
        &self,
        id: ConflictId,
        candidate: CandidateValue,
    ) -> Result<Conflict, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("conflicts"))?;
        let conflict = state
            .by_id
            .get_mut(&id)
            .ok_or(StorageError::ConflictNotFound(id))?;
        conflict.upsert_candidate(candidate);
        Ok(conflict.clone())
    }

    fn find_pending_for_key(
        &self,
        entity_id: &str,
        field_name: &str,
    ) -> Result<Option<Conflict>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("conflicts"))?;
        let key = (entity_id.to_string(), field_name.to_string());
        Ok(state
            .pending_by_key
            .get(&key)
            .and_then(|id| state.by_id.get(id))
            .cloned())
    }

    fn list(&self, status: Option<ConflictStatus>) -> Result<Vec<Conflict>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("conflicts"))?;
        let mut conflicts: Vec<Conflict> = state
            .by_id
            .values()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        conflicts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
        });
        Ok(conflicts)
    }

    fn transition_if_pending(
        &self,
        id: ConflictId,
        to: ConflictStatus,
    ) -> Result<CasOutcome, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("conflicts"))?;
        let conflict = state
            .by_id
            .get_mut(&id)
            .ok_or(StorageError::ConflictNotFound(id))?;

        if conflict.status != ConflictStatus::Pending {
            return Ok(CasOutcome::Lost {
                current: conflict.status,
            });
        }

        conflict.status = to;
        let updated = conflict.clone();
        let key = (updated.entity_id.clone(), updated.field_name.clone());
        state.pending_by_key.remove(&key);
        Ok(CasOutcome::Transitioned(updated))
    }

    fn find_created_in(&self, window: &Window) -> Result<Vec<Conflict>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("conflicts"))?;
        Ok(state
            .by_id
            .values()
            .filter(|c| window.contains(c.created_at))
            .cloned()
            .collect())
    }
}

/// In-memory resolution store.
#[derive(Debug, Default)]
pub struct InMemoryResolutionStore {
    state: RwLock<HashMap<ConflictId, Resolution>>,
}

impl ResolutionStore for InMemoryResolutionStore {
    fn insert(&self, resolution: Resolution) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("resolutions"))?;
        if state.contains_key(&resolution.conflict_id) {
            return Err(StorageError::DuplicateKey(
                resolution.conflict_id.to_string(),
            ));
        }
        state.insert(resolution.conflict_id, resolution);
        Ok(())
    }

    fn get(&self, conflict_id: ConflictId) -> Result<Option<Resolution>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("resolutions"))?;
        Ok(state.get(&conflict_id).cloned())
    }

    fn find_in_window(&self, window: &Window) -> Result<Vec<Resolution>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("resolutions"))?;
        Ok(state
            .values()
            .filter(|r| window.contains(r.resolved_at))
            .cloned()
            .collect())
    }
}

/// In-memory priority store.
#[derive(Debug, Default)]
pub struct InMemoryPriorityStore {
    state: RwLock<HashMap<String, SourcePriority>>,
}

impl PriorityStore for InMemoryPriorityStore {
    fn get(&self, source_id: &str) -> Result<Option<SourcePriority>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("priorities"))?;
        Ok(state.get(source_id).cloned())
    }

    fn upsert(&self, priority: SourcePriority) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("priorities"))?;
        state.insert(priority.source_id.clone(), priority);
        Ok(())
    }

    fn list(&self) -> Result<Vec<SourcePriority>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("priorities"))?;
        let mut priorities: Vec<SourcePriority> = state.values().cloned().collect();
        priorities.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(priorities)
    }
}

/// In-memory quality metric time series.
#[derive(Debug, Default)]
pub struct InMemoryMetricStore {
    state: RwLock<Vec<QualityMetric>>,
}

impl MetricStore for InMemoryMetricStore {
    fn insert(&self, metric: QualityMetric) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("metrics"))?;
        state.push(metric);
        Ok(())
    }

    fn query(
        &self,
        source_id: Option<&str>,
        metric_type: Option<MetricType>,
    ) -> Result<Vec<QualityMetric>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("metrics"))?;
        let mut metrics: Vec<QualityMetric> = state
            .iter()
            .filter(|m| {
                source_id.map_or(true, |s| m.source_id == s)
                    && metric_type.map_or(true, |t| m.metric_type == t)
            })
            .cloned()
            .collect();
        metrics.sort_by_key(|m| m.calculated_at);
        Ok(metrics)
    }
}

/// Bundle of all in-memory stores, for convenient wiring.
#[derive(Debug, Default)]
pub struct InMemoryStores {
    /// Lineage ledger.
    pub lineage: InMemoryLineageStore,
    /// Conflict records.
    pub conflicts: InMemoryConflictStore,
    /// Resolution records.
    pub resolutions: InMemoryResolutionStore,
    /// Source trust configuration.
    pub priorities: InMemoryPriorityStore,
    /// Quality metric time series.
    pub metrics: InMemoryMetricStore,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictType;
    use crate::value::FieldValue;

    fn obs(entity: &str, field: &str, source: &str, value: FieldValue) -> Observation {
        Observation::new(entity, field, source, value, Utc::now(), 0.9).unwrap()
    }

    fn candidate(source: &str, value: FieldValue) -> CandidateValue {
        CandidateValue {
            source_id: source.to_string(),
            value,
            confidence_score: 0.9,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_lineage_append_assigns_monotonic_seq() {
        let store = InMemoryLineageStore::default();
        let a = store
            .append(
                obs("e", "f", "s", FieldValue::Int(1)),
                LineageEntryKind::Observed,
                false,
                None,
            )
            .unwrap();
        let b = store
            .append(
                obs("e", "f", "s", FieldValue::Int(2)),
                LineageEntryKind::Observed,
                false,
                None,
            )
            .unwrap();

        let (AppendOutcome::Appended(a), AppendOutcome::Appended(b)) = (a, b) else {
            panic!("expected appends");
        };
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_lineage_dedup_by_natural_key() {
        let store = InMemoryLineageStore::default();
        let o = obs("e", "f", "s", FieldValue::Int(1));
        let key = o.natural_key();

        let first = store
            .append(o.clone(), LineageEntryKind::Observed, false, Some(key))
            .unwrap();
        let AppendOutcome::Appended(entry) = first else {
            panic!("expected append");
        };

        let second = store
            .append(o, LineageEntryKind::Observed, false, Some(key))
            .unwrap();
        assert_eq!(
            second,
            AppendOutcome::Duplicate {
                existing_seq: entry.seq
            }
        );
    }

    #[test]
    fn test_lineage_query_pagination() {
        let store = InMemoryLineageStore::default();
        for i in 0..5 {
            store
                .append(
                    obs("e", "f", "s", FieldValue::Int(i)),
                    LineageEntryKind::Observed,
                    false,
                    None,
                )
                .unwrap();
        }
        // An entry for another entity must not appear in the page.
        store
            .append(
                obs("other", "f", "s", FieldValue::Int(99)),
                LineageEntryKind::Observed,
                false,
                None,
            )
            .unwrap();

        let page1 = store.query("e", Some("f"), None, 3).unwrap();
        assert_eq!(page1.entries.len(), 3);
        let cursor = page1.next_cursor.expect("more pages expected");

        let page2 = store.query("e", Some("f"), Some(cursor), 3).unwrap();
        assert_eq!(page2.entries.len(), 2);
        assert!(page2.next_cursor.is_none());

        // Oldest first across pages.
        let seqs: Vec<u64> = page1
            .entries
            .iter()
            .chain(page2.entries.iter())
            .map(|e| e.seq)
            .collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);
    }

    #[test]
    fn test_conflict_insert_rejects_second_pending_for_key() {
        let store = InMemoryConflictStore::default();
        let c1 = Conflict::new(
            "e",
            "f",
            ConflictType::ValueMismatch,
            vec![
                candidate("a", FieldValue::Int(1)),
                candidate("b", FieldValue::Int(2)),
            ],
        );
        store.insert(c1).unwrap();

        let c2 = Conflict::new(
            "e",
            "f",
            ConflictType::ValueMismatch,
            vec![
                candidate("a", FieldValue::Int(1)),
                candidate("c", FieldValue::Int(3)),
            ],
        );
        let err = store.insert(c2).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));
    }

    #[test]
    fn test_conflict_cas_single_winner() {
        let store = InMemoryConflictStore::default();
        let conflict = Conflict::new(
            "e",
            "f",
            ConflictType::ValueMismatch,
            vec![
                candidate("a", FieldValue::Int(1)),
                candidate("b", FieldValue::Int(2)),
            ],
        );
        let id = conflict.id;
        store.insert(conflict).unwrap();

        let first = store
            .transition_if_pending(id, ConflictStatus::Resolved)
            .unwrap();
        assert!(matches!(first, CasOutcome::Transitioned(_)));

        let second = store
            .transition_if_pending(id, ConflictStatus::Resolved)
            .unwrap();
        assert_eq!(
            second,
            CasOutcome::Lost {
                current: ConflictStatus::Resolved
            }
        );

        // The key is free for a new pending conflict after transition.
        assert!(store.find_pending_for_key("e", "f").unwrap().is_none());
    }

    #[test]
    fn test_conflict_list_filters_by_status() {
        let store = InMemoryConflictStore::default();
        let c1 = Conflict::new(
            "e1",
            "f",
            ConflictType::ValueMismatch,
            vec![
                candidate("a", FieldValue::Int(1)),
                candidate("b", FieldValue::Int(2)),
            ],
        );
        let c2 = Conflict::new(
            "e2",
            "f",
            ConflictType::ValueMismatch,
            vec![
                candidate("a", FieldValue::Int(1)),
                candidate("b", FieldValue::Int(2)),
            ],
        );
        let resolved_id = c2.id;
        store.insert(c1).unwrap();
        store.insert(c2).unwrap();
        store
            .transition_if_pending(resolved_id, ConflictStatus::Resolved)
            .unwrap();

        assert_eq!(store.list(None).unwrap().len(), 2);
        assert_eq!(store.list(Some(ConflictStatus::Pending)).unwrap().len(), 1);
        assert_eq!(store.list(Some(ConflictStatus::Resolved)).unwrap().len(), 1);
        assert_eq!(store.list(Some(ConflictStatus::Ignored)).unwrap().len(), 0);
    }

    #[test]
    fn test_resolution_store_rejects_second_resolution() {
        let store = InMemoryResolutionStore::default();
        let id = ConflictId::new();
        store
            .insert(Resolution::new(
                id,
                FieldValue::Int(1),
                crate::resolution::ResolutionStrategy::PriorityBased,
                "reconciliation-engine",
            ))
            .unwrap();

        let err = store
            .insert(Resolution::new(
                id,
                FieldValue::Int(2),
                crate::resolution::ResolutionStrategy::Manual,
                "operator-1",
            ))
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));

        // Original untouched.
        let stored = store.get(id).unwrap().unwrap();
        assert_eq!(stored.chosen_value, FieldValue::Int(1));
    }

    #[test]
    fn test_priority_store_upsert_semantics() {
        let store = InMemoryPriorityStore::default();
        assert!(store.get("s").unwrap().is_none());

        store
            .upsert(SourcePriority::new("s", 8, 1.0, HashMap::new()).unwrap())
            .unwrap();
        store
            .upsert(SourcePriority::new("s", 3, 1.0, HashMap::new()).unwrap())
            .unwrap();

        assert_eq!(store.get("s").unwrap().unwrap().priority_level, 3);
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
