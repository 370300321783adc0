//! Current-value projection with per-key serialization.
//!
//! The projection owns the only mutable state shared between the conflict
//! detector and the resolution engine: the active (most recent per
//! source) observation set, the authoritative value, and the recent
//! commit history per `(entity_id, field_name)` key. All mutation goes
//! through `with_state`, which serializes same-key work while leaving
//! different keys fully parallel.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::conflict::CandidateValue;
use crate::observation::FieldKey;
use crate::value::FieldValue;

/// The value currently exposed to consumers for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthoritativeValue {
    /// The committed value.
    pub value: FieldValue,

    /// The source that supplied it (`"reconciliation-engine"` when the
    /// value came from a resolution).
    pub source_id: String,

    /// When it was committed.
    pub committed_at: DateTime<Utc>,
}

/// Mutable per-key state. Only ever touched under the key's lock.
#[derive(Debug, Default)]
pub struct FieldState {
    /// Most recent observation per source, keyed by `source_id` so
    /// iteration order is deterministic.
    pub active: BTreeMap<String, CandidateValue>,

    /// The committed authoritative value, if any.
    pub authoritative: Option<AuthoritativeValue>,

    commits: VecDeque<DateTime<Utc>>,
}

impl FieldState {
    /// Commits an authoritative value and records the commit time for
    /// thrash detection, pruning history older than `thrash_window`.
    pub fn commit(
        &mut self,
        value: FieldValue,
        source_id: impl Into<String>,
        thrash_window: Duration,
    ) {
        let now = Utc::now();
        self.authoritative = Some(AuthoritativeValue {
            value,
            source_id: source_id.into(),
            committed_at: now,
        });
        self.commits.push_back(now);
        let horizon = now - thrash_window;
        while self.commits.front().is_some_and(|t| *t < horizon) {
            self.commits.pop_front();
        }
    }

    /// Number of authoritative commits within `window` of now.
    #[must_use]
    pub fn recent_commit_count(&self, window: Duration) -> usize {
        let horizon = Utc::now() - window;
        self.commits.iter().filter(|t| **t >= horizon).count()
    }
}

/// Keyed projection over all fields.
#[derive(Debug, Default)]
pub struct FieldProjection {
    states: RwLock<HashMap<FieldKey, Arc<Mutex<FieldState>>>>,
}

impl FieldProjection {
    /// Creates an empty projection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state_for(&self, key: &FieldKey) -> Arc<Mutex<FieldState>> {
        {
            let states = self.states.read().expect("projection lock poisoned");
            if let Some(state) = states.get(key) {
                return Arc::clone(state);
            }
        }
        let mut states = self.states.write().expect("projection lock poisoned");
        Arc::clone(states.entry(key.clone()).or_default())
    }

    /// Runs `f` with exclusive access to the key's state.
    ///
    /// Same-key callers are serialized; different keys proceed in
    /// parallel.
    pub fn with_state<R>(&self, key: &FieldKey, f: impl FnOnce(&mut FieldState) -> R) -> R {
        let state = self.state_for(key);
        let mut guard = state.lock().expect("field state lock poisoned");
        f(&mut guard)
    }

    /// Reads the authoritative value for a key, if one has been
    /// committed.
    #[must_use]
    pub fn authoritative(&self, key: &FieldKey) -> Option<AuthoritativeValue> {
        let state = {
            let states = self.states.read().expect("projection lock poisoned");
            states.get(key).map(Arc::clone)?
        };
        let guard = state.lock().expect("field state lock poisoned");
        guard.authoritative.clone()
    }
}
