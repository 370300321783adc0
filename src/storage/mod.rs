//! Storage traits and the in-memory reference backend.
//!
//! The engine only depends on the abstract traits; backends are swappable.

mod memory;
mod traits;

pub use memory::{
    InMemoryConflictStore, InMemoryLineageStore, InMemoryMetricStore, InMemoryPriorityStore,
    InMemoryResolutionStore, InMemoryStores,
};
pub use traits::{
    AppendOutcome, CasOutcome, ConflictStore, LineageStore, MetricStore, PriorityStore,
    ResolutionStore, StorageError,
};
