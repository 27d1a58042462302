use crate::observer::RecordingSyncObserver;
use geometra_memory::backends::{InMemoryKeyValue, InMemoryVectorStore};
use geometra_memory::{
    CoordinatorOptions, KeyValueClient, LongTermStore, MemoryCoordinator, ShortTermStore,
    VectorClient,
};
use std::sync::Arc;

/// Coordinator over in-memory backends, with handles to inspect them.
pub struct MemoryFixture {
    pub coordinator: MemoryCoordinator,
    pub key_value: Arc<InMemoryKeyValue>,
    pub vectors: Arc<InMemoryVectorStore>,
    pub observer: Arc<RecordingSyncObserver>,
}

/// In-memory coordinator with default options.
pub fn memory_coordinator() -> MemoryFixture {
    memory_coordinator_with_options(CoordinatorOptions::default())
}

/// In-memory coordinator with explicit options.
pub fn memory_coordinator_with_options(options: CoordinatorOptions) -> MemoryFixture {
    let key_value = Arc::new(InMemoryKeyValue::new());
    let vectors = Arc::new(InMemoryVectorStore::default());
    let (coordinator, observer) = coordinator_with(key_value.clone(), vectors.clone(), options);
    MemoryFixture {
        coordinator,
        key_value,
        vectors,
        observer,
    }
}

/// Coordinator over arbitrary clients, observed by a recording observer.
pub fn coordinator_with(
    key_value: Arc<dyn KeyValueClient>,
    vectors: Arc<dyn VectorClient>,
    options: CoordinatorOptions,
) -> (MemoryCoordinator, Arc<RecordingSyncObserver>) {
    let observer = Arc::new(RecordingSyncObserver::new());
    let coordinator = MemoryCoordinator::with_options(
        ShortTermStore::new(key_value),
        LongTermStore::new(vectors),
        options,
    )
    .with_observer(observer.clone());
    (coordinator, observer)
}
