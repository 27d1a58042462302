//! Test helpers shared across Geometra crates.

pub mod clients;
pub mod fixtures;
pub mod observer;

pub use clients::{
    FailingKeyValueClient, FailingVectorClient, ReadFailingKeyValueClient, StalledKeyValueClient,
    StalledVectorClient,
};
pub use fixtures::{
    MemoryFixture, coordinator_with, memory_coordinator, memory_coordinator_with_options,
};
pub use observer::RecordingSyncObserver;
