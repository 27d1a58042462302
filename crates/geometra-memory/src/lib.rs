//! Dual-tier conversational memory.
//!
//! Records land in a TTL-bounded short-term tier first and are copied on a
//! best-effort basis into a long-term tier that supports semantic search.
//! [`MemoryCoordinator`] is the entry point; the stores talk to their
//! backends only through [`KeyValueClient`] and [`VectorClient`].

pub mod backends;
pub mod client;
pub mod coordinator;
pub mod embedding;
pub mod error;
pub mod long_term;
pub mod model;
pub mod short_term;
pub mod sync;

/// Backend client capabilities.
pub use client::{
    Fields, KeyValueClient, MetadataFilter, ScoredDocument, VectorClient, VectorDocument,
    VectorSelection,
};
/// Coordinator and its options.
pub use coordinator::{
    ClearReport, CoordinatorOptions, DEFAULT_CONTEXT_WINDOW, DEFAULT_TTL, MemoryCoordinator,
    format_context,
};
/// Embedding providers.
pub use embedding::{Embedder, HashingEmbedder, OpenAiEmbedder};
/// Error types.
pub use error::{ClientError, MemoryError};
/// Long-term tier.
pub use long_term::{LongTermOptions, LongTermStore};
/// Record model.
pub use model::{
    MemoryId, MemoryRecord, Metadata, MetadataValue, RecalledMemory, StoreMemoryRequest, Tier,
};
/// Short-term tier.
pub use short_term::{ShortTermOptions, ShortTermStore};
/// Sync outcome recording.
pub use sync::{
    LoggingSyncObserver, SyncLedger, SyncMode, SyncObserver, SyncOutcome, SyncReport,
};
