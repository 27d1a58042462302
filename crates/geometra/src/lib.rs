//! Public SDK surface for Geometra.
//!
//! This crate re-exports the memory and config building blocks, wires a
//! loaded config into concrete backends, and provides a small logging
//! initialization helper to keep consumer setup consistent.

mod bootstrap;

/// Re-export for convenience.
pub use geometra_config as config;
/// Re-export for convenience.
pub use geometra_memory as memory;

/// Config-to-runtime wiring.
pub use bootstrap::{
    BootstrapError, connect, connect_with_env, coordinator_options_from_config,
    embedder_from_config, load_and_connect, long_term_options_from_config,
    short_term_options_from_config,
};
/// Types most callers need.
pub use geometra_memory::{
    ClearReport, MemoryCoordinator, MemoryError, MemoryId, MemoryRecord, Metadata,
    RecalledMemory, StoreMemoryRequest, Tier,
};

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// This is a no-op if the feature is not enabled. Binaries are still expected
/// to call this early in startup to ensure log output is wired up.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
}
