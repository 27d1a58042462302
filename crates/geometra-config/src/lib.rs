//! Configuration models and layered config loading.
//!
//! This crate owns the Geometra config schema, validation, layer merging and
//! environment overrides used by the SDK when wiring memory backends.

mod error;
mod loader;
mod model;

/// Public error type returned by config loading and validation APIs.
pub use error::ConfigError;
/// Layered config types, loader options and recognised environment variables.
pub use loader::{
    CHROMA_HOST, CHROMA_PORT, ConfigLayer, ConfigLayerSource, EnvSource, LayeredConfig,
    LayeredConfigOptions, MEMORY_CONTEXT_WINDOW, REDIS_TTL_SECONDS, REDIS_URL,
};
/// Configuration schema models.
pub use model::*;
