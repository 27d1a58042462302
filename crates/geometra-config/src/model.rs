//! Configuration schema for Geometra.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root config for the memory subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GeometraConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub short_term: ShortTermConfig,
    #[serde(default)]
    pub long_term: LongTermConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

impl GeometraConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> GeometraConfigBuilder {
        GeometraConfigBuilder::new()
    }
}

/// Builder for assembling a `GeometraConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct GeometraConfigBuilder {
    config: GeometraConfig,
}

impl GeometraConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: GeometraConfig::default(),
        }
    }

    /// Replace the short-term tier configuration.
    pub fn short_term(mut self, short_term: ShortTermConfig) -> Self {
        self.config.short_term = short_term;
        self
    }

    /// Replace the long-term tier configuration.
    pub fn long_term(mut self, long_term: LongTermConfig) -> Self {
        self.config.long_term = long_term;
        self
    }

    /// Replace the coordinator configuration.
    pub fn coordinator(mut self, coordinator: CoordinatorConfig) -> Self {
        self.config.coordinator = coordinator;
        self
    }

    /// Use process-local backends for both tiers.
    pub fn in_memory(mut self) -> Self {
        self.config.short_term.backend = KeyValueBackend::Memory;
        self.config.long_term.backend = VectorBackend::Memory;
        self
    }

    /// Finalize and return the built `GeometraConfig`.
    pub fn build(self) -> GeometraConfig {
        self.config
    }
}

/// Key-value backend behind the short-term tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyValueBackend {
    #[default]
    Redis,
    Memory,
}

/// Short-term tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortTermConfig {
    #[serde(default)]
    pub backend: KeyValueBackend,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    #[serde(default = "default_max_recent")]
    pub max_recent: usize,
    #[serde(default = "default_short_term_timeout_ms")]
    pub timeout_ms: u64,
}

impl ShortTermConfig {
    /// Expiry applied to records written by the coordinator.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Deadline for a single key-value call.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ShortTermConfig {
    fn default() -> Self {
        Self {
            backend: KeyValueBackend::default(),
            url: default_redis_url(),
            default_ttl_secs: default_ttl_secs(),
            max_recent: default_max_recent(),
            timeout_ms: default_short_term_timeout_ms(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_ttl_secs() -> u64 {
    3600
}

/// Default recency-list length per owner.
fn default_max_recent() -> usize {
    100
}

fn default_short_term_timeout_ms() -> u64 {
    2_000
}

/// Vector backend behind the long-term tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    #[default]
    Chroma,
    Memory,
}

/// Long-term tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LongTermConfig {
    #[serde(default)]
    pub backend: VectorBackend,
    #[serde(default = "default_chroma_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_long_term_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl LongTermConfig {
    /// Deadline for a single vector-store call.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LongTermConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            url: default_chroma_url(),
            collection: default_collection(),
            timeout_ms: default_long_term_timeout_ms(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

fn default_chroma_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_collection() -> String {
    "long_term_memory".to_string()
}

fn default_long_term_timeout_ms() -> u64 {
    5_000
}

/// Embedding provider used by the vector backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    #[default]
    Hashing,
    #[serde(rename = "openai")]
    OpenAi,
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    /// Model name; provider default when unset.
    #[serde(default)]
    pub model: Option<String>,
    /// Vector size; provider default when unset.
    #[serde(default)]
    pub dimensions: Option<usize>,
    /// API base URL override for remote providers.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: None,
            dimensions: None,
            base_url: None,
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// How the coordinator issues the long-term write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncModeConfig {
    #[default]
    Inline,
    Background,
}

/// Coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub sync_mode: SyncModeConfig,
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

impl CoordinatorConfig {
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncModeConfig::default(),
            sync_timeout_ms: default_sync_timeout_ms(),
            context_window: default_context_window(),
        }
    }
}

fn default_sync_timeout_ms() -> u64 {
    5_000
}

/// Default number of records pulled into a prompt.
fn default_context_window() -> usize {
    10
}
