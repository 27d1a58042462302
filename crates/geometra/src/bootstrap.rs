//! Wire a `GeometraConfig` into concrete backends and a coordinator.

use geometra_config::{
    ConfigError, CoordinatorConfig, EmbeddingConfig, EmbeddingProviderKind, EnvSource,
    GeometraConfig, KeyValueBackend, LongTermConfig, ShortTermConfig, SyncModeConfig,
    VectorBackend,
};
use geometra_memory::backends::{
    ChromaClient, InMemoryKeyValue, InMemoryVectorStore, RedisKeyValue,
};
use geometra_memory::embedding::{
    DEFAULT_HASHING_DIMENSIONS, DEFAULT_OPENAI_DIMENSIONS, DEFAULT_OPENAI_MODEL,
};
use geometra_memory::{
    ClientError, CoordinatorOptions, Embedder, HashingEmbedder, KeyValueClient, LongTermOptions,
    LongTermStore, MemoryCoordinator, OpenAiEmbedder, ShortTermOptions, ShortTermStore, SyncMode,
    Tier, VectorClient,
};
use log::info;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while building a coordinator from configuration.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A backend could not be reached while connecting.
    #[error("failed to connect {tier} backend: {source}")]
    Backend {
        tier: Tier,
        #[source]
        source: ClientError,
    },
    /// The embedding provider needs an API key that is not set.
    #[error("embedding provider requires the {0} environment variable")]
    MissingApiKey(String),
}

/// Load the layered config for `cwd` and connect.
pub async fn load_and_connect(cwd: impl AsRef<Path>) -> Result<MemoryCoordinator, BootstrapError> {
    let layered = GeometraConfig::load_layered(cwd)?;
    connect(&layered.config).await
}

/// Build a coordinator from config, reading secrets from the process environment.
pub async fn connect(config: &GeometraConfig) -> Result<MemoryCoordinator, BootstrapError> {
    connect_with_env(config, &EnvSource::Process).await
}

/// Build a coordinator from config, reading secrets from `env`.
pub async fn connect_with_env(
    config: &GeometraConfig,
    env: &EnvSource,
) -> Result<MemoryCoordinator, BootstrapError> {
    config.validate()?;
    let key_value = key_value_from_config(&config.short_term).await?;
    let embedder = embedder_from_config(&config.long_term.embedding, env)?;
    let vectors = vector_client_from_config(&config.long_term, embedder).await?;
    let coordinator = MemoryCoordinator::with_options(
        ShortTermStore::with_options(key_value, short_term_options_from_config(&config.short_term)),
        LongTermStore::with_options(vectors, long_term_options_from_config(&config.long_term)),
        coordinator_options_from_config(&config.short_term, &config.coordinator),
    );
    info!(
        "memory coordinator ready (short_term={:?}, long_term={:?}, sync_mode={:?})",
        config.short_term.backend, config.long_term.backend, config.coordinator.sync_mode
    );
    Ok(coordinator)
}

async fn key_value_from_config(
    config: &ShortTermConfig,
) -> Result<Arc<dyn KeyValueClient>, BootstrapError> {
    match config.backend {
        KeyValueBackend::Memory => Ok(Arc::new(InMemoryKeyValue::new())),
        KeyValueBackend::Redis => {
            let client = bounded(
                Tier::ShortTerm,
                config.call_timeout(),
                RedisKeyValue::connect(&config.url),
            )
            .await?;
            Ok(Arc::new(client))
        }
    }
}

async fn vector_client_from_config(
    config: &LongTermConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn VectorClient>, BootstrapError> {
    match config.backend {
        VectorBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new(embedder))),
        VectorBackend::Chroma => {
            let client = bounded(
                Tier::LongTerm,
                config.call_timeout(),
                ChromaClient::connect(&config.url, &config.collection, embedder),
            )
            .await?;
            Ok(Arc::new(client))
        }
    }
}

/// Build the embedding provider named in config.
pub fn embedder_from_config(
    config: &EmbeddingConfig,
    env: &EnvSource,
) -> Result<Arc<dyn Embedder>, BootstrapError> {
    match config.provider {
        EmbeddingProviderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(
            config.dimensions.unwrap_or(DEFAULT_HASHING_DIMENSIONS),
        ))),
        EmbeddingProviderKind::OpenAi => {
            let api_key = env
                .get(&config.api_key_env)
                .ok_or_else(|| BootstrapError::MissingApiKey(config.api_key_env.clone()))?;
            let mut embedder = OpenAiEmbedder::new(api_key).with_model(
                config
                    .model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                config.dimensions.unwrap_or(DEFAULT_OPENAI_DIMENSIONS),
            );
            if let Some(base_url) = &config.base_url {
                embedder = embedder.with_base_url(base_url.clone());
            }
            Ok(Arc::new(embedder))
        }
    }
}

/// Translate short-term config into store options.
pub fn short_term_options_from_config(config: &ShortTermConfig) -> ShortTermOptions {
    ShortTermOptions {
        max_recent: config.max_recent,
        call_timeout: config.call_timeout(),
    }
}

/// Translate long-term config into store options.
pub fn long_term_options_from_config(config: &LongTermConfig) -> LongTermOptions {
    LongTermOptions {
        call_timeout: config.call_timeout(),
    }
}

/// Translate coordinator config into runtime options.
pub fn coordinator_options_from_config(
    short_term: &ShortTermConfig,
    config: &CoordinatorConfig,
) -> CoordinatorOptions {
    CoordinatorOptions {
        default_ttl: short_term.default_ttl(),
        sync_mode: sync_mode_from_config(config.sync_mode),
        sync_timeout: config.sync_timeout(),
        context_window: config.context_window,
    }
}

/// Map sync mode from config to runtime enum.
fn sync_mode_from_config(mode: SyncModeConfig) -> SyncMode {
    match mode {
        SyncModeConfig::Inline => SyncMode::Inline,
        SyncModeConfig::Background => SyncMode::Background,
    }
}

async fn bounded<T, F>(tier: Tier, deadline: Duration, connect: F) -> Result<T, BootstrapError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match tokio::time::timeout(deadline, connect).await {
        Ok(Ok(client)) => Ok(client),
        Ok(Err(source)) => Err(BootstrapError::Backend { tier, source }),
        Err(_) => Err(BootstrapError::Backend {
            tier,
            source: ClientError::Timeout(deadline),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geometra_config::GeometraConfigBuilder;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn coordinator_options_take_ttl_from_short_term() {
        let mut short_term = ShortTermConfig::default();
        short_term.default_ttl_secs = 42;
        let coordinator = CoordinatorConfig {
            sync_mode: SyncModeConfig::Background,
            ..CoordinatorConfig::default()
        };
        let options = coordinator_options_from_config(&short_term, &coordinator);
        assert_eq!(options.default_ttl, Duration::from_secs(42));
        assert_eq!(options.sync_mode, SyncMode::Background);
        assert_eq!(options.context_window, 10);
    }

    #[test]
    fn openai_embedder_requires_a_key() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderKind::OpenAi,
            ..EmbeddingConfig::default()
        };
        let err = embedder_from_config(&config, &EnvSource::Disabled)
            .err()
            .expect("missing key");
        assert!(matches!(err, BootstrapError::MissingApiKey(var) if var == "OPENAI_API_KEY"));

        let env = EnvSource::Fixed(HashMap::from([(
            "OPENAI_API_KEY".to_string(),
            "sk-test".to_string(),
        )]));
        let embedder = embedder_from_config(&config, &env).expect("embedder");
        assert_eq!(embedder.model_name(), "text-embedding-ada-002");
        assert_eq!(embedder.dimensions(), 1536);
    }

    #[test]
    fn hashing_embedder_honours_dimensions() {
        let config = EmbeddingConfig {
            dimensions: Some(32),
            ..EmbeddingConfig::default()
        };
        let embedder = embedder_from_config(&config, &EnvSource::Disabled).expect("embedder");
        assert_eq!(embedder.dimensions(), 32);
    }

    #[tokio::test]
    async fn in_memory_config_connects_without_network() {
        let config = GeometraConfigBuilder::new().in_memory().build();
        let memory = connect_with_env(&config, &EnvSource::Disabled)
            .await
            .expect("coordinator");
        assert_eq!(memory.options().context_window, 10);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_connecting() {
        let mut config = GeometraConfigBuilder::new().in_memory().build();
        config.short_term.max_recent = 0;
        let err = connect_with_env(&config, &EnvSource::Disabled)
            .await
            .err()
            .expect("invalid");
        assert!(matches!(err, BootstrapError::Config(_)));
    }
}
