//! Layered config loading.
//!
//! Files are read from the system, user and working-directory locations,
//! then any runtime files, then environment overrides. Each file is checked
//! on its own before the stack is merged and the result validated as a
//! whole.

mod discovery;
mod env;
mod merge;
mod schema;

#[cfg(test)]
mod tests;

pub use env::{
    CHROMA_HOST, CHROMA_PORT, EnvSource, MEMORY_CONTEXT_WINDOW, REDIS_TTL_SECONDS, REDIS_URL,
};

use crate::{ConfigError, GeometraConfig};
use log::{debug, info};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "geometra.json5";
const DEFAULT_CONFIG_DIR: &str = ".geometra";
#[cfg(unix)]
const SYSTEM_CONFIG_PATH: &str = "/etc/geometra/geometra.json5";

/// Merged config and the layers it was built from.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub config: GeometraConfig,
    /// Contributing layers, lowest precedence first.
    pub layers: Vec<ConfigLayer>,
}

/// Where a layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    System,
    User,
    /// `geometra.json5` in the working directory.
    Cwd,
    /// Files passed explicitly by the caller.
    Runtime,
    /// `REDIS_URL`, `CHROMA_HOST` and friends.
    Environment,
}

/// One contributing layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    /// `None` for the environment layer.
    pub path: Option<PathBuf>,
}

/// Individual layers may set zero-valued numbers that a later layer fixes;
/// the merged document may not.
#[derive(Debug, Clone, Copy)]
enum SchemaMode {
    Partial,
    Full,
}

/// Where [`GeometraConfig::load_layered_with_options`] looks for layers.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    pub cwd: PathBuf,
    /// System config file; `/etc/geometra/geometra.json5` on Unix.
    pub system_config_path: Option<PathBuf>,
    /// User config file; `~/.geometra/geometra.json5`.
    pub user_config_path: Option<PathBuf>,
    /// Required files applied above the discovered ones, in order.
    pub runtime_paths: Vec<PathBuf>,
    pub env: EnvSource,
}

impl LayeredConfigOptions {
    /// Default locations for `cwd`, reading the process environment.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            system_config_path: discovery::system_config_path(),
            user_config_path: discovery::user_config_path(),
            runtime_paths: Vec::new(),
            env: EnvSource::Process,
        }
    }

    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self, env: EnvSource) -> Self {
        self.env = env;
        self
    }
}

impl GeometraConfig {
    /// Read one file as a complete config. No layering and no environment.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("loading single config file (path={})", path.display());
        Self::load_from_str(&fs::read_to_string(path)?)
    }

    /// Parse JSON5 text as a complete config.
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        config_from_value(json5::from_str(contents)?, "config")
    }

    /// Layered load from the default locations.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Layered load from explicit locations.
    ///
    /// Precedence, lowest first: system, user, cwd, runtime files in order,
    /// environment.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let mut loaded = Vec::new();
        for candidate in discovery::candidates(&options)? {
            if let Some(layer) = discovery::read(&candidate)? {
                loaded.push(layer);
            }
        }
        if let Some(document) = env::env_layer(&options.env)? {
            schema::validate_layer_schema(&document, SchemaMode::Partial, env::ENV_LABEL)?;
            debug!("applying environment overrides");
            loaded.push(LoadedLayer {
                layer: ConfigLayer {
                    source: ConfigLayerSource::Environment,
                    path: None,
                },
                document,
            });
        }

        let mut effective = Value::Object(Map::new());
        let mut layers = Vec::with_capacity(loaded.len());
        for LoadedLayer { layer, document } in loaded {
            merge::merge_json_values(&mut effective, &document);
            layers.push(layer);
        }
        let config = config_from_value(effective, "effective")?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Checks that serde cannot express: non-empty strings, non-zero limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("short_term.url", self.short_term.url.trim().is_empty()),
            ("long_term.url", self.long_term.url.trim().is_empty()),
            (
                "long_term.collection",
                self.long_term.collection.trim().is_empty(),
            ),
            (
                "long_term.embedding.api_key_env",
                self.long_term.embedding.api_key_env.trim().is_empty(),
            ),
        ];
        for (path, empty) in checks {
            if empty {
                return Err(ConfigError::InvalidField {
                    path: path.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        let positive = [
            ("short_term.default_ttl_secs", self.short_term.default_ttl_secs),
            ("short_term.max_recent", self.short_term.max_recent as u64),
            ("short_term.timeout_ms", self.short_term.timeout_ms),
            ("long_term.timeout_ms", self.long_term.timeout_ms),
            ("coordinator.sync_timeout_ms", self.coordinator.sync_timeout_ms),
            (
                "coordinator.context_window",
                self.coordinator.context_window as u64,
            ),
        ];
        for (path, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidField {
                    path: path.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }

        if self.long_term.embedding.dimensions == Some(0) {
            return Err(ConfigError::Invalid(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// A parsed layer waiting to be merged.
#[derive(Debug, Clone)]
struct LoadedLayer {
    layer: ConfigLayer,
    document: Value,
}

fn config_from_value(value: Value, label: &str) -> Result<GeometraConfig, ConfigError> {
    schema::validate_layer_schema(&value, SchemaMode::Full, label)?;
    let config: GeometraConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}
