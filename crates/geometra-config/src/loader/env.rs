//! Environment-variable overrides applied above every file layer.

use crate::ConfigError;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Label used for env-derived validation errors.
pub(super) const ENV_LABEL: &str = "env";

pub const REDIS_URL: &str = "REDIS_URL";
pub const REDIS_TTL_SECONDS: &str = "REDIS_TTL_SECONDS";
pub const CHROMA_HOST: &str = "CHROMA_HOST";
pub const CHROMA_PORT: &str = "CHROMA_PORT";
pub const MEMORY_CONTEXT_WINDOW: &str = "MEMORY_CONTEXT_WINDOW";

const DEFAULT_CHROMA_HOST: &str = "localhost";
const DEFAULT_CHROMA_PORT: u16 = 8000;

/// Where environment overrides are read from.
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    /// The process environment.
    #[default]
    Process,
    /// A fixed set of variables (tests, embedding hosts).
    Fixed(HashMap<String, String>),
    /// No environment overrides.
    Disabled,
}

impl EnvSource {
    /// Look a variable up, treating empty values as unset.
    pub fn get(&self, name: &str) -> Option<String> {
        let value = match self {
            EnvSource::Process => std::env::var(name).ok(),
            EnvSource::Fixed(vars) => vars.get(name).cloned(),
            EnvSource::Disabled => None,
        }?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

/// Build an override layer from recognised variables; `None` when none are set.
pub(super) fn env_layer(source: &EnvSource) -> Result<Option<Value>, ConfigError> {
    let mut layer = Value::Object(Map::new());
    let mut found = false;

    if let Some(url) = source.get(REDIS_URL) {
        set_path(&mut layer, &["short_term", "url"], Value::String(url));
        found = true;
    }
    if let Some(raw) = source.get(REDIS_TTL_SECONDS) {
        let ttl = parse_u64(REDIS_TTL_SECONDS, &raw)?;
        set_path(&mut layer, &["short_term", "default_ttl_secs"], ttl.into());
        found = true;
    }
    let host = source.get(CHROMA_HOST);
    let port = source
        .get(CHROMA_PORT)
        .map(|raw| {
            raw.parse::<u16>().map_err(|_| {
                ConfigError::invalid_env(CHROMA_PORT, &raw, "expected port number")
            })
        })
        .transpose()?;
    if host.is_some() || port.is_some() {
        let url = chroma_url(
            host.as_deref().unwrap_or(DEFAULT_CHROMA_HOST),
            port.unwrap_or(DEFAULT_CHROMA_PORT),
        );
        set_path(&mut layer, &["long_term", "url"], Value::String(url));
        found = true;
    }
    if let Some(raw) = source.get(MEMORY_CONTEXT_WINDOW) {
        let window = parse_u64(MEMORY_CONTEXT_WINDOW, &raw)?;
        set_path(&mut layer, &["coordinator", "context_window"], window.into());
        found = true;
    }

    Ok(found.then_some(layer))
}

fn chroma_url(host: &str, port: u16) -> String {
    if host.contains("://") {
        format!("{}:{port}", host.trim_end_matches('/'))
    } else {
        format!("http://{host}:{port}")
    }
}

fn parse_u64(name: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>()
        .map_err(|_| ConfigError::invalid_env(name, raw, "expected non-negative integer"))
}

fn set_path(root: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = root;
    for key in parents {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let Value::Object(map) = cursor else {
            return;
        };
        cursor = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Value::Object(map) = cursor {
        map.insert(last.to_string(), value);
    }
}
