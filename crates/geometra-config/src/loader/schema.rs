//! Structural checks on raw JSON5 layers before they are merged.

use super::SchemaMode;
use crate::ConfigError;
use serde_json::{Map, Value};

const SHORT_TERM_KEYS: &[&str] = &[
    "backend",
    "url",
    "default_ttl_secs",
    "max_recent",
    "timeout_ms",
];
const LONG_TERM_KEYS: &[&str] = &["backend", "url", "collection", "timeout_ms", "embedding"];
const EMBEDDING_KEYS: &[&str] = &["provider", "model", "dimensions", "base_url", "api_key_env"];
const COORDINATOR_KEYS: &[&str] = &["sync_mode", "sync_timeout_ms", "context_window"];

/// Check one layer, or the merged document in full mode.
pub(super) fn validate_layer_schema(
    document: &Value,
    mode: SchemaMode,
    layer: &str,
) -> Result<(), ConfigError> {
    let check = Checker { layer, mode };
    let root = check.object(document, "")?;
    check.keys(root, &["$schema", "short_term", "long_term", "coordinator"], "")?;
    if let Some(value) = root.get("$schema") {
        check.string(value, "$schema")?;
    }
    if let Some(value) = root.get("short_term") {
        check.short_term(value)?;
    }
    if let Some(value) = root.get("long_term") {
        check.long_term(value)?;
    }
    if let Some(value) = root.get("coordinator") {
        check.coordinator(value)?;
    }
    Ok(())
}

struct Checker<'a> {
    layer: &'a str,
    mode: SchemaMode,
}

impl Checker<'_> {
    fn short_term(&self, value: &Value) -> Result<(), ConfigError> {
        let section = self.object(value, "short_term")?;
        self.keys(section, SHORT_TERM_KEYS, "short_term")?;
        self.field(section, "short_term", "backend", |v, p| {
            self.one_of(v, &["redis", "memory"], p)
        })?;
        self.field(section, "short_term", "url", |v, p| self.string(v, p))?;
        for key in ["default_ttl_secs", "max_recent", "timeout_ms"] {
            self.field(section, "short_term", key, |v, p| self.count(v, p))?;
        }
        Ok(())
    }

    fn long_term(&self, value: &Value) -> Result<(), ConfigError> {
        let section = self.object(value, "long_term")?;
        self.keys(section, LONG_TERM_KEYS, "long_term")?;
        self.field(section, "long_term", "backend", |v, p| {
            self.one_of(v, &["chroma", "memory"], p)
        })?;
        for key in ["url", "collection"] {
            self.field(section, "long_term", key, |v, p| self.string(v, p))?;
        }
        self.field(section, "long_term", "timeout_ms", |v, p| self.count(v, p))?;
        if let Some(value) = section.get("embedding") {
            self.embedding(value)?;
        }
        Ok(())
    }

    fn embedding(&self, value: &Value) -> Result<(), ConfigError> {
        const PATH: &str = "long_term.embedding";
        let section = self.object(value, PATH)?;
        self.keys(section, EMBEDDING_KEYS, PATH)?;
        self.field(section, PATH, "provider", |v, p| {
            self.one_of(v, &["hashing", "openai"], p)
        })?;
        self.field(section, PATH, "api_key_env", |v, p| self.string(v, p))?;
        // Optional fields accept null so an upper layer can unset them.
        for key in ["model", "base_url"] {
            self.field(section, PATH, key, |v, p| match v {
                Value::Null => Ok(()),
                v => self.string(v, p),
            })?;
        }
        self.field(section, PATH, "dimensions", |v, p| match v {
            Value::Null => Ok(()),
            v => self.count(v, p),
        })
    }

    fn coordinator(&self, value: &Value) -> Result<(), ConfigError> {
        let section = self.object(value, "coordinator")?;
        self.keys(section, COORDINATOR_KEYS, "coordinator")?;
        self.field(section, "coordinator", "sync_mode", |v, p| {
            self.one_of(v, &["inline", "background"], p)
        })?;
        for key in ["sync_timeout_ms", "context_window"] {
            self.field(section, "coordinator", key, |v, p| self.count(v, p))?;
        }
        Ok(())
    }

    /// Run `check` on `section[key]` when present.
    fn field(
        &self,
        section: &Map<String, Value>,
        prefix: &str,
        key: &str,
        check: impl Fn(&Value, &str) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        match section.get(key) {
            Some(value) => check(value, &format!("{prefix}.{key}")),
            None => Ok(()),
        }
    }

    fn object<'v>(
        &self,
        value: &'v Value,
        path: &str,
    ) -> Result<&'v Map<String, Value>, ConfigError> {
        value
            .as_object()
            .ok_or_else(|| self.error(path, "expected object"))
    }

    fn keys(
        &self,
        section: &Map<String, Value>,
        allowed: &[&str],
        path: &str,
    ) -> Result<(), ConfigError> {
        match section.keys().find(|key| !allowed.contains(&key.as_str())) {
            Some(unknown) if path.is_empty() => Err(self.error(unknown, "unknown key")),
            Some(unknown) => Err(self.error(&format!("{path}.{unknown}"), "unknown key")),
            None => Ok(()),
        }
    }

    fn string(&self, value: &Value, path: &str) -> Result<(), ConfigError> {
        match value {
            Value::String(_) => Ok(()),
            _ => Err(self.error(path, "expected string")),
        }
    }

    fn one_of(&self, value: &Value, allowed: &[&str], path: &str) -> Result<(), ConfigError> {
        let Some(value) = value.as_str() else {
            return Err(self.error(path, "expected string"));
        };
        if allowed.contains(&value) {
            Ok(())
        } else {
            Err(self.error(path, &format!("expected one of: {}", allowed.join(", "))))
        }
    }

    /// Non-negative integer; zero only survives in partial layers.
    fn count(&self, value: &Value, path: &str) -> Result<(), ConfigError> {
        match (value.as_u64(), self.mode) {
            (None, _) => Err(self.error(path, "expected non-negative integer")),
            (Some(0), SchemaMode::Full) => Err(self.error(path, "must be greater than zero")),
            (Some(_), _) => Ok(()),
        }
    }

    fn error(&self, path: &str, message: &str) -> ConfigError {
        let path = if path.is_empty() { "root" } else { path };
        ConfigError::InvalidField {
            path: format!("{}:{path}", self.layer),
            message: message.to_string(),
        }
    }
}
