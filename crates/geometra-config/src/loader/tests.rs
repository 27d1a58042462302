//! Tests for layered configuration loading.

use super::*;
use crate::{EmbeddingProviderKind, KeyValueBackend, SyncModeConfig};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write JSON5 contents to a path, creating parent directories if needed.
fn write_json5(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

/// Options rooted in a temp dir with no system/user layers and no env.
fn isolated_options(cwd: &Path) -> LayeredConfigOptions {
    let mut options = LayeredConfigOptions::new(cwd);
    options.system_config_path = None;
    options.user_config_path = None;
    options.env = EnvSource::Disabled;
    options
}

fn fixed_env(vars: &[(&str, &str)]) -> EnvSource {
    EnvSource::Fixed(
        vars.iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>(),
    )
}

/// Verify that a minimal config parses with defaults.
#[test]
fn parse_minimal_config() {
    let config = GeometraConfig::load_from_str("{}").expect("config");
    assert_eq!(config, GeometraConfig::default());
    assert_eq!(config.short_term.url, "redis://127.0.0.1:6379/0");
    assert_eq!(config.short_term.default_ttl().as_secs(), 3600);
    assert_eq!(config.short_term.max_recent, 100);
    assert_eq!(config.long_term.collection, "long_term_memory");
    assert_eq!(config.long_term.embedding.api_key_env, "OPENAI_API_KEY");
    assert_eq!(config.coordinator.context_window, 10);
}

/// Reject unexpected top-level config keys.
#[test]
fn rejects_unknown_top_level_key() {
    let err = GeometraConfig::load_from_str(r#"{ unexpected: true }"#).unwrap_err();
    assert!(format!("{err}").contains("unknown key"));
}

/// Reject unknown enum values with the offending path.
#[test]
fn rejects_unknown_embedding_provider() {
    let json5 = r#"{ long_term: { embedding: { provider: "magic" } } }"#;
    let err = GeometraConfig::load_from_str(json5).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("long_term.embedding.provider"));
}

/// Zero-valued timeouts are rejected in the effective config.
#[test]
fn rejects_zero_timeouts() {
    let err = GeometraConfig::load_from_str(r#"{ short_term: { timeout_ms: 0 } }"#).unwrap_err();
    assert!(format!("{err}").contains("short_term.timeout_ms"));
}

/// Validation also catches values assembled in code.
#[test]
fn validate_rejects_empty_collection() {
    let mut config = GeometraConfig::default();
    config.long_term.collection = " ".to_string();
    let err = config.validate().unwrap_err();
    assert!(format!("{err}").contains("long_term.collection"));
}

/// Parse every section.
#[test]
fn parse_full_config() {
    let json5 = r#"{
        short_term: { backend: "memory", max_recent: 5 },
        long_term: { embedding: { provider: "openai", dimensions: 1536 } },
        coordinator: { sync_mode: "background", sync_timeout_ms: 250 },
    }"#;
    let config = GeometraConfig::load_from_str(json5).expect("config");
    assert_eq!(config.short_term.backend, KeyValueBackend::Memory);
    assert_eq!(config.short_term.max_recent, 5);
    assert_eq!(
        config.long_term.embedding.provider,
        EmbeddingProviderKind::OpenAi
    );
    assert_eq!(config.coordinator.sync_mode, SyncModeConfig::Background);
    assert_eq!(config.coordinator.sync_timeout().as_millis(), 250);
}

/// Later file layers override earlier ones, key by key.
#[test]
fn cwd_layer_overrides_user_and_system() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let cwd = root.join("work");
    fs::create_dir_all(&cwd).expect("cwd");

    let system_config = root.join("system.json5");
    write_json5(
        &system_config,
        "{ short_term: { url: \"redis://system\", max_recent: 7 } }",
    );
    let user_config = root.join("user.json5");
    write_json5(&user_config, "{ short_term: { url: \"redis://user\" } }");
    write_json5(
        &cwd.join(DEFAULT_CONFIG_FILE),
        "{ short_term: { url: \"redis://cwd\" } }",
    );

    let mut options = isolated_options(&cwd);
    options.system_config_path = Some(system_config);
    options.user_config_path = Some(user_config);

    let layered = GeometraConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.short_term.url, "redis://cwd");
    assert_eq!(layered.config.short_term.max_recent, 7);
    let sources: Vec<ConfigLayerSource> = layered.layers.iter().map(|l| l.source).collect();
    assert_eq!(
        sources,
        vec![
            ConfigLayerSource::System,
            ConfigLayerSource::User,
            ConfigLayerSource::Cwd
        ]
    );
}

/// A file discovered through two locations contributes one layer.
#[test]
fn shared_user_and_cwd_file_is_read_once() {
    let temp = TempDir::new().expect("tmp");
    let cwd = temp.path();
    let shared = cwd.join(DEFAULT_CONFIG_FILE);
    write_json5(&shared, "{ coordinator: { context_window: 2 } }");

    let mut options = isolated_options(cwd);
    options.user_config_path = Some(shared);

    let layered = GeometraConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.layers.len(), 1);
    assert_eq!(layered.layers[0].source, ConfigLayerSource::User);
    assert_eq!(layered.config.coordinator.context_window, 2);
}

/// Runtime override files apply after the discovered layers.
#[test]
fn runtime_override_wins_over_cwd() {
    let temp = TempDir::new().expect("tmp");
    let cwd = temp.path();
    write_json5(
        &cwd.join(DEFAULT_CONFIG_FILE),
        "{ coordinator: { context_window: 3 } }",
    );
    let runtime_config = cwd.join("runtime.json5");
    write_json5(&runtime_config, "{ coordinator: { context_window: 4 } }");

    let options = isolated_options(cwd).with_runtime_path(&runtime_config);
    let layered = GeometraConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.coordinator.context_window, 4);
}

/// `null` in an upper layer drops an optional value set below it.
#[test]
fn null_in_upper_layer_unsets_optional_field() {
    let temp = TempDir::new().expect("tmp");
    let cwd = temp.path();
    write_json5(
        &cwd.join(DEFAULT_CONFIG_FILE),
        r#"{ long_term: { embedding: { model: "custom", dimensions: 64 } } }"#,
    );
    let runtime_config = cwd.join("runtime.json5");
    write_json5(
        &runtime_config,
        "{ long_term: { embedding: { model: null } } }",
    );

    let options = isolated_options(cwd).with_runtime_path(&runtime_config);
    let layered = GeometraConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.long_term.embedding.model, None);
    assert_eq!(layered.config.long_term.embedding.dimensions, Some(64));
}

/// A missing runtime file is an error, unlike missing discovered layers.
#[test]
fn missing_runtime_layer_fails() {
    let temp = TempDir::new().expect("tmp");
    let options = isolated_options(temp.path()).with_runtime_path(temp.path().join("nope.json5"));
    let err = GeometraConfig::load_layered_with_options(options).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFailed(_)));
}

/// Environment variables override every file layer.
#[test]
fn environment_overrides_files() {
    let temp = TempDir::new().expect("tmp");
    let cwd = temp.path();
    write_json5(
        &cwd.join(DEFAULT_CONFIG_FILE),
        "{ short_term: { url: \"redis://file\" }, coordinator: { context_window: 3 } }",
    );
    let env = fixed_env(&[
        (REDIS_URL, "redis://env:6379/1"),
        (REDIS_TTL_SECONDS, "600"),
        (CHROMA_HOST, "chroma"),
        (CHROMA_PORT, "8001"),
        (MEMORY_CONTEXT_WINDOW, "12"),
    ]);
    let options = isolated_options(cwd).with_env(env);
    let layered = GeometraConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.short_term.url, "redis://env:6379/1");
    assert_eq!(layered.config.short_term.default_ttl_secs, 600);
    assert_eq!(layered.config.long_term.url, "http://chroma:8001");
    assert_eq!(layered.config.coordinator.context_window, 12);
    assert_eq!(
        layered.layers.last().map(|layer| layer.source),
        Some(ConfigLayerSource::Environment)
    );
}

/// A port alone keeps the default host.
#[test]
fn chroma_port_alone_uses_localhost() {
    let temp = TempDir::new().expect("tmp");
    let options = isolated_options(temp.path()).with_env(fixed_env(&[(CHROMA_PORT, "9000")]));
    let layered = GeometraConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.long_term.url, "http://localhost:9000");
}

/// Malformed numeric variables are reported by name.
#[test]
fn rejects_malformed_env_numbers() {
    let temp = TempDir::new().expect("tmp");
    let options =
        isolated_options(temp.path()).with_env(fixed_env(&[(REDIS_TTL_SECONDS, "soon")]));
    let err = GeometraConfig::load_layered_with_options(options).unwrap_err();
    assert!(matches!(
        &err,
        ConfigError::InvalidEnv { var, value, .. } if var == REDIS_TTL_SECONDS && value == "soon"
    ));
    assert!(format!("{err}").contains(REDIS_TTL_SECONDS));
}

/// Empty variables count as unset.
#[test]
fn blank_env_values_are_ignored() {
    let temp = TempDir::new().expect("tmp");
    let options = isolated_options(temp.path()).with_env(fixed_env(&[(REDIS_URL, "  ")]));
    let layered = GeometraConfig::load_layered_with_options(options).expect("layered");
    assert!(layered.layers.is_empty());
    assert_eq!(layered.config.short_term.url, "redis://127.0.0.1:6379/0");
}
