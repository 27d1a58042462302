//! Locating and reading config layer files.

use super::{
    ConfigLayer, ConfigLayerSource, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE, LayeredConfigOptions,
    LoadedLayer, SchemaMode, schema,
};
use crate::ConfigError;
use directories::UserDirs;
use log::debug;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A file that may contribute a layer.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Candidate {
    pub(super) source: ConfigLayerSource,
    pub(super) path: PathBuf,
    /// Runtime files must exist; discovered files are skipped when absent.
    pub(super) required: bool,
}

/// File candidates in precedence order (low to high).
///
/// A file reachable from several discovered locations is read once, at its
/// lowest precedence.
pub(super) fn candidates(options: &LayeredConfigOptions) -> Result<Vec<Candidate>, ConfigError> {
    let cwd = match options.cwd.canonicalize() {
        Ok(path) => path,
        Err(err) if err.kind() == ErrorKind::NotFound => options.cwd.clone(),
        Err(err) => return Err(ConfigError::ReadFailed(err)),
    };
    let discovered = [
        (ConfigLayerSource::System, options.system_config_path.clone()),
        (ConfigLayerSource::User, options.user_config_path.clone()),
        (ConfigLayerSource::Cwd, Some(cwd.join(DEFAULT_CONFIG_FILE))),
    ];

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (source, path) in discovered {
        let Some(path) = path else {
            continue;
        };
        let identity = path.canonicalize().unwrap_or_else(|_| path.clone());
        if !seen.insert(identity) {
            debug!(
                "config file already discovered (source={source:?}, path={})",
                path.display()
            );
            continue;
        }
        out.push(Candidate {
            source,
            path,
            required: false,
        });
    }
    out.extend(options.runtime_paths.iter().map(|path| Candidate {
        source: ConfigLayerSource::Runtime,
        path: path.clone(),
        required: true,
    }));
    Ok(out)
}

/// Read and schema-check a candidate; `None` for a missing optional file.
pub(super) fn read(candidate: &Candidate) -> Result<Option<LoadedLayer>, ConfigError> {
    let Candidate {
        source,
        path,
        required,
    } = candidate;
    if !required && !path.exists() {
        debug!(
            "no config file (source={source:?}, path={})",
            path.display()
        );
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    let document: Value = json5::from_str(&contents)?;
    schema::validate_layer_schema(&document, SchemaMode::Partial, &label(*source, path))?;
    debug!(
        "read config layer (source={source:?}, path={})",
        path.display()
    );
    Ok(Some(LoadedLayer {
        layer: ConfigLayer {
            source: *source,
            path: Some(path.clone()),
        },
        document,
    }))
}

fn label(source: ConfigLayerSource, path: &Path) -> String {
    let name = match source {
        ConfigLayerSource::System => "system",
        ConfigLayerSource::User => "user",
        ConfigLayerSource::Cwd => "cwd",
        ConfigLayerSource::Runtime => "runtime",
        ConfigLayerSource::Environment => "env",
    };
    format!("{name}({})", path.display())
}

#[cfg(unix)]
pub(super) fn system_config_path() -> Option<PathBuf> {
    Some(PathBuf::from(super::SYSTEM_CONFIG_PATH))
}

#[cfg(not(unix))]
pub(super) fn system_config_path() -> Option<PathBuf> {
    None
}

/// `~/.geometra/geometra.json5`, when a home directory is known.
pub(super) fn user_config_path() -> Option<PathBuf> {
    UserDirs::new().map(|dirs| {
        dirs.home_dir()
            .join(DEFAULT_CONFIG_DIR)
            .join(DEFAULT_CONFIG_FILE)
    })
}
