//! Layered config loading: defaults → global TOML → workspace JSON → CLI.
//!
//! Each layer is parsed into a JSON value and deep-merged over the previous
//! one, so a workspace file that sets only `embedding.model_ref` inherits
//! every other global/default value untouched.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::{AstirConfig, ConfigError, ConfigOverrides};

/// Loads and merges configuration from all sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Full load for a workspace: global config (if any), workspace config
    /// (if any), then CLI overrides, then validation.
    pub fn load(
        workspace_root: &Path,
        overrides: &ConfigOverrides,
    ) -> Result<AstirConfig, ConfigError> {
        let mut merged = serde_json::to_value(AstirConfig::default())
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if let Some(global) = Self::read_global()? {
            deep_merge(&mut merged, global);
            debug!("Merged global config");
        }

        // The workspace file location honours a CLI data-dir override.
        let data_dir = overrides
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".astir"));
        let workspace_file = if data_dir.is_absolute() {
            data_dir.join("astir.json")
        } else {
            workspace_root.join(&data_dir).join("astir.json")
        };
        if let Some(workspace) = Self::read_workspace(&workspace_file)? {
            deep_merge(&mut merged, workspace);
            debug!(path = %workspace_file.display(), "Merged workspace config");
        }

        let mut config: AstirConfig = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ValidationError(format!("merged config invalid: {e}")))?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// `~/.astir/config.toml`, if present.
    fn read_global() -> Result<Option<Value>, ConfigError> {
        let Some(home) = dirs::home_dir() else {
            return Ok(None);
        };
        let path = home.join(".astir").join("config.toml");
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let parsed: toml::Value = toml::from_str(&text).map_err(|e| ConfigError::TomlParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let json = serde_json::to_value(parsed).map_err(|e| ConfigError::TomlParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(json))
    }

    /// The versioned workspace file, if present.
    fn read_workspace(path: &Path) -> Result<Option<Value>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let json: Value = serde_json::from_str(&text).map_err(|e| ConfigError::JsonParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(json))
    }

    /// Write the workspace config file (used by `astir init`-style tooling
    /// and tests).
    pub fn write_workspace(path: &Path, config: &AstirConfig) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Recursively overlay `patch` onto `base`. Objects merge key-by-key;
/// anything else replaces.
fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, replacement) => *base_slot = replacement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn deep_merge_overlays_objects() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "b": 3});
        deep_merge(&mut base, json!({"a": {"y": 9}, "c": 4}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 9}, "b": 3, "c": 4}));
    }

    #[test]
    fn deep_merge_replaces_scalars_and_arrays() {
        let mut base = json!({"list": [1, 2, 3]});
        deep_merge(&mut base, json!({"list": [9]}));
        assert_eq!(base, json!({"list": [9]}));
    }

    #[test]
    fn load_without_any_files_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::load(dir.path(), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.server.max_in_flight, 16);
    }

    #[test]
    fn workspace_file_overlays_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".astir").join("astir.json");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(
            &file,
            r#"{"version": 1, "embedding": {"model_ref": "custom/model", "dimension": 384}}"#,
        )
        .unwrap();

        let config = ConfigLoader::load(dir.path(), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.embedding.model_ref, "custom/model");
        assert_eq!(config.embedding.dimension, 384);
        // Untouched sections keep their defaults.
        assert_eq!(config.cache.query_capacity, 512);
    }

    #[test]
    fn unsupported_workspace_version_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".astir").join("astir.json");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, r#"{"version": 42}"#).unwrap();

        let err = ConfigLoader::load(dir.path(), &ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { found: 42, .. }));
    }

    #[test]
    fn malformed_workspace_json_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".astir").join("astir.json");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "{not json").unwrap();

        let err = ConfigLoader::load(dir.path(), &ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::JsonParse { .. }));
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".astir").join("astir.json");

        let mut config = AstirConfig::default();
        config.embedding.dimension = 384;
        ConfigLoader::write_workspace(&file, &config).unwrap();

        let loaded = ConfigLoader::load(dir.path(), &ConfigOverrides::default()).unwrap();
        assert_eq!(loaded.embedding.dimension, 384);
    }
}
