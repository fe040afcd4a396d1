//! Declarative presets loaded from TOML files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::registry::{is_path_like, normalize_path, plugin_key};
use crate::{BoxError, Plugin, PluggableError, PluggableResult, PluginApi, PluginDeclaration, PluginReturn};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    #[serde(default)]
    presets: Vec<PluginDeclaration>,
    #[serde(default)]
    plugins: Vec<PluginDeclaration>,
}

/// A preset described by a TOML file.
///
/// Relative ids (`./extra.toml`) resolve against the manifest's directory.
///
/// ```toml
/// presets = ["rigger-preset-release"]
/// plugins = ["rigger-plugin-git", ["rigger-plugin-bump", { files = ["VERSION"] }]]
/// ```
#[derive(Debug, Clone)]
pub struct ManifestPlugin {
    name: String,
    version: String,
    description: String,
    path: PathBuf,
    presets: Vec<PluginDeclaration>,
    plugins: Vec<PluginDeclaration>,
}

impl ManifestPlugin {
    /// Loads a manifest from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PluggableError::Manifest`] if the file cannot be read or is
    /// not a valid manifest.
    pub fn load(path: &Path) -> PluggableResult<Self> {
        let manifest_error = |reason: String| PluggableError::Manifest {
            path: path.display().to_string(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
        let file: ManifestFile =
            toml::from_str(&content).map_err(|e| manifest_error(e.message().to_string()))?;

        debug!(
            path = %path.display(),
            presets = file.presets.len(),
            plugins = file.plugins.len(),
            "loaded manifest"
        );

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let anchor_all = |declarations: Vec<PluginDeclaration>| {
            declarations
                .into_iter()
                .map(|declaration| anchor(declaration, base))
                .collect()
        };

        Ok(Self {
            name: file
                .name
                .unwrap_or_else(|| plugin_key(&path.to_string_lossy())),
            version: file.version.unwrap_or_else(|| "0.0.0".to_string()),
            description: file.description.unwrap_or_default(),
            path: path.to_path_buf(),
            presets: anchor_all(file.presets),
            plugins: anchor_all(file.plugins),
        })
    }

    /// Returns the file this manifest was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn anchor(declaration: PluginDeclaration, base: &Path) -> PluginDeclaration {
    let anchored = |id: &str| normalize_path(&base.join(id)).to_string_lossy().into_owned();
    match declaration {
        PluginDeclaration::Id(id) if is_path_like(&id) => PluginDeclaration::Id(anchored(&id)),
        PluginDeclaration::WithOptions(id, options) if is_path_like(&id) => {
            PluginDeclaration::WithOptions(anchored(&id), options)
        }
        other => other,
    }
}

impl Plugin for ManifestPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn apply(
        &self,
        _api: &mut PluginApi<'_>,
        _options: &Value,
    ) -> Result<Option<PluginReturn>, BoxError> {
        Ok(Some(PluginReturn {
            presets: self.presets.clone(),
            plugins: self.plugins.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::PluginKind;
    use crate::registry::PluginRegistry;

    fn write_manifest(content: &str) -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rigger-preset-team.toml");
        fs::write(&path, content).unwrap();
        (temp_dir, path)
    }

    #[test]
    fn test_load_manifest() {
        let (_dir, path) = write_manifest(
            r#"
            description = "team defaults"
            presets = ["rigger-preset-release"]
            plugins = ["rigger-plugin-git", ["rigger-plugin-bump", { files = ["VERSION"] }]]
        "#,
        );

        let manifest = ManifestPlugin::load(&path).unwrap();
        assert_eq!(manifest.name(), "team");
        assert_eq!(manifest.version(), "0.0.0");
        assert_eq!(manifest.description(), "team defaults");
        assert_eq!(manifest.path(), path);
        assert_eq!(manifest.presets.len(), 1);
        assert_eq!(manifest.plugins.len(), 2);
        assert_eq!(manifest.plugins[1].options(), json!({ "files": ["VERSION"] }));
    }

    #[test]
    fn test_explicit_name() {
        let (_dir, path) = write_manifest(
            r#"
            name = "house-style"
            version = "1.2.0"
        "#,
        );
        let manifest = ManifestPlugin::load(&path).unwrap();
        assert_eq!(manifest.name(), "house-style");
        assert_eq!(manifest.version(), "1.2.0");
        assert!(manifest.presets.is_empty());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let (_dir, path) = write_manifest("hooks = []");
        let err = ManifestPlugin::load(&path).unwrap_err();
        assert!(matches!(err, PluggableError::Manifest { .. }));
        assert!(err.to_string().contains("rigger-preset-team.toml"));
    }

    fn ids(declarations: &[PluginDeclaration]) -> Vec<String> {
        declarations
            .iter()
            .map(|declaration| match declaration {
                PluginDeclaration::Id(id) | PluginDeclaration::WithOptions(id, _) => id.clone(),
                PluginDeclaration::Inline(plugin) => plugin.name().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_relative_ids_resolve_next_to_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let presets = temp_dir.path().join("presets");
        fs::create_dir_all(&presets).unwrap();
        fs::write(presets.join("extra.toml"), r#"description = "sibling""#).unwrap();
        let path = presets.join("team.toml");
        fs::write(
            &path,
            r#"
            presets = ["./extra.toml"]
            plugins = ["rigger-plugin-git", ["../local/plugin", { strict = true }]]
        "#,
        )
        .unwrap();

        let manifest = ManifestPlugin::load(&path).unwrap();
        assert_eq!(
            ids(&manifest.presets),
            vec![presets.join("extra.toml").to_string_lossy().into_owned()]
        );
        assert_eq!(
            ids(&manifest.plugins),
            vec![
                "rigger-plugin-git".to_string(),
                temp_dir.path().join("local/plugin").to_string_lossy().into_owned(),
            ]
        );
        assert_eq!(manifest.plugins[1].options(), json!({ "strict": true }));

        // The project root is not where the sibling lives.
        let resolved = PluginRegistry::new()
            .resolve(&manifest.presets[0], PluginKind::Preset, temp_dir.path())
            .unwrap();
        assert_eq!(resolved.key, "extra");
        assert_eq!(resolved.plugin.description(), "sibling");
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = ManifestPlugin::load(&temp_dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, PluggableError::Manifest { .. }));
    }
}
