//! Plugin factory table and declaration resolution.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::manifest::ManifestPlugin;
use crate::{
    Plugin, PluggableError, PluggableResult, PluginDeclaration, PluginKind, ResolvedPlugin,
};

/// Name prefixes dropped when deriving a plugin key.
const KEY_PREFIXES: &[&str] = &["rigger-plugin-", "rigger-preset-", "plugin-", "preset-"];

/// Maps plugin ids to plugin values.
///
/// Ids are either plain names (`rigger-plugin-git`) or absolute paths.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `plugin` under `id`, replacing any previous entry.
    pub fn insert(&mut self, id: impl Into<String>, plugin: impl Plugin + 'static) {
        self.plugins.insert(id.into(), Arc::new(plugin));
    }

    /// Registers `plugin` under `id`.
    #[must_use]
    pub fn with(mut self, id: impl Into<String>, plugin: impl Plugin + 'static) -> Self {
        self.insert(id, plugin);
        self
    }

    /// Returns the plugin registered under `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(id).cloned()
    }

    /// Returns true if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    /// Returns every registered id, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Resolves a declaration to a loadable plugin.
    ///
    /// # Errors
    ///
    /// Returns [`PluggableError::NotFound`] when the id matches neither a
    /// registry entry nor a manifest file, or a manifest error when the file
    /// exists but cannot be loaded.
    pub fn resolve(
        &self,
        declaration: &PluginDeclaration,
        kind: PluginKind,
        cwd: &Path,
    ) -> PluggableResult<ResolvedPlugin> {
        let options = declaration.options();

        let (id, path, plugin) = match declaration {
            PluginDeclaration::Inline(plugin) => (plugin.name().to_string(), None, plugin.clone()),
            PluginDeclaration::Id(id) | PluginDeclaration::WithOptions(id, _) => {
                self.resolve_id(id, cwd)?
            }
        };

        if id.is_empty() {
            return Err(PluggableError::InvalidDeclaration(format!(
                "{kind} declaration has an empty id"
            )));
        }

        debug!(%id, %kind, "resolved declaration");
        Ok(ResolvedPlugin {
            key: plugin_key(&id),
            id,
            kind,
            path,
            options: normalize_options(options),
            plugin,
        })
    }

    fn resolve_id(
        &self,
        id: &str,
        cwd: &Path,
    ) -> PluggableResult<(String, Option<PathBuf>, Arc<dyn Plugin>)> {
        if !is_path_like(id) {
            let plugin = self
                .get(id)
                .ok_or_else(|| PluggableError::NotFound(id.to_string()))?;
            return Ok((id.to_string(), None, plugin));
        }

        let path = normalize_path(&cwd.join(id));
        let path_id = path.to_string_lossy().into_owned();

        if let Some(plugin) = self.get(&path_id) {
            return Ok((path_id, Some(path), plugin));
        }

        if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            let manifest = ManifestPlugin::load(&path)?;
            return Ok((path_id, Some(path), Arc::new(manifest)));
        }

        Err(PluggableError::NotFound(id.to_string()))
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

/// Returns true for ids that name a filesystem location.
#[must_use]
pub fn is_path_like(id: &str) -> bool {
    id.starts_with("./") || id.starts_with("../") || Path::new(id).is_absolute()
}

/// Derives the default plugin key from an id.
///
/// `rigger-plugin-git-check` and `./presets/git-check.toml` both map to
/// `gitCheck`.
#[must_use]
pub fn plugin_key(id: &str) -> String {
    let last = id.rsplit(['/', '\\']).next().unwrap_or(id);
    let stem = Path::new(last)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(last);

    let name = KEY_PREFIXES
        .iter()
        .find_map(|prefix| stem.strip_prefix(prefix))
        .unwrap_or(stem);

    let mut key = String::with_capacity(name.len());
    let mut upper = false;
    for ch in name.chars() {
        if ch == '-' || ch == '_' {
            upper = !key.is_empty();
            continue;
        }
        if upper {
            key.extend(ch.to_uppercase());
            upper = false;
        } else {
            key.push(ch);
        }
    }
    key
}

/// Lexically normalizes a path, resolving `.` and `..` without touching the
/// filesystem.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn normalize_options(options: Value) -> Value {
    match options {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    }
}
