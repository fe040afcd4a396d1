//! Plugin trait, declarations and resolved plugin records.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{BoxError, PluginApi};

/// Base trait for every plugin and preset.
pub trait Plugin: Send + Sync {
    /// Returns the plugin name.
    fn name(&self) -> &str;

    /// Returns the plugin version.
    fn version(&self) -> &str;

    /// Returns a short description of the plugin.
    fn description(&self) -> &str {
        ""
    }

    /// Registers hooks, methods and (for presets) further declarations.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin cannot set itself up. Registration
    /// errors raised through `api` should be propagated with `?`.
    fn apply(
        &self,
        api: &mut PluginApi<'_>,
        options: &Value,
    ) -> Result<Option<PluginReturn>, BoxError>;
}

/// Whether a record was declared as a preset or a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Preset,
    Plugin,
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preset => write!(f, "preset"),
            Self::Plugin => write!(f, "plugin"),
        }
    }
}

/// What a plugin's `apply` may hand back: more declarations to resolve.
#[derive(Debug, Clone, Default)]
pub struct PluginReturn {
    pub presets: Vec<PluginDeclaration>,
    pub plugins: Vec<PluginDeclaration>,
}

impl PluginReturn {
    /// Creates an empty return value.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a preset declaration.
    #[must_use]
    pub fn preset(mut self, declaration: impl Into<PluginDeclaration>) -> Self {
        self.presets.push(declaration.into());
        self
    }

    /// Adds a plugin declaration.
    #[must_use]
    pub fn plugin(mut self, declaration: impl Into<PluginDeclaration>) -> Self {
        self.plugins.push(declaration.into());
        self
    }

    /// Returns true if nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty() && self.plugins.is_empty()
    }
}

/// A reference to a plugin, as written in code or configuration.
#[derive(Clone)]
pub enum PluginDeclaration {
    /// A registry name or a path.
    Id(String),
    /// A registry name or path plus options.
    WithOptions(String, Value),
    /// A plugin value supplied directly.
    Inline(Arc<dyn Plugin>),
}

impl PluginDeclaration {
    /// Declares a plugin value directly.
    pub fn inline(plugin: impl Plugin + 'static) -> Self {
        Self::Inline(Arc::new(plugin))
    }

    /// Declares an id with options.
    pub fn with_options(id: impl Into<String>, options: Value) -> Self {
        Self::WithOptions(id.into(), options)
    }

    /// Returns the declared options, `null` when there are none.
    #[must_use]
    pub fn options(&self) -> Value {
        match self {
            Self::WithOptions(_, options) => options.clone(),
            Self::Id(_) | Self::Inline(_) => Value::Null,
        }
    }
}

impl std::fmt::Debug for PluginDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => f.debug_tuple("Id").field(id).finish(),
            Self::WithOptions(id, options) => f
                .debug_tuple("WithOptions")
                .field(id)
                .field(options)
                .finish(),
            Self::Inline(plugin) => f.debug_tuple("Inline").field(&plugin.name()).finish(),
        }
    }
}

impl From<&str> for PluginDeclaration {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for PluginDeclaration {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

impl From<(&str, Value)> for PluginDeclaration {
    fn from((id, options): (&str, Value)) -> Self {
        Self::WithOptions(id.to_string(), options)
    }
}

impl<'de> Deserialize<'de> for PluginDeclaration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Id(String),
            WithOptions(String, Value),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Id(id) => Ok(Self::Id(id)),
            Raw::WithOptions(id, options) => Ok(Self::WithOptions(id, options)),
        }
    }
}

/// A plugin built from a closure.
pub struct FnPlugin<F> {
    name: String,
    apply: F,
}

impl<F> FnPlugin<F>
where
    F: Fn(&mut PluginApi<'_>, &Value) -> Result<Option<PluginReturn>, BoxError> + Send + Sync,
{
    /// Wraps `apply` as a plugin called `name`.
    pub fn new(name: impl Into<String>, apply: F) -> Self {
        Self {
            name: name.into(),
            apply,
        }
    }
}

impl<F> Plugin for FnPlugin<F>
where
    F: Fn(&mut PluginApi<'_>, &Value) -> Result<Option<PluginReturn>, BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "0.0.0"
    }

    fn apply(
        &self,
        api: &mut PluginApi<'_>,
        options: &Value,
    ) -> Result<Option<PluginReturn>, BoxError> {
        (self.apply)(api, options)
    }
}

/// A declaration resolved to a loadable plugin.
#[derive(Clone)]
pub struct ResolvedPlugin {
    /// Unique id within one runtime (registry name or normalized path).
    pub id: String,
    /// Default key, derived from the id.
    pub key: String,
    /// Preset or plugin.
    pub kind: PluginKind,
    /// Filesystem path, for path-based declarations.
    pub path: Option<PathBuf>,
    /// Declared options.
    pub options: Value,
    /// The plugin itself.
    pub plugin: Arc<dyn Plugin>,
}

impl std::fmt::Debug for ResolvedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPlugin")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
