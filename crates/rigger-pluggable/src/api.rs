//! The object handed to every plugin's `apply`.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::trace;

use crate::pluggable::RuntimeState;
use crate::{
    BoxError, HookBuilder, HookInput, Methods, PluggableError, PluggableResult, PluginDeclaration,
    PluginKind, Stage,
};

/// Checks one plugin's section of the user configuration.
///
/// Returns every problem found, not just the first.
pub type ConfigValidator = Arc<dyn Fn(&Value) -> Result<(), Vec<String>> + Send + Sync>;

/// Identity and participation settings declared through
/// [`PluginApi::describe`]. Unset fields keep their current value.
#[derive(Clone, Default)]
pub struct PluginDescriptor {
    pub(crate) key: Option<String>,
    pub(crate) enable: Option<bool>,
    pub(crate) config_validator: Option<ConfigValidator>,
}

impl PluginDescriptor {
    /// Creates an empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the plugin key.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Enables or disables the plugin's hooks.
    #[must_use]
    pub fn enable(mut self, enable: bool) -> Self {
        self.enable = Some(enable);
        self
    }

    /// Validates this plugin's section of the user configuration.
    #[must_use]
    pub fn config_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), Vec<String>> + Send + Sync + 'static,
    {
        self.config_validator = Some(Arc::new(validator));
        self
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("key", &self.key)
            .field("enable", &self.enable)
            .field("config_validator", &self.config_validator.is_some())
            .finish()
    }
}

/// Registration surface for one plugin during its `apply` turn.
pub struct PluginApi<'a> {
    index: usize,
    stage: Stage,
    cwd: &'a Path,
    props: &'a Map<String, Value>,
    user_config: &'a Value,
    state: &'a mut RuntimeState,
    presets: Vec<PluginDeclaration>,
    plugins: Vec<PluginDeclaration>,
}

impl<'a> PluginApi<'a> {
    pub(crate) fn new(
        index: usize,
        stage: Stage,
        cwd: &'a Path,
        props: &'a Map<String, Value>,
        user_config: &'a Value,
        state: &'a mut RuntimeState,
    ) -> Self {
        Self {
            index,
            stage,
            cwd,
            props,
            user_config,
            state,
            presets: Vec::new(),
            plugins: Vec::new(),
        }
    }

    /// Returns the declarations queued through `register_presets` and
    /// `register_plugins`.
    pub(crate) fn into_queued(self) -> (Vec<PluginDeclaration>, Vec<PluginDeclaration>) {
        (self.presets, self.plugins)
    }

    /// Returns the id of the plugin being applied.
    #[must_use]
    pub fn id(&self) -> &str {
        self.state.plugins[self.index].id()
    }

    /// Returns the current key of the plugin being applied.
    #[must_use]
    pub fn key(&self) -> &str {
        self.state.plugins[self.index].key()
    }

    /// Returns whether the plugin was declared as a preset or a plugin.
    #[must_use]
    pub fn kind(&self) -> PluginKind {
        self.state.plugins[self.index].kind()
    }

    /// Returns the working directory of the runtime.
    #[must_use]
    pub fn cwd(&self) -> &Path {
        self.cwd
    }

    /// Returns the runtime stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Returns a handle to the shared method table.
    #[must_use]
    pub fn methods(&self) -> Methods {
        self.state.methods.clone()
    }

    /// Returns a property injected by the owning service.
    #[must_use]
    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    /// Returns a property decoded as `T`, `None` when it is not set.
    ///
    /// # Errors
    ///
    /// Returns [`PluggableError::InvalidValue`] if the property does not
    /// decode as `T`.
    pub fn prop_as<T: DeserializeOwned>(&self, name: &str) -> PluggableResult<Option<T>> {
        self.prop(name)
            .map(|value| {
                T::deserialize(value).map_err(|e| PluggableError::InvalidValue {
                    key: name.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Returns this plugin's section of the user configuration.
    #[must_use]
    pub fn user_config(&self) -> Option<&Value> {
        self.user_config.get(self.key())
    }

    /// Declares the plugin's key, participation and config validator.
    pub fn describe(&mut self, descriptor: PluginDescriptor) {
        let entry = &mut self.state.plugins[self.index];
        trace!(plugin = %entry.id(), ?descriptor, "describe");
        entry.describe(descriptor);
    }

    /// Registers a hook.
    ///
    /// # Errors
    ///
    /// Returns [`PluggableError::InvalidHook`] when the builder lacks its key
    /// or handler, and [`PluggableError::InvalidPhase`] outside of plugin
    /// application.
    pub fn register(&mut self, hook: HookBuilder) -> PluggableResult<()> {
        self.check_applying("register")?;

        let seq = self.state.pending.len();
        let entry = &self.state.plugins[self.index];
        let hook = hook.build(entry.id(), entry.key(), seq)?;
        trace!(plugin = %hook.plugin, key = %hook.key, seq, "registered hook");
        self.state.pending.push(hook);
        Ok(())
    }

    /// Registers a hook with default ordering.
    ///
    /// # Errors
    ///
    /// Same as [`PluginApi::register`].
    pub fn on<F, Fut>(&mut self, key: &str, handler: F) -> PluggableResult<()>
    where
        F: Fn(HookInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        self.register(HookBuilder::new().key(key).handler(handler))
    }

    /// Registers a named method.
    ///
    /// # Errors
    ///
    /// Returns [`PluggableError::DuplicateMethod`] if the name is taken and
    /// [`PluggableError::InvalidPhase`] outside of plugin application.
    pub fn register_method<F, Fut>(&mut self, name: &str, handler: F) -> PluggableResult<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        self.check_applying("register_method")?;
        let plugin = self.state.plugins[self.index].id().to_string();
        self.state.methods.insert(name, &plugin, handler)
    }

    /// Queues further presets. Presets only.
    ///
    /// # Errors
    ///
    /// Returns [`PluggableError::InvalidPhase`] unless a preset is being
    /// applied during [`Stage::InitPresets`].
    pub fn register_presets<I, D>(&mut self, presets: I) -> PluggableResult<()>
    where
        I: IntoIterator<Item = D>,
        D: Into<PluginDeclaration>,
    {
        self.check_preset("register_presets")?;
        self.presets.extend(presets.into_iter().map(Into::into));
        Ok(())
    }

    /// Queues further plugins. Presets only.
    ///
    /// # Errors
    ///
    /// Returns [`PluggableError::InvalidPhase`] unless a preset is being
    /// applied during [`Stage::InitPresets`].
    pub fn register_plugins<I, D>(&mut self, plugins: I) -> PluggableResult<()>
    where
        I: IntoIterator<Item = D>,
        D: Into<PluginDeclaration>,
    {
        self.check_preset("register_plugins")?;
        self.plugins.extend(plugins.into_iter().map(Into::into));
        Ok(())
    }

    fn check_applying(&self, action: &'static str) -> PluggableResult<()> {
        if self.stage.is_applying() {
            Ok(())
        } else {
            Err(self.phase_error(action))
        }
    }

    fn check_preset(&self, action: &'static str) -> PluggableResult<()> {
        if self.stage == Stage::InitPresets && self.kind() == PluginKind::Preset {
            Ok(())
        } else {
            Err(self.phase_error(action))
        }
    }

    fn phase_error(&self, action: &'static str) -> PluggableError {
        PluggableError::InvalidPhase {
            plugin: self.id().to_string(),
            action,
            stage: self.stage,
        }
    }
}

impl std::fmt::Debug for PluginApi<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginApi")
            .field("id", &self.id())
            .field("key", &self.key())
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}
