//! The plugin runtime: resolution, hook storage and hook application.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::api::ConfigValidator;
use crate::hook::order_hooks;
use crate::{
    Hook, HookInput, Lifecycle, Methods, PluggableError, PluggableResult, PluginApi,
    PluginDeclaration, PluginDescriptor, PluginKind, PluginRegistry, PluginReturn, ResolvedPlugin,
    Stage,
};

/// Config keys the runtime itself consumes.
const RESERVED_CONFIG_KEYS: &[&str] = &["presets", "plugins"];

/// How hook results are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPluginsType {
    /// Concatenate every result onto an array.
    Add,
    /// Thread a value through every hook.
    Modify,
    /// Return the first non-null result.
    Get,
    /// Run every hook for its side effects.
    Event,
}

/// Arguments of [`Pluggable::apply_plugins`].
#[derive(Debug, Clone)]
pub struct ApplyPluginsOptions {
    pub key: String,
    pub kind: ApplyPluginsType,
    pub initial_value: Option<Value>,
    pub args: Value,
}

impl ApplyPluginsOptions {
    /// Creates options for `key` with no initial value and null args.
    pub fn new(key: impl Into<String>, kind: ApplyPluginsType) -> Self {
        Self {
            key: key.into(),
            kind,
            initial_value: None,
            args: Value::Null,
        }
    }

    /// Sets the initial value.
    #[must_use]
    pub fn initial_value(mut self, value: Value) -> Self {
        self.initial_value = Some(value);
        self
    }

    /// Sets the arguments passed to every hook.
    #[must_use]
    pub fn args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }
}

/// A plugin that went through `apply`.
#[derive(Clone)]
pub struct PluginEntry {
    resolved: ResolvedPlugin,
    key: String,
    enabled: bool,
    validator: Option<ConfigValidator>,
}

impl PluginEntry {
    fn new(resolved: ResolvedPlugin) -> Self {
        Self {
            key: resolved.key.clone(),
            resolved,
            enabled: true,
            validator: None,
        }
    }

    pub(crate) fn describe(&mut self, descriptor: PluginDescriptor) {
        if let Some(key) = descriptor.key {
            self.key = key;
        }
        if let Some(enable) = descriptor.enable {
            self.enabled = enable;
        }
        if descriptor.config_validator.is_some() {
            self.validator = descriptor.config_validator;
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.resolved.id
    }

    /// Returns the key, including any `describe` override.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn kind(&self) -> PluginKind {
        self.resolved.kind
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn resolved(&self) -> &ResolvedPlugin {
        &self.resolved
    }
}

impl std::fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("id", &self.resolved.id)
            .field("key", &self.key)
            .field("kind", &self.resolved.kind)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub(crate) struct RuntimeState {
    pub(crate) plugins: Vec<PluginEntry>,
    pub(crate) index: HashMap<String, usize>,
    /// Hooks registered so far, in registration order.
    pub(crate) pending: Vec<Hook>,
    /// Ordered hooks per key, filled once loading completes.
    pub(crate) hooks: HashMap<String, Vec<Hook>>,
    pub(crate) methods: Methods,
}

/// Plugin runtime.
///
/// ```ignore
/// let mut pluggable = Pluggable::new(cwd, registry);
/// pluggable.init(presets, plugins)?;
/// let files = pluggable
///     .apply_plugins(ApplyPluginsOptions::new("addFiles", ApplyPluginsType::Add))
///     .await?;
/// ```
pub struct Pluggable {
    cwd: PathBuf,
    registry: PluginRegistry,
    lifecycle: Lifecycle,
    props: Map<String, Value>,
    user_config: Value,
    config_keys: HashSet<String>,
    state: RuntimeState,
}

impl Pluggable {
    /// Creates a runtime resolving ids against `cwd` and `registry`.
    pub fn new(cwd: impl Into<PathBuf>, registry: PluginRegistry) -> Self {
        Self {
            cwd: cwd.into(),
            registry,
            lifecycle: Lifecycle::new(),
            props: Map::new(),
            user_config: Value::Object(Map::new()),
            config_keys: RESERVED_CONFIG_KEYS.iter().map(ToString::to_string).collect(),
            state: RuntimeState::default(),
        }
    }

    /// Sets the user configuration. Top-level keys map to plugin keys.
    #[must_use]
    pub fn with_user_config(mut self, config: Value) -> Self {
        self.user_config = config;
        self
    }

    /// Declares top-level config keys owned by the caller rather than a
    /// plugin, so validation accepts them.
    #[must_use]
    pub fn with_config_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Injects a property readable through [`PluginApi::prop`].
    pub fn set_prop(&mut self, name: impl Into<String>, value: Value) {
        self.props.insert(name.into(), value);
    }

    #[must_use]
    pub fn props(&self) -> &Map<String, Value> {
        &self.props
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    #[must_use]
    pub fn user_config(&self) -> &Value {
        &self.user_config
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.lifecycle.stage()
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Moves the lifecycle forward. Used by services for the stages after
    /// [`Stage::Loaded`].
    ///
    /// # Errors
    ///
    /// Returns [`PluggableError::IllegalTransition`] unless `to` is the next
    /// stage.
    pub fn transition(&mut self, to: Stage) -> PluggableResult<()> {
        self.lifecycle.transition(to)
    }

    /// Returns every applied plugin, in application order.
    #[must_use]
    pub fn plugins(&self) -> &[PluginEntry] {
        &self.state.plugins
    }

    /// Returns the plugin whose key is `key`.
    #[must_use]
    pub fn plugin(&self, key: &str) -> Option<&PluginEntry> {
        self.state.plugins.iter().find(|entry| entry.key == key)
    }

    /// Returns the ordered hooks registered under `key`.
    #[must_use]
    pub fn hooks(&self, key: &str) -> &[Hook] {
        self.state.hooks.get(key).map_or(&[], Vec::as_slice)
    }

    /// Returns a handle to the method table.
    #[must_use]
    pub fn methods(&self) -> Methods {
        self.state.methods.clone()
    }

    /// Disables the plugin with key `key`. Returns false if there is none.
    pub fn disable(&mut self, key: &str) -> bool {
        match self.state.plugins.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                debug!(plugin = %entry.id(), "plugin disabled");
                entry.enabled = false;
                true
            }
            None => false,
        }
    }

    /// Resolves and applies every preset and plugin, then orders the hooks.
    ///
    /// Presets come first, depth first. Plugins contributed by presets are
    /// applied before `plugins`.
    ///
    /// # Errors
    ///
    /// Returns the first resolution, registration or ordering error.
    pub fn init(
        &mut self,
        presets: Vec<PluginDeclaration>,
        plugins: Vec<PluginDeclaration>,
    ) -> PluggableResult<()> {
        self.lifecycle.transition(Stage::Init)?;

        self.lifecycle.transition(Stage::InitPresets)?;
        let mut preset_plugins = Vec::new();
        for preset in &presets {
            self.init_preset(preset, &mut preset_plugins)?;
        }

        self.lifecycle.transition(Stage::InitPlugins)?;
        for plugin in preset_plugins.iter().chain(&plugins) {
            self.init_plugin(plugin)?;
        }

        self.order_hooks()?;
        self.lifecycle.transition(Stage::Loaded)?;

        info!(
            plugins = self.state.plugins.len(),
            hooks = self.state.hooks.values().map(Vec::len).sum::<usize>(),
            "plugins loaded"
        );
        Ok(())
    }

    fn init_preset(
        &mut self,
        declaration: &PluginDeclaration,
        plugins: &mut Vec<PluginDeclaration>,
    ) -> PluggableResult<()> {
        let resolved = self
            .registry
            .resolve(declaration, PluginKind::Preset, &self.cwd)?;
        let Some(index) = self.admit(declaration, resolved)? else {
            return Ok(());
        };

        let returned = self.apply(index)?;
        plugins.extend(returned.plugins);
        for preset in &returned.presets {
            self.init_preset(preset, plugins)?;
        }
        Ok(())
    }

    fn init_plugin(&mut self, declaration: &PluginDeclaration) -> PluggableResult<()> {
        let resolved = self
            .registry
            .resolve(declaration, PluginKind::Plugin, &self.cwd)?;
        let Some(index) = self.admit(declaration, resolved)? else {
            return Ok(());
        };

        let returned = self.apply(index)?;
        if !returned.is_empty() {
            let action = if returned.presets.is_empty() {
                "register_plugins"
            } else {
                "register_presets"
            };
            return Err(PluggableError::InvalidPhase {
                plugin: self.state.plugins[index].id().to_string(),
                action,
                stage: self.stage(),
            });
        }
        Ok(())
    }

    /// Records a resolved plugin, or returns `None` for a repeated
    /// declaration that can be skipped.
    fn admit(
        &mut self,
        declaration: &PluginDeclaration,
        resolved: ResolvedPlugin,
    ) -> PluggableResult<Option<usize>> {
        if let Some(&existing) = self.state.index.get(&resolved.id) {
            let entry = &self.state.plugins[existing];
            let same_plugin = !matches!(declaration, PluginDeclaration::Inline(_))
                || Arc::ptr_eq(&entry.resolved.plugin, &resolved.plugin);
            if same_plugin && entry.resolved.options == resolved.options {
                debug!(id = %resolved.id, "skipping repeated declaration");
                return Ok(None);
            }
            return Err(PluggableError::DuplicatePlugin { id: resolved.id });
        }

        let index = self.state.plugins.len();
        self.state.index.insert(resolved.id.clone(), index);
        self.state.plugins.push(PluginEntry::new(resolved));
        Ok(Some(index))
    }

    /// Runs one plugin's `apply` and returns everything it declared, queued
    /// declarations first.
    fn apply(&mut self, index: usize) -> PluggableResult<PluginReturn> {
        let resolved = self.state.plugins[index].resolved.clone();
        debug!(id = %resolved.id, kind = %resolved.kind, "applying");

        let mut api = PluginApi::new(
            index,
            self.lifecycle.stage(),
            &self.cwd,
            &self.props,
            &self.user_config,
            &mut self.state,
        );
        let returned = resolved
            .plugin
            .apply(&mut api, &resolved.options)
            .map_err(|source| match source.downcast::<PluggableError>() {
                Ok(err) => *err,
                Err(source) => PluggableError::Apply {
                    id: resolved.id.clone(),
                    source,
                },
            })?;
        let (mut presets, mut plugins) = api.into_queued();

        if let Some(returned) = returned {
            presets.extend(returned.presets);
            plugins.extend(returned.plugins);
        }
        Ok(PluginReturn { presets, plugins })
    }

    fn order_hooks(&mut self) -> PluggableResult<()> {
        let keys: HashMap<&str, &str> = self
            .state
            .plugins
            .iter()
            .map(|entry| (entry.id(), entry.key()))
            .collect();

        let mut by_key: HashMap<String, Vec<Hook>> = HashMap::new();
        for mut hook in std::mem::take(&mut self.state.pending) {
            if let Some(key) = keys.get(hook.plugin.as_str()) {
                hook.plugin_key = (*key).to_string();
            }
            by_key.entry(hook.key.clone()).or_default().push(hook);
        }

        for (key, hooks) in by_key {
            let ordered = order_hooks(hooks)?;
            self.state.hooks.insert(key, ordered);
        }
        Ok(())
    }

    /// Checks the user configuration against the loaded plugins.
    ///
    /// Keys set to `false` disable the matching plugin. Every unknown key
    /// and every validator message is reported together.
    ///
    /// # Errors
    ///
    /// Returns [`PluggableError::ConfigValidation`] listing every problem.
    pub fn validate_config(&mut self) -> PluggableResult<()> {
        let config = match &self.user_config {
            Value::Object(config) => config.clone(),
            Value::Null => return Ok(()),
            _ => {
                return Err(PluggableError::ConfigValidation(vec![
                    "configuration must be a table".to_string(),
                ]));
            }
        };

        let mut errors = Vec::new();
        for (key, value) in &config {
            if self.config_keys.contains(key) {
                continue;
            }
            let Some(entry) = self.state.plugins.iter_mut().find(|e| e.key == *key) else {
                errors.push(format!("unknown config key: {key}"));
                continue;
            };

            if *value == Value::Bool(false) {
                debug!(plugin = %entry.id(), "plugin disabled by config");
                entry.enabled = false;
                continue;
            }
            if let Some(validator) = &entry.validator
                && let Err(messages) = validator(value)
            {
                errors.extend(messages.into_iter().map(|m| format!("{key}: {m}")));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PluggableError::ConfigValidation(errors))
        }
    }

    fn is_enabled(&self, plugin_id: &str) -> bool {
        self.state
            .index
            .get(plugin_id)
            .is_none_or(|&index| self.state.plugins[index].enabled)
    }

    /// Runs the hooks registered under `options.key` with the chosen
    /// algorithm. Hooks run one at a time, in order.
    ///
    /// # Errors
    ///
    /// Returns [`PluggableError::HookFailed`] for the first failing hook; the
    /// remaining hooks do not run. An `Add` with a non-array initial value
    /// fails with [`PluggableError::InvalidValue`].
    pub async fn apply_plugins(&self, options: ApplyPluginsOptions) -> PluggableResult<Value> {
        let ApplyPluginsOptions {
            key,
            kind,
            initial_value,
            args,
        } = options;

        let hooks: Vec<Hook> = self
            .hooks(&key)
            .iter()
            .filter(|hook| self.is_enabled(&hook.plugin))
            .cloned()
            .collect();
        debug!(%key, ?kind, hooks = hooks.len(), "applying plugins");

        match kind {
            ApplyPluginsType::Add => {
                let mut items = match initial_value {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items,
                    Some(_) => {
                        return Err(PluggableError::InvalidValue {
                            key,
                            reason: "add expects an array as initial value".to_string(),
                        });
                    }
                };
                for hook in &hooks {
                    match run_hook(hook, Value::Null, args.clone()).await? {
                        Value::Array(more) => items.extend(more),
                        Value::Null => {}
                        item => items.push(item),
                    }
                }
                Ok(Value::Array(items))
            }
            ApplyPluginsType::Modify => {
                let mut memo = initial_value.unwrap_or(Value::Null);
                for hook in &hooks {
                    let had_value = !memo.is_null();
                    memo = run_hook(hook, memo, args.clone()).await?;
                    if had_value && memo.is_null() {
                        warn!(key = %hook.key, plugin = %hook.plugin, "modify hook returned null");
                    }
                }
                Ok(memo)
            }
            ApplyPluginsType::Get => {
                for hook in &hooks {
                    let value = run_hook(hook, Value::Null, args.clone()).await?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Ok(Value::Null)
            }
            ApplyPluginsType::Event => {
                for hook in &hooks {
                    run_hook(hook, Value::Null, args.clone()).await?;
                }
                Ok(Value::Null)
            }
        }
    }

    /// Like [`Pluggable::apply_plugins`], decoding the result as `T`.
    ///
    /// # Errors
    ///
    /// Same as [`Pluggable::apply_plugins`], plus
    /// [`PluggableError::InvalidValue`] when the result does not decode.
    pub async fn apply_plugins_as<T: DeserializeOwned>(
        &self,
        options: ApplyPluginsOptions,
    ) -> PluggableResult<T> {
        let key = options.key.clone();
        let value = self.apply_plugins(options).await?;
        serde_json::from_value(value)
            .map_err(|e| PluggableError::InvalidValue { key, reason: e.to_string() })
    }

    /// Calls a registered method.
    ///
    /// # Errors
    ///
    /// See [`Methods::call`].
    pub async fn call_method(&self, name: &str, args: Value) -> PluggableResult<Value> {
        self.state.methods.call(name, args).await
    }
}

impl std::fmt::Debug for Pluggable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pluggable")
            .field("cwd", &self.cwd)
            .field("stage", &self.lifecycle.stage())
            .field("plugins", &self.state.plugins)
            .finish_non_exhaustive()
    }
}

async fn run_hook(hook: &Hook, memo: Value, args: Value) -> PluggableResult<Value> {
    (hook.handler)(HookInput { memo, args })
        .await
        .map_err(|source| PluggableError::HookFailed {
            key: hook.key.clone(),
            plugin: hook.plugin.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::{BoxError, FnPlugin, HookBuilder};

    type Log = Arc<Mutex<Vec<String>>>;

    fn pluggable(registry: PluginRegistry) -> Pluggable {
        Pluggable::new("/work", registry)
    }

    /// A plugin registering one hook under `key` that returns `value`.
    fn hook_plugin(name: &str, key: &'static str, value: Value) -> PluginDeclaration {
        PluginDeclaration::inline(FnPlugin::new(name, move |api: &mut PluginApi<'_>, _: &Value| {
            let value = value.clone();
            api.on(key, move |_input| futures::future::ready(Ok(value.clone())))?;
            Ok(None)
        }))
    }

    /// A plugin logging `name` when its `onEvent` hook runs, after `delay`.
    fn logging_plugin(name: &'static str, log: &Log, delay_ms: u64) -> PluginDeclaration {
        let log = log.clone();
        PluginDeclaration::inline(FnPlugin::new(name, move |api: &mut PluginApi<'_>, _: &Value| {
            let log = log.clone();
            api.on("onEvent", move |_input| {
                let log = log.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    log.lock().push(name.to_string());
                    Ok(Value::Null)
                }
            })?;
            Ok(None)
        }))
    }

    #[tokio::test]
    async fn test_event_runs_in_order_regardless_of_latency() {
        let log: Log = Arc::default();
        let mut runtime = pluggable(PluginRegistry::new());
        runtime
            .init(
                vec![],
                vec![
                    logging_plugin("slow", &log, 30),
                    logging_plugin("fast", &log, 0),
                    logging_plugin("medium", &log, 10),
                ],
            )
            .unwrap();

        let result = runtime
            .apply_plugins(ApplyPluginsOptions::new("onEvent", ApplyPluginsType::Event))
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
        assert_eq!(*log.lock(), vec!["slow", "fast", "medium"]);
    }

    #[tokio::test]
    async fn test_get_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = |name: &str, value: Value| {
            let calls = calls.clone();
            PluginDeclaration::inline(FnPlugin::new(name, move |api: &mut PluginApi<'_>, _: &Value| {
                let calls = calls.clone();
                let value = value.clone();
                api.on("getThing", move |_input| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    futures::future::ready(Ok(value.clone()))
                })?;
                Ok(None)
            }))
        };

        let mut runtime = pluggable(PluginRegistry::new());
        runtime
            .init(
                vec![],
                vec![
                    counted("a", Value::Null),
                    counted("b", json!("found")),
                    counted("c", json!("too late")),
                ],
            )
            .unwrap();

        let result = runtime
            .apply_plugins(ApplyPluginsOptions::new("getThing", ApplyPluginsType::Get))
            .await
            .unwrap();
        assert_eq!(result, json!("found"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_without_hooks_is_null() {
        let mut runtime = pluggable(PluginRegistry::new());
        runtime.init(vec![], vec![]).unwrap();
        let result = runtime
            .apply_plugins(ApplyPluginsOptions::new("nothing", ApplyPluginsType::Get))
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_add_concatenates_in_order() {
        let mut runtime = pluggable(PluginRegistry::new());
        runtime
            .init(
                vec![],
                vec![
                    hook_plugin("a", "addItems", json!(["x"])),
                    hook_plugin("b", "addItems", json!(["y", "z"])),
                    hook_plugin("c", "addItems", Value::Null),
                    hook_plugin("d", "addItems", json!("w")),
                ],
            )
            .unwrap();

        let result = runtime
            .apply_plugins(ApplyPluginsOptions::new("addItems", ApplyPluginsType::Add))
            .await
            .unwrap();
        assert_eq!(result, json!(["x", "y", "z", "w"]));
    }

    #[tokio::test]
    async fn test_add_rejects_non_array_initial_value() {
        let mut runtime = pluggable(PluginRegistry::new());
        runtime.init(vec![], vec![]).unwrap();
        let err = runtime
            .apply_plugins(
                ApplyPluginsOptions::new("addItems", ApplyPluginsType::Add)
                    .initial_value(json!({})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PluggableError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_modify_threads_memo() {
        let merge = |name: &str, field: &'static str, n: i64| {
            PluginDeclaration::inline(FnPlugin::new(name, move |api: &mut PluginApi<'_>, _: &Value| {
                api.on("modifyThing", move |input: HookInput| async move {
                    let mut memo = input.memo;
                    memo[field] = json!(n);
                    Ok(memo)
                })?;
                Ok(None)
            }))
        };

        let mut runtime = pluggable(PluginRegistry::new());
        runtime
            .init(vec![], vec![merge("a", "a", 1), merge("b", "b", 2)])
            .unwrap();

        let result = runtime
            .apply_plugins(
                ApplyPluginsOptions::new("modifyThing", ApplyPluginsType::Modify)
                    .initial_value(json!({})),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({ "a": 1, "b": 2 }));
    }

    #[tokio::test]
    async fn test_modify_null_return_propagates() {
        let mut runtime = pluggable(PluginRegistry::new());
        runtime
            .init(vec![], vec![hook_plugin("a", "modifyThing", Value::Null)])
            .unwrap();
        let result = runtime
            .apply_plugins(
                ApplyPluginsOptions::new("modifyThing", ApplyPluginsType::Modify)
                    .initial_value(json!({ "kept": false })),
            )
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_hook_args_are_passed() {
        let mut runtime = pluggable(PluginRegistry::new());
        runtime
            .init(
                vec![],
                vec![PluginDeclaration::inline(FnPlugin::new(
                    "echo",
                    |api: &mut PluginApi<'_>, _: &Value| {
                        api.on("getEcho", |input: HookInput| async move { Ok(input.args) })?;
                        Ok(None)
                    },
                ))],
            )
            .unwrap();
        let result = runtime
            .apply_plugins(
                ApplyPluginsOptions::new("getEcho", ApplyPluginsType::Get).args(json!({ "n": 7 })),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({ "n": 7 }));
    }

    #[tokio::test]
    async fn test_failing_hook_aborts_remaining() {
        let log: Log = Arc::default();
        let failing = PluginDeclaration::inline(FnPlugin::new(
            "broken",
            |api: &mut PluginApi<'_>, _: &Value| {
                api.on("onEvent", |_input| async {
                    Err::<Value, BoxError>("boom".into())
                })?;
                Ok(None)
            },
        ));

        let mut runtime = pluggable(PluginRegistry::new());
        runtime
            .init(
                vec![],
                vec![logging_plugin("first", &log, 0), failing, logging_plugin("last", &log, 0)],
            )
            .unwrap();

        let err = runtime
            .apply_plugins(ApplyPluginsOptions::new("onEvent", ApplyPluginsType::Event))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "hook onEvent of plugin broken failed: boom");
        assert_eq!(*log.lock(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_disabled_plugin_hooks_are_skipped() {
        let log: Log = Arc::default();
        let mut runtime = pluggable(PluginRegistry::new());
        runtime
            .init(
                vec![],
                vec![logging_plugin("a", &log, 0), logging_plugin("b", &log, 0)],
            )
            .unwrap();
        assert!(runtime.disable("a"));
        assert!(!runtime.disable("missing"));

        runtime
            .apply_plugins(ApplyPluginsOptions::new("onEvent", ApplyPluginsType::Event))
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["b"]);
        assert_eq!(runtime.hooks("onEvent").len(), 2);
    }

    #[tokio::test]
    async fn test_describe_can_disable_itself() {
        let log: Log = Arc::default();
        let inner = log.clone();
        let shy = PluginDeclaration::inline(FnPlugin::new(
            "shy",
            move |api: &mut PluginApi<'_>, _: &Value| {
                api.describe(PluginDescriptor::new().enable(false));
                let log = inner.clone();
                api.on("onEvent", move |_input| {
                    log.lock().push("shy".to_string());
                    futures::future::ready(Ok(Value::Null))
                })?;
                Ok(None)
            },
        ));

        let mut runtime = pluggable(PluginRegistry::new());
        runtime.init(vec![], vec![shy]).unwrap();
        runtime
            .apply_plugins(ApplyPluginsOptions::new("onEvent", ApplyPluginsType::Event))
            .await
            .unwrap();
        assert!(log.lock().is_empty());
        assert!(!runtime.plugins()[0].is_enabled());
    }

    /// Builds a registry where:
    /// - `top` registers preset `nested` and plugin `from-top`
    /// - `nested` registers plugin `from-nested`
    /// and every plugin logs its own name when applied.
    fn preset_registry(applied: &Log) -> PluginRegistry {
        let logged = |name: &'static str| {
            let applied = applied.clone();
            FnPlugin::new(name, move |_api: &mut PluginApi<'_>, _: &Value| {
                applied.lock().push(name.to_string());
                Ok(None)
            })
        };

        let top_log = applied.clone();
        let nested_log = applied.clone();
        PluginRegistry::new()
            .with(
                "top",
                FnPlugin::new("top", move |api: &mut PluginApi<'_>, _: &Value| {
                    top_log.lock().push("top".to_string());
                    api.register_presets(["nested"])?;
                    Ok(Some(PluginReturn::new().plugin("from-top")))
                }),
            )
            .with(
                "nested",
                FnPlugin::new("nested", move |api: &mut PluginApi<'_>, _: &Value| {
                    nested_log.lock().push("nested".to_string());
                    api.register_plugins(["from-nested"])?;
                    Ok(None)
                }),
            )
            .with("sibling", logged("sibling"))
            .with("from-top", logged("from-top"))
            .with("from-nested", logged("from-nested"))
            .with("user", logged("user"))
    }

    #[test]
    fn test_presets_flatten_depth_first_before_plugins() {
        let applied: Log = Arc::default();
        let mut runtime = pluggable(preset_registry(&applied));
        runtime
            .init(
                vec!["top".into(), "sibling".into()],
                vec!["user".into()],
            )
            .unwrap();

        assert_eq!(
            *applied.lock(),
            vec!["top", "nested", "sibling", "from-top", "from-nested", "user"]
        );
        assert_eq!(runtime.stage(), Stage::Loaded);

        let kinds: Vec<PluginKind> = runtime.plugins().iter().map(PluginEntry::kind).collect();
        assert_eq!(
            kinds,
            vec![
                PluginKind::Preset,
                PluginKind::Preset,
                PluginKind::Preset,
                PluginKind::Plugin,
                PluginKind::Plugin,
                PluginKind::Plugin,
            ]
        );
    }

    #[tokio::test]
    async fn test_nested_preset_plugin_hooks_run_before_top_level_plugins() {
        let log: Log = Arc::default();
        let registry = PluginRegistry::new()
            .with(
                "outer",
                FnPlugin::new("outer", |api: &mut PluginApi<'_>, _: &Value| {
                    api.register_presets(["inner"])?;
                    Ok(None)
                }),
            )
            .with(
                "inner",
                FnPlugin::new("inner", |api: &mut PluginApi<'_>, _: &Value| {
                    api.register_plugins(["deep"])?;
                    Ok(None)
                }),
            )
            .with("deep", {
                let log = log.clone();
                FnPlugin::new("deep", move |api: &mut PluginApi<'_>, _: &Value| {
                    let log = log.clone();
                    api.on("onEvent", move |_input| {
                        log.lock().push("deep".to_string());
                        futures::future::ready(Ok(Value::Null))
                    })?;
                    Ok(None)
                })
            });

        let mut runtime = pluggable(registry);
        runtime
            .init(vec!["outer".into()], vec![logging_plugin("top", &log, 0)])
            .unwrap();
        runtime
            .apply_plugins(ApplyPluginsOptions::new("onEvent", ApplyPluginsType::Event))
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["deep", "top"]);
    }

    #[test]
    fn test_plugins_cannot_register_presets() {
        let registry = PluginRegistry::new().with(
            "greedy",
            FnPlugin::new("greedy", |api: &mut PluginApi<'_>, _: &Value| {
                api.register_presets(["other"])?;
                Ok(None)
            }),
        );
        let mut runtime = pluggable(registry);
        let err = runtime.init(vec![], vec!["greedy".into()]).unwrap_err();
        assert!(matches!(
            err,
            PluggableError::InvalidPhase {
                action: "register_presets",
                stage: Stage::InitPlugins,
                ..
            }
        ));
    }

    #[test]
    fn test_plugins_cannot_return_plugins() {
        let registry = PluginRegistry::new().with(
            "greedy",
            FnPlugin::new("greedy", |_api: &mut PluginApi<'_>, _: &Value| {
                Ok(Some(PluginReturn::new().plugin("other")))
            }),
        );
        let mut runtime = pluggable(registry);
        let err = runtime.init(vec![], vec!["greedy".into()]).unwrap_err();
        assert!(matches!(
            err,
            PluggableError::InvalidPhase { action: "register_plugins", .. }
        ));
    }

    #[test]
    fn test_unknown_plugin_fails_before_hooks() {
        let mut runtime = pluggable(PluginRegistry::new());
        let err = runtime
            .init(vec![], vec!["rigger-plugin-nope".into()])
            .unwrap_err();
        assert_eq!(err.to_string(), "plugin not found: rigger-plugin-nope");
        assert_eq!(runtime.stage(), Stage::InitPlugins);
    }

    #[test]
    fn test_invalid_hook_is_fatal() {
        let registry = PluginRegistry::new().with(
            "sloppy",
            FnPlugin::new("sloppy", |api: &mut PluginApi<'_>, _: &Value| {
                api.register(HookBuilder::new().key("onStart"))?;
                Ok(None)
            }),
        );
        let mut runtime = pluggable(registry);
        let err = runtime.init(vec![], vec!["sloppy".into()]).unwrap_err();
        assert!(matches!(err, PluggableError::InvalidHook { ref missing, .. } if missing == &["handler"]));
    }

    #[test]
    fn test_apply_error_is_wrapped() {
        let registry = PluginRegistry::new().with(
            "broken",
            FnPlugin::new("broken", |_api: &mut PluginApi<'_>, _: &Value| {
                Err("missing binary".into())
            }),
        );
        let mut runtime = pluggable(registry);
        let err = runtime.init(vec![], vec!["broken".into()]).unwrap_err();
        assert_eq!(err.to_string(), "plugin broken failed to apply: missing binary");
    }

    #[test]
    fn test_duplicate_with_same_options_is_skipped() {
        let applied: Log = Arc::default();
        let mut runtime = pluggable(preset_registry(&applied));
        runtime
            .init(vec![], vec!["user".into(), "user".into()])
            .unwrap();
        assert_eq!(*applied.lock(), vec!["user"]);
        assert_eq!(runtime.plugins().len(), 1);
    }

    #[test]
    fn test_duplicate_with_other_options_fails() {
        let applied: Log = Arc::default();
        let mut runtime = pluggable(preset_registry(&applied));
        let err = runtime
            .init(
                vec![],
                vec![
                    "user".into(),
                    PluginDeclaration::with_options("user", json!({ "x": 1 })),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, PluggableError::DuplicatePlugin { ref id } if id == "user"));
    }

    #[test]
    fn test_duplicate_method_is_fatal() {
        let with_method = |name: &str| {
            PluginDeclaration::inline(FnPlugin::new(name, |api: &mut PluginApi<'_>, _: &Value| {
                api.register_method("render", |args: Value| async move { Ok(args) })?;
                Ok(None)
            }))
        };
        let mut runtime = pluggable(PluginRegistry::new());
        let err = runtime
            .init(vec![], vec![with_method("a"), with_method("b")])
            .unwrap_err();
        assert!(matches!(err, PluggableError::DuplicateMethod { ref plugin, .. } if plugin == "a"));
    }

    #[tokio::test]
    async fn test_methods_are_callable_from_the_runtime() {
        let mut runtime = pluggable(PluginRegistry::new());
        runtime
            .init(
                vec![],
                vec![PluginDeclaration::inline(FnPlugin::new(
                    "math",
                    |api: &mut PluginApi<'_>, _: &Value| {
                        api.register_method("double", |args: Value| async move {
                            Ok(json!(args.as_i64().unwrap_or_default() * 2))
                        })?;
                        Ok(None)
                    },
                ))],
            )
            .unwrap();
        assert_eq!(runtime.call_method("double", json!(21)).await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_before_uses_described_key() {
        let log: Log = Arc::default();
        let renamed = {
            let log = log.clone();
            PluginDeclaration::inline(FnPlugin::new(
                "rigger-plugin-first",
                move |api: &mut PluginApi<'_>, _: &Value| {
                    let log = log.clone();
                    api.register(
                        HookBuilder::new()
                            .key("onEvent")
                            .handler(move |_input| {
                                log.lock().push("early".to_string());
                                futures::future::ready(Ok(Value::Null))
                            })
                            .before("target"),
                    )?;
                    Ok(None)
                },
            ))
        };
        let target = {
            let log = log.clone();
            PluginDeclaration::inline(FnPlugin::new(
                "rigger-plugin-target-ish",
                move |api: &mut PluginApi<'_>, _: &Value| {
                    let log = log.clone();
                    api.on("onEvent", move |_input| {
                        log.lock().push("target".to_string());
                        futures::future::ready(Ok(Value::Null))
                    })?;
                    api.describe(PluginDescriptor::new().key("target"));
                    Ok(None)
                },
            ))
        };

        let mut runtime = pluggable(PluginRegistry::new());
        runtime
            .init(vec![], vec![logging_plugin("zero", &log, 0), target, renamed])
            .unwrap();
        runtime
            .apply_plugins(ApplyPluginsOptions::new("onEvent", ApplyPluginsType::Event))
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["zero", "early", "target"]);
    }

    #[test]
    fn test_validate_config_aggregates_errors() {
        let strict = PluginDeclaration::inline(FnPlugin::new(
            "rigger-plugin-strict",
            |api: &mut PluginApi<'_>, _: &Value| {
                api.describe(PluginDescriptor::new().config_validator(|value| {
                    let mut errors = Vec::new();
                    if value.get("level").is_none() {
                        errors.push("missing level".to_string());
                    }
                    if !value.is_object() {
                        errors.push("expected a table".to_string());
                    }
                    if errors.is_empty() { Ok(()) } else { Err(errors) }
                }));
                Ok(None)
            },
        ));

        let mut runtime = pluggable(PluginRegistry::new()).with_user_config(json!({
            "strict": 3,
            "mystery": true,
            "plugins": [],
        }));
        runtime.init(vec![], vec![strict]).unwrap();

        let err = runtime.validate_config().unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r"
        invalid configuration:
          - unknown config key: mystery
          - strict: missing level
          - strict: expected a table
        ");
    }

    #[test]
    fn test_validate_config_disables_false_keys() {
        let applied: Log = Arc::default();
        let mut runtime = pluggable(preset_registry(&applied))
            .with_user_config(json!({ "user": false, "release": { "latest": true } }))
            .with_config_keys(["release"]);
        runtime.init(vec![], vec!["user".into()]).unwrap();
        runtime.validate_config().unwrap();
        assert!(!runtime.plugin("user").unwrap().is_enabled());
    }

    #[test]
    fn test_user_config_and_props_reach_plugins() {
        let seen: Arc<Mutex<Option<(Value, Option<String>)>>> = Arc::default();
        let sink = seen.clone();
        let reader = PluginDeclaration::inline(FnPlugin::new(
            "rigger-plugin-reader",
            move |api: &mut PluginApi<'_>, _: &Value| {
                let config = api.user_config().cloned().unwrap_or_default();
                let name = api.prop_as::<String>("projectName")?;
                *sink.lock() = Some((config, name));
                Ok(None)
            },
        ));

        let mut runtime =
            pluggable(PluginRegistry::new()).with_user_config(json!({ "reader": { "on": true } }));
        runtime.set_prop("projectName", json!("demo"));
        runtime.init(vec![], vec![reader]).unwrap();

        let (config, name) = seen.lock().clone().unwrap();
        assert_eq!(config, json!({ "on": true }));
        assert_eq!(name.as_deref(), Some("demo"));
    }

    #[test]
    fn test_init_twice_is_illegal() {
        let mut runtime = pluggable(PluginRegistry::new());
        runtime.init(vec![], vec![]).unwrap();
        let err = runtime.init(vec![], vec![]).unwrap_err();
        assert!(matches!(err, PluggableError::IllegalTransition { .. }));
    }

    #[test]
    fn test_lifecycle_history_records_loading() {
        let mut runtime = pluggable(PluginRegistry::new());
        runtime.init(vec![], vec![]).unwrap();
        let stages: Vec<Stage> = runtime.lifecycle().history().iter().map(|t| t.to).collect();
        assert_eq!(
            stages,
            vec![Stage::Init, Stage::InitPresets, Stage::InitPlugins, Stage::Loaded]
        );
    }

    #[test]
    fn test_options_reach_apply() {
        let seen: Arc<Mutex<Value>> = Arc::default();
        let sink = seen.clone();
        let registry = PluginRegistry::new().with(
            "opts",
            FnPlugin::new("opts", move |_api: &mut PluginApi<'_>, options: &Value| {
                *sink.lock() = options.clone();
                Ok(None)
            }),
        );
        let mut runtime = pluggable(registry);
        runtime
            .init(
                vec![],
                vec![PluginDeclaration::with_options("opts", json!({ "level": 2 }))],
            )
            .unwrap();
        assert_eq!(*seen.lock(), json!({ "level": 2 }));
    }
}
