//! Hook records, the hook builder and per-key ordering.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::{BoxError, PluggableError, PluggableResult};

/// Future returned by a hook handler.
pub type HookFuture = BoxFuture<'static, Result<Value, BoxError>>;

/// A hook body.
pub type HookFn = Arc<dyn Fn(HookInput) -> HookFuture + Send + Sync>;

/// What a hook receives when it runs.
///
/// `memo` is the running value for `Modify` hooks and `null` otherwise.
#[derive(Debug, Clone, Default)]
pub struct HookInput {
    pub memo: Value,
    pub args: Value,
}

/// Builds a hook registration. `key` and `handler` are required.
#[derive(Default)]
pub struct HookBuilder {
    key: Option<String>,
    handler: Option<HookFn>,
    before: Option<String>,
    stage: i32,
}

impl HookBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hook key.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the hook body.
    #[must_use]
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(HookInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |input| handler(input).boxed()));
        self
    }

    /// Sets an already boxed hook body.
    #[must_use]
    pub fn boxed_handler(mut self, handler: HookFn) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Runs this hook before the hooks of the plugin with key `plugin_key`.
    #[must_use]
    pub fn before(mut self, plugin_key: impl Into<String>) -> Self {
        self.before = Some(plugin_key.into());
        self
    }

    /// Sets the stage. Lower stages run first; the default is 0.
    #[must_use]
    pub fn stage(mut self, stage: i32) -> Self {
        self.stage = stage;
        self
    }

    pub(crate) fn build(self, plugin: &str, plugin_key: &str, seq: usize) -> PluggableResult<Hook> {
        let key = self.key.filter(|k| !k.is_empty());

        let mut missing = Vec::new();
        if key.is_none() {
            missing.push("key");
        }
        if self.handler.is_none() {
            missing.push("handler");
        }

        match (key, self.handler) {
            (Some(key), Some(handler)) => Ok(Hook {
                plugin: plugin.to_string(),
                plugin_key: plugin_key.to_string(),
                key,
                handler,
                before: self.before,
                stage: self.stage,
                seq,
            }),
            _ => Err(PluggableError::InvalidHook {
                plugin: plugin.to_string(),
                missing,
            }),
        }
    }
}

/// A registered hook.
#[derive(Clone)]
pub struct Hook {
    /// Id of the plugin that registered it.
    pub plugin: String,
    /// Key of the plugin that registered it, at registration time.
    pub plugin_key: String,
    pub key: String,
    pub handler: HookFn,
    pub before: Option<String>,
    pub stage: i32,
    /// Global registration order.
    pub seq: usize,
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("plugin", &self.plugin)
            .field("plugin_key", &self.plugin_key)
            .field("key", &self.key)
            .field("before", &self.before)
            .field("stage", &self.stage)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// Orders the hooks of one key: by stage, then registration order, then
/// moves every `before` hook ahead of the first hook of its target plugin.
pub(crate) fn order_hooks(hooks: Vec<Hook>) -> PluggableResult<Vec<Hook>> {
    let mut ordered = hooks;
    ordered.sort_by_key(|hook| (hook.stage, hook.seq));

    let constrained: Vec<(usize, String)> = ordered
        .iter()
        .filter_map(|hook| hook.before.clone().map(|before| (hook.seq, before)))
        .collect();

    for (seq, before) in &constrained {
        let Some(pos) = ordered.iter().position(|hook| hook.seq == *seq) else {
            continue;
        };
        let hook = ordered.remove(pos);
        let Some(target) = ordered.iter().position(|h| h.plugin_key == *before) else {
            return Err(order_error(&hook, before));
        };
        ordered.insert(target, hook);
    }

    // A later move can undo an earlier one when constraints form a cycle.
    for (seq, before) in &constrained {
        let pos = ordered.iter().position(|hook| hook.seq == *seq);
        let target = ordered.iter().position(|hook| hook.plugin_key == *before);
        if let (Some(pos), Some(target)) = (pos, target)
            && pos >= target
        {
            return Err(order_error(&ordered[pos], before));
        }
    }

    Ok(ordered)
}

fn order_error(hook: &Hook, before: &str) -> PluggableError {
    PluggableError::HookOrder {
        key: hook.key.clone(),
        plugin: hook.plugin.clone(),
        before: before.to_string(),
    }
}
