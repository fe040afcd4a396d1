//! Named utility methods shared between plugins and services.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::{BoxError, HookFuture, PluggableError, PluggableResult};

/// A registered method body.
pub type MethodFn = Arc<dyn Fn(Value) -> HookFuture + Send + Sync>;

#[derive(Clone)]
struct MethodEntry {
    plugin: String,
    handler: MethodFn,
}

/// Shared method table.
///
/// Cloning is cheap; every clone sees the same table, so hooks may keep a
/// handle and call methods registered by plugins applied after them.
#[derive(Clone, Default)]
pub struct Methods {
    inner: Arc<RwLock<HashMap<String, MethodEntry>>>,
}

impl Methods {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert<F, Fut>(&self, name: &str, plugin: &str, handler: F) -> PluggableResult<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        let mut table = self.inner.write();
        if let Some(existing) = table.get(name) {
            return Err(PluggableError::DuplicateMethod {
                name: name.to_string(),
                plugin: existing.plugin.clone(),
            });
        }

        debug!(method = name, plugin, "registered method");
        table.insert(
            name.to_string(),
            MethodEntry {
                plugin: plugin.to_string(),
                handler: Arc::new(move |args| handler(args).boxed()),
            },
        );
        Ok(())
    }

    /// Returns true if a method called `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Returns every method name, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Returns the id of the plugin that registered `name`.
    #[must_use]
    pub fn owner(&self, name: &str) -> Option<String> {
        self.inner.read().get(name).map(|entry| entry.plugin.clone())
    }

    /// Calls the method `name` with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`PluggableError::MethodNotFound`] for unknown names and
    /// [`PluggableError::MethodFailed`] when the body fails.
    pub async fn call(&self, name: &str, args: Value) -> PluggableResult<Value> {
        let handler = self
            .inner
            .read()
            .get(name)
            .map(|entry| entry.handler.clone())
            .ok_or_else(|| PluggableError::MethodNotFound(name.to_string()))?;

        handler(args)
            .await
            .map_err(|source| PluggableError::MethodFailed {
                name: name.to_string(),
                source,
            })
    }

    /// Calls the method `name` and decodes its result.
    ///
    /// # Errors
    ///
    /// Same as [`Methods::call`], plus [`PluggableError::InvalidValue`] when
    /// the result does not decode as `T`.
    pub async fn call_as<T: DeserializeOwned>(&self, name: &str, args: Value) -> PluggableResult<T> {
        let value = self.call(name, args).await?;
        serde_json::from_value(value).map_err(|e| PluggableError::InvalidValue {
            key: name.to_string(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for Methods {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Methods")
            .field("names", &self.names())
            .finish()
    }
}
