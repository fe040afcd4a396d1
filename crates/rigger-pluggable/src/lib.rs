//! Plugin and hook runtime for Rigger.
//!
//! This crate provides the extension mechanism shared by the generator and
//! the release pipeline:
//! - [`Plugin`]: Base trait for plugins and presets
//! - [`PluginRegistry`]: Resolves declarations to plugin values
//! - [`PluginApi`]: Registration surface handed to `apply`
//! - [`Pluggable`]: Resolves presets and plugins and applies hooks
//! - [`Lifecycle`]: Forward-only stage machine

mod api;
mod error;
mod hook;
mod manifest;
mod methods;
mod pluggable;
mod plugin;
mod registry;
mod stage;
pub mod typed;

pub use api::{ConfigValidator, PluginApi, PluginDescriptor};
pub use error::{BoxError, PluggableError, PluggableResult};
pub use hook::{Hook, HookBuilder, HookFn, HookFuture, HookInput};
pub use manifest::ManifestPlugin;
pub use methods::{MethodFn, Methods};
pub use pluggable::{ApplyPluginsOptions, ApplyPluginsType, Pluggable, PluginEntry};
pub use plugin::{FnPlugin, Plugin, PluginDeclaration, PluginKind, PluginReturn, ResolvedPlugin};
pub use registry::{PluginRegistry, is_path_like, normalize_path, plugin_key};
pub use stage::{Lifecycle, Stage, StageTransition};
