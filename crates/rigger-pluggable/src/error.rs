//! Pluggable runtime error types.

use thiserror::Error;

use crate::Stage;

/// Boxed error returned by plugin bodies, hook handlers and methods.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while resolving plugins, registering hooks or applying them.
#[derive(Debug, Error)]
pub enum PluggableError {
    /// A plugin or preset identifier could not be resolved.
    #[error("plugin not found: {0}")]
    NotFound(String),

    /// A declaration could not be understood.
    #[error("invalid plugin declaration: {0}")]
    InvalidDeclaration(String),

    /// The same id was declared twice with different options.
    #[error("plugin {id} is declared more than once with different options")]
    DuplicatePlugin { id: String },

    /// A manifest file could not be read or parsed.
    #[error("failed to load manifest {path}: {reason}")]
    Manifest { path: String, reason: String },

    /// A hook was built without its key and/or handler.
    #[error("invalid hook registered by {plugin}: missing {}", .missing.join(" and "))]
    InvalidHook {
        plugin: String,
        missing: Vec<&'static str>,
    },

    /// A registration primitive was used outside the phase that allows it.
    #[error("{action} is not allowed for {plugin} during {stage}")]
    InvalidPhase {
        plugin: String,
        action: &'static str,
        stage: Stage,
    },

    /// A method with this name already exists.
    #[error("method {name} is already registered (by {plugin})")]
    DuplicateMethod { name: String, plugin: String },

    /// A method was called that nobody registered.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// The lifecycle was asked to move somewhere it cannot go.
    #[error("illegal lifecycle transition from {from} to {to}")]
    IllegalTransition { from: Stage, to: Stage },

    /// `before` ordering constraints could not be satisfied.
    #[error("cannot order hook {key} of {plugin} before {before}")]
    HookOrder {
        key: String,
        plugin: String,
        before: String,
    },

    /// A plugin's apply function failed.
    #[error("plugin {id} failed to apply: {source}")]
    Apply {
        id: String,
        #[source]
        source: BoxError,
    },

    /// A hook body failed.
    #[error("hook {key} of plugin {plugin} failed: {source}")]
    HookFailed {
        key: String,
        plugin: String,
        #[source]
        source: BoxError,
    },

    /// A method body failed.
    #[error("method {name} failed: {source}")]
    MethodFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// An application result had an unexpected shape.
    #[error("unexpected value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// User configuration failed validation. Every problem is listed.
    #[error("invalid configuration:\n{}", .0.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    ConfigValidation(Vec<String>),
}

/// Result type for pluggable operations.
pub type PluggableResult<T> = Result<T, PluggableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = PluggableError::NotFound("./missing-plugin".to_string());
        assert_eq!(err.to_string(), "plugin not found: ./missing-plugin");
    }

    #[test]
    fn test_invalid_hook_lists_every_missing_field() {
        let err = PluggableError::InvalidHook {
            plugin: "demo".to_string(),
            missing: vec!["key", "handler"],
        };
        assert_eq!(
            err.to_string(),
            "invalid hook registered by demo: missing key and handler"
        );
    }

    #[test]
    fn test_invalid_phase_display() {
        let err = PluggableError::InvalidPhase {
            plugin: "demo".to_string(),
            action: "register_presets",
            stage: Stage::InitPlugins,
        };
        assert_eq!(
            err.to_string(),
            "register_presets is not allowed for demo during init_plugins"
        );
    }

    #[test]
    fn test_config_validation_lists_all() {
        let err = PluggableError::ConfigValidation(vec![
            "unknown config key: foo".to_string(),
            "git: expected a table".to_string(),
        ]);
        insta::assert_snapshot!(err.to_string(), @r"
        invalid configuration:
          - unknown config key: foo
          - git: expected a table
        ");
    }

    #[test]
    fn test_hook_failed_keeps_source() {
        let err = PluggableError::HookFailed {
            key: "onStart".to_string(),
            plugin: "demo".to_string(),
            source: "boom".into(),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "hook onStart of plugin demo failed: boom");
    }

    #[test]
    fn test_error_is_debug() {
        let err = PluggableError::MethodNotFound("copyFile".to_string());
        let debug = format!("{err:?}");
        assert!(debug.contains("MethodNotFound"));
    }
}
