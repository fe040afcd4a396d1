//! Configuration management for Rigger.
//!
//! This crate locates `rigger.toml` (or `.riggerrc.toml`) in a project
//! directory and layers mode-specific and local overrides on top of it.

mod error;
mod manager;
mod merge;

pub use error::{ConfigError, ConfigResult};
pub use manager::{
    CONFIG_FILE_NAMES, ConfigManager, ConfigMode, LoadedConfig, MODE_ENV_VAR,
};
pub use merge::deep_merge;
