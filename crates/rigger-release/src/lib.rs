//! Release pipeline for Rigger.
//!
//! - [`ReleaseService`]: Runs the release phases through plugin hooks
//! - [`ReleaseApi`]: Typed release hooks on [`rigger_pluggable::PluginApi`]
//! - [`ReleaseConfig`]: Settings from the `release` config section and flags
//! - [`Increment`]: Version increments and [`bump`]

mod api;
mod config;
mod error;
mod service;
mod version;

pub use api::{CONFIG_PROP, ReleaseApi, hooks};
pub use config::{AppData, ReleaseConfig, ReleaseContext, ReleaseFlags};
pub use error::{ReleaseError, ReleaseResult};
pub use service::{CONFIG_KEY, ReleaseOptions, ReleaseOutcome, ReleaseService};
pub use version::{Increment, bump, parse_version};

pub use rigger_config::ConfigMode;
