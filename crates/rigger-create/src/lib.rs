//! Project generator for Rigger.
//!
//! - [`GenerateService`]: Runs the generator phases through plugin hooks
//! - [`GenerateApi`]: Typed generator hooks on [`rigger_pluggable::PluginApi`]
//! - [`Prompter`]: Answers the collected [`Question`]s

mod api;
mod context;
mod error;
mod prompt;
mod service;

pub use api::{GenerateApi, PATHS_PROP, hooks};
pub use context::{AppData, GenerateContext, Paths};
pub use error::{CreateError, CreateResult};
pub use prompt::{Answers, NonInteractivePrompter, Prompter, Question, QuestionKind, TerminalPrompter};
pub use service::{GenerateOptions, GenerateService};

pub use rigger_config::ConfigMode;
