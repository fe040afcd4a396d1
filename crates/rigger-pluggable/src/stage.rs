//! Lifecycle state machine shared by the runtime and the services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{PluggableError, PluggableResult};

/// Lifecycle stage of a runtime or service.
///
/// Stages are walked strictly forward, one at a time:
/// `Uninitialized -> Init -> InitPresets -> InitPlugins -> Loaded ->
/// Prompting -> Running -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Uninitialized,
    Init,
    InitPresets,
    InitPlugins,
    Loaded,
    Prompting,
    Running,
    Done,
}

impl Stage {
    /// Returns the only stage this one may move to.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Uninitialized => Some(Self::Init),
            Self::Init => Some(Self::InitPresets),
            Self::InitPresets => Some(Self::InitPlugins),
            Self::InitPlugins => Some(Self::Loaded),
            Self::Loaded => Some(Self::Prompting),
            Self::Prompting => Some(Self::Running),
            Self::Running => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// Returns true while plugins are being applied.
    #[must_use]
    pub const fn is_applying(self) -> bool {
        matches!(self, Self::InitPresets | Self::InitPlugins)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Init => write!(f, "init"),
            Self::InitPresets => write!(f, "init_presets"),
            Self::InitPlugins => write!(f, "init_plugins"),
            Self::Loaded => write!(f, "loaded"),
            Self::Prompting => write!(f, "prompting"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// A recorded stage change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub at: DateTime<Utc>,
}

/// Tracks the current stage and every transition taken so far.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    stage: Stage,
    history: Vec<StageTransition>,
}

impl Lifecycle {
    /// Creates a lifecycle in [`Stage::Uninitialized`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage: Stage::Uninitialized,
            history: Vec::new(),
        }
    }

    /// Returns the current stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Returns every transition taken so far, oldest first.
    #[must_use]
    pub fn history(&self) -> &[StageTransition] {
        &self.history
    }

    /// Moves to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`PluggableError::IllegalTransition`] unless `to` is the
    /// immediate successor of the current stage.
    pub fn transition(&mut self, to: Stage) -> PluggableResult<()> {
        let from = self.stage;
        if from.next() != Some(to) {
            return Err(PluggableError::IllegalTransition { from, to });
        }

        debug!(%from, %to, "lifecycle transition");
        self.stage = to;
        self.history.push(StageTransition {
            from,
            to,
            at: Utc::now(),
        });
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_stage() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.stage(), Stage::Uninitialized);
        assert!(lifecycle.history().is_empty());
    }

    #[test]
    fn test_walks_every_stage_forward() {
        let mut lifecycle = Lifecycle::new();
        let mut stage = Stage::Uninitialized;
        while let Some(next) = stage.next() {
            lifecycle.transition(next).unwrap();
            stage = next;
        }
        assert_eq!(lifecycle.stage(), Stage::Done);
        assert_eq!(lifecycle.history().len(), 7);
        assert_eq!(lifecycle.history()[0].from, Stage::Uninitialized);
        assert_eq!(lifecycle.history()[6].to, Stage::Done);
    }

    #[test]
    fn test_rejects_skipping_a_stage() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle.transition(Stage::InitPresets).unwrap_err();
        assert!(matches!(
            err,
            PluggableError::IllegalTransition {
                from: Stage::Uninitialized,
                to: Stage::InitPresets
            }
        ));
        assert_eq!(lifecycle.stage(), Stage::Uninitialized);
    }

    #[test]
    fn test_rejects_going_backwards() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(Stage::Init).unwrap();
        lifecycle.transition(Stage::InitPresets).unwrap();
        assert!(lifecycle.transition(Stage::Init).is_err());
        assert!(lifecycle.transition(Stage::InitPresets).is_err());
    }

    #[test]
    fn test_done_is_terminal() {
        assert_eq!(Stage::Done.next(), None);
    }

    #[test]
    fn test_is_applying() {
        assert!(Stage::InitPresets.is_applying());
        assert!(Stage::InitPlugins.is_applying());
        assert!(!Stage::Loaded.is_applying());
        assert!(!Stage::Init.is_applying());
    }

    #[test]
    fn test_stage_serialization() {
        let json = serde_json::to_string(&Stage::InitPresets).unwrap();
        assert_eq!(json, "\"init_presets\"");

        let parsed: Stage = serde_json::from_str("\"loaded\"").unwrap();
        assert_eq!(parsed, Stage::Loaded);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Prompting.to_string(), "prompting");
        assert_eq!(Stage::Uninitialized.to_string(), "uninitialized");
    }
}
