//! Release configuration and the data handed to hooks.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Increment;

/// Release settings, read from the `release` section of the user
/// configuration and then overridden by [`ReleaseFlags`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseConfig {
    /// Hosting flavour, e.g. `github`.
    pub repo_type: Option<String>,
    pub repo_url: Option<String>,
    pub changelog_preset: String,
    /// Explicit next version. Skips `getIncrement`.
    pub target_version: Option<String>,
    /// Runs `onCheck` hooks.
    pub git_checks: bool,
    /// Marks the release as the latest one.
    pub latest: bool,
    pub dry_run: bool,
    pub tag_prefix: String,
    /// First pre-release identifier, as in `1.0.0-beta.0`.
    pub preid: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            repo_type: None,
            repo_url: None,
            changelog_preset: "angular".to_string(),
            target_version: None,
            git_checks: true,
            latest: true,
            dry_run: false,
            tag_prefix: "v".to_string(),
            preid: "beta".to_string(),
        }
    }
}

/// Caller overrides, typically from command-line flags. `None` keeps the
/// configured value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseFlags {
    pub repo_type: Option<String>,
    pub repo_url: Option<String>,
    pub changelog_preset: Option<String>,
    pub target_version: Option<String>,
    pub git_checks: Option<bool>,
    pub latest: Option<bool>,
    pub dry_run: Option<bool>,
}

impl ReleaseFlags {
    /// Writes every set flag into `config`.
    pub fn apply(self, config: &mut ReleaseConfig) {
        if let Some(repo_type) = self.repo_type {
            config.repo_type = Some(repo_type);
        }
        if let Some(repo_url) = self.repo_url {
            config.repo_url = Some(repo_url);
        }
        if let Some(preset) = self.changelog_preset {
            config.changelog_preset = preset;
        }
        if let Some(target) = self.target_version {
            config.target_version = Some(target);
        }
        if let Some(git_checks) = self.git_checks {
            config.git_checks = git_checks;
        }
        if let Some(latest) = self.latest {
            config.latest = latest;
        }
        if let Some(dry_run) = self.dry_run {
            config.dry_run = dry_run;
        }
    }
}

/// Project facts gathered before the release runs. Plugins add their own
/// fields through `modifyAppData`; they land in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    pub cwd: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    /// Current version, before the release.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Snapshot passed as arguments to every release hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseContext {
    pub config: ReleaseConfig,
    pub app_data: AppData,
    pub current_version: Option<String>,
    pub increment: Option<Increment>,
    pub next_version: Option<String>,
    pub changelog: Option<String>,
}

impl ReleaseContext {
    /// Returns the tag the release will create, once the version is known.
    #[must_use]
    pub fn next_tag(&self) -> Option<String> {
        self.next_version
            .as_ref()
            .map(|version| format!("{}{version}", self.config.tag_prefix))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_defaults_from_partial_table() {
        let config: ReleaseConfig =
            serde_json::from_value(json!({ "gitChecks": false, "tagPrefix": "" })).unwrap();
        assert!(!config.git_checks);
        assert!(config.latest);
        assert_eq!(config.tag_prefix, "");
        assert_eq!(config.changelog_preset, "angular");
    }

    #[test]
    fn test_flags_override_only_what_is_set() {
        let mut config = ReleaseConfig {
            repo_url: Some("https://example.com/a.git".to_string()),
            ..ReleaseConfig::default()
        };
        ReleaseFlags {
            dry_run: Some(true),
            git_checks: Some(false),
            target_version: Some("2.0.0".to_string()),
            ..ReleaseFlags::default()
        }
        .apply(&mut config);

        assert!(config.dry_run);
        assert!(!config.git_checks);
        assert_eq!(config.target_version.as_deref(), Some("2.0.0"));
        assert_eq!(config.repo_url.as_deref(), Some("https://example.com/a.git"));
    }

    #[test]
    fn test_app_data_keeps_extra_fields() {
        let data: AppData = serde_json::from_value(json!({
            "cwd": "/work/app",
            "version": "1.0.0",
            "branch": "main",
        }))
        .unwrap();
        assert_eq!(data.version.as_deref(), Some("1.0.0"));
        assert_eq!(data.extra["branch"], "main");

        let back = serde_json::to_value(&data).unwrap();
        assert_eq!(back["branch"], "main");
        assert_eq!(back["cwd"], "/work/app");
    }

    #[test]
    fn test_next_tag() {
        let mut ctx = ReleaseContext {
            config: ReleaseConfig::default(),
            app_data: AppData::default(),
            current_version: None,
            increment: None,
            next_version: None,
            changelog: None,
        };
        assert!(ctx.next_tag().is_none());
        ctx.next_version = Some("1.4.0".to_string());
        assert_eq!(ctx.next_tag().as_deref(), Some("v1.4.0"));
    }
}
