//! Version file plugin.
//!
//! Reads the current version from the first configured file during
//! `modifyAppData` and writes the next version into every file during
//! `onBumpVersion`.
//!
//! ```toml
//! [bump]
//! files = ["Cargo.toml", "npm/package.json", "VERSION"]
//! ```

mod files;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rigger_pluggable::{BoxError, Plugin, PluginApi, PluginDescriptor, PluginReturn};
use rigger_release::{AppData, ReleaseApi, ReleaseContext, parse_version};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

pub use files::{FileResult, FileUpdateError, read_version_from_file, update_version_file};

/// Files tried when none are configured.
pub const DEFAULT_FILES: &[&str] = &["Cargo.toml", "package.json"];

/// Plugin settings, from the declaration options and the `bump` config
/// section (the latter wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BumpSettings {
    /// Version files, relative to the project directory.
    pub files: Vec<String>,
}

impl BumpSettings {
    fn from_values(options: &Value, user_config: Option<&Value>) -> Result<Self, serde_json::Error> {
        let value = match user_config {
            Some(config @ Value::Object(_)) => config.clone(),
            _ => options.clone(),
        };
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }

    /// Returns the files to work on. Without configuration these are the
    /// [`DEFAULT_FILES`] that exist.
    #[must_use]
    pub fn resolve(&self, cwd: &Path) -> Vec<PathBuf> {
        if self.files.is_empty() {
            DEFAULT_FILES
                .iter()
                .map(|f| cwd.join(f))
                .filter(|p| p.is_file())
                .collect()
        } else {
            self.files.iter().map(|f| cwd.join(f)).collect()
        }
    }
}

/// Keeps version files in step with releases.
#[derive(Debug, Clone, Copy, Default)]
pub struct BumpPlugin;

impl BumpPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for BumpPlugin {
    fn name(&self) -> &str {
        "bump"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Reads and writes the project version in version files"
    }

    fn apply(
        &self,
        api: &mut PluginApi<'_>,
        options: &Value,
    ) -> Result<Option<PluginReturn>, BoxError> {
        api.describe(PluginDescriptor::new().config_validator(|value| {
            serde_json::from_value::<BumpSettings>(value.clone())
                .map(|_| ())
                .map_err(|e| vec![e.to_string()])
        }));

        let settings = BumpSettings::from_values(options, api.user_config())?;
        let files: Arc<[PathBuf]> = settings.resolve(api.cwd()).into();
        debug!(files = ?files, "version files");

        let read_from = files.clone();
        api.modify_app_data(move |mut data: AppData, _ctx: ReleaseContext| {
            let files = read_from.clone();
            async move {
                if data.version.is_none()
                    && let Some(path) = files.first()
                {
                    let version = read_version_from_file(path)?;
                    debug!(path = %path.display(), %version, "current version");
                    data.version = Some(version.to_string());
                }
                data.extra.insert(
                    "versionFiles".to_string(),
                    files.iter().map(|p| p.display().to_string()).collect(),
                );
                Ok(data)
            }
        })?;

        api.on_bump_version(move |ctx: ReleaseContext| {
            let files = files.clone();
            async move {
                let Some(next) = &ctx.next_version else {
                    return Ok(());
                };
                let next = parse_version(next)?;
                for path in files.iter() {
                    update_version_file(path, &next, ctx.config.dry_run)?;
                    info!(
                        path = %path.display(),
                        version = %next,
                        dry_run = ctx.config.dry_run,
                        "updated version file"
                    );
                }
                Ok(())
            }
        })?;

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rigger_pluggable::{PluggableError, PluginDeclaration, PluginRegistry};
    use rigger_release::{ConfigMode, ReleaseError, ReleaseFlags, ReleaseOptions, ReleaseService};
    use semver::Version;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn registry() -> PluginRegistry {
        PluginRegistry::new().with("rigger-plugin-bump", BumpPlugin::new())
    }

    fn release(dir: &TempDir, flags: ReleaseFlags) -> ReleaseService {
        ReleaseService::new(
            ReleaseOptions::new(dir.path())
                .plugin("rigger-plugin-bump")
                .flags(ReleaseFlags {
                    git_checks: Some(false),
                    ..flags
                })
                .mode(ConfigMode::Test),
            registry(),
        )
        .unwrap()
    }

    #[test]
    fn test_settings_prefer_user_config() {
        let settings =
            BumpSettings::from_values(&json!({ "files": ["a.toml"] }), Some(&json!({ "files": ["b.json"] })))
                .unwrap();
        assert_eq!(settings.files, vec!["b.json"]);

        let settings = BumpSettings::from_values(&json!({ "files": ["a.toml"] }), None).unwrap();
        assert_eq!(settings.files, vec!["a.toml"]);

        assert!(BumpSettings::from_values(&json!({ "file": [] }), None).is_err());
    }

    #[test]
    fn test_default_files_must_exist() {
        let dir = TempDir::new().unwrap();
        assert!(BumpSettings::default().resolve(dir.path()).is_empty());

        fs::write(dir.path().join("package.json"), "{\"version\": \"1.0.0\"}").unwrap();
        assert_eq!(
            BumpSettings::default().resolve(dir.path()),
            vec![dir.path().join("package.json")]
        );
    }

    #[tokio::test]
    async fn test_release_bumps_every_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("rigger.toml"),
            "[bump]\nfiles = [\"Cargo.toml\", \"VERSION\"]\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"demo\"\nversion = \"0.3.0\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("VERSION"), "0.3.0\n").unwrap();

        let mut service = release(&dir, ReleaseFlags::default());
        let outcome = service.run().await.unwrap();

        assert_eq!(outcome.current_version, Version::new(0, 3, 0));
        assert_eq!(outcome.next_version, Version::new(0, 3, 1));
        assert!(
            fs::read_to_string(dir.path().join("Cargo.toml"))
                .unwrap()
                .contains("version = \"0.3.1\"")
        );
        assert_eq!(fs::read_to_string(dir.path().join("VERSION")).unwrap(), "0.3.1\n");
        assert_eq!(
            service.context().app_data.extra["versionFiles"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_dry_run_leaves_files_alone() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{\"version\": \"1.0.0\"}").unwrap();

        let mut service = release(
            &dir,
            ReleaseFlags {
                dry_run: Some(true),
                target_version: Some("2.0.0".to_string()),
                ..ReleaseFlags::default()
            },
        );
        let outcome = service.run().await.unwrap();

        assert_eq!(outcome.next_version, Version::new(2, 0, 0));
        assert_eq!(
            fs::read_to_string(dir.path().join("package.json")).unwrap(),
            "{\"version\": \"1.0.0\"}"
        );
    }

    #[tokio::test]
    async fn test_invalid_settings_are_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("rigger.toml"), "[bump]\nfiles = \"Cargo.toml\"\n").unwrap();

        let mut service = release(&dir, ReleaseFlags::default());
        let err = service.run().await.unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Pluggable(PluggableError::Apply { .. } | PluggableError::ConfigValidation(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_fails_the_release() {
        let dir = TempDir::new().unwrap();
        let plugin = PluginDeclaration::with_options("rigger-plugin-bump", json!({ "files": ["missing.toml"] }));
        let mut service = ReleaseService::new(
            ReleaseOptions::new(dir.path())
                .plugin(plugin)
                .flags(ReleaseFlags {
                    git_checks: Some(false),
                    ..ReleaseFlags::default()
                })
                .mode(ConfigMode::Test),
            registry(),
        )
        .unwrap();

        let err = service.run().await.unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }
}
