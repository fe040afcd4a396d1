//! Git plugin for releases.
//!
//! - `modifyAppData`: branch, latest tag, remote and author (`user.name`);
//!   the current version from the latest tag when nothing else provided one
//! - `onCheck`: clean working tree and expected branch
//! - `getChangelog`: one line per commit since the latest tag
//! - `onRelease`: release commit and annotated tag
//!
//! ```toml
//! [git]
//! requireClean = true
//! branch = "main"
//! commitMessage = "chore: release {version}"
//! ```

use std::path::Path;
use std::sync::Arc;

use rigger_git::{Commit, Repository};
use rigger_pluggable::{BoxError, Plugin, PluginApi, PluginDescriptor, PluginReturn};
use rigger_release::{AppData, ReleaseApi, ReleaseContext};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

/// Plugin settings, from the declaration options and the `git` config
/// section (the latter wins).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct GitSettings {
    /// Refuse to release with uncommitted changes.
    pub require_clean: bool,
    /// Branch releases must be cut from.
    pub branch: Option<String>,
    pub commit: bool,
    /// `{version}` is replaced with the new version.
    pub commit_message: String,
    pub tag: bool,
    pub remote: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            require_clean: true,
            branch: None,
            commit: true,
            commit_message: "chore: release {version}".to_string(),
            tag: true,
            remote: "origin".to_string(),
        }
    }
}

impl GitSettings {
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
}

/// Renders the changelog section for `tag`.
#[must_use]
pub fn render_changelog(tag: &str, commits: &[Commit]) -> String {
    let mut out = format!("## {tag}\n");
    if commits.is_empty() {
        out.push_str("\nNo changes.\n");
        return out;
    }
    out.push('\n');
    for commit in commits {
        let short = commit.hash.get(..7).unwrap_or(&commit.hash);
        out.push_str(&format!("- {} ({short})\n", commit.subject));
    }
    out
}

fn open(cwd: &Path) -> Result<Repository, BoxError> {
    Ok(Repository::discover(cwd)?)
}

/// Releases from a git repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitPlugin;

impl GitPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for GitPlugin {
    fn name(&self) -> &str {
        "git"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Checks the repository, writes the changelog, commits and tags releases"
    }

    fn apply(
        &self,
        api: &mut PluginApi<'_>,
        options: &Value,
    ) -> Result<Option<PluginReturn>, BoxError> {
        api.describe(PluginDescriptor::new().config_validator(|value| {
            serde_json::from_value::<GitSettings>(value.clone())
                .map(|_| ())
                .map_err(|e| vec![e.to_string()])
        }));
        let settings = Arc::new(GitSettings::from_values(options, api.user_config())?);

        let remote = settings.remote.clone();
        api.modify_app_data(move |mut data: AppData, ctx: ReleaseContext| {
            let remote = remote.clone();
            async move {
                let Ok(repo) = Repository::discover(&data.cwd) else {
                    debug!(cwd = %data.cwd.display(), "not a git repository");
                    return Ok(data);
                };

                let latest_tag = repo.latest_version_tag(&ctx.config.tag_prefix)?;
                if data.version.is_none()
                    && let Some(tag) = &latest_tag
                {
                    data.version = tag.strip_prefix(&ctx.config.tag_prefix).map(String::from);
                }

                data.extra.insert("latestTag".to_string(), latest_tag.into());
                data.extra
                    .insert("branch".to_string(), repo.current_branch().ok().into());
                data.extra
                    .insert("remoteUrl".to_string(), repo.remote_url(&remote)?.into());
                data.extra
                    .insert("author".to_string(), repo.config_value("user.name").into());
                Ok(data)
            }
        })?;

        let check = settings.clone();
        api.on_check(move |ctx: ReleaseContext| {
            let settings = check.clone();
            async move {
                let repo = open(&ctx.app_data.cwd)?;
                if settings.require_clean && !repo.is_clean()? {
                    return Err("working tree has uncommitted changes".into());
                }
                if let Some(expected) = &settings.branch {
                    let branch = repo.current_branch()?;
                    if branch != *expected {
                        return Err(format!(
                            "releases must be made from {expected}, currently on {branch}"
                        )
                        .into());
                    }
                }
                debug!("git checks passed");
                Ok(())
            }
        })?;

        api.get_changelog(|ctx: ReleaseContext| async move {
            let (Ok(repo), Some(tag)) = (Repository::discover(&ctx.app_data.cwd), ctx.next_tag())
            else {
                return Ok(None);
            };
            let since = repo.latest_version_tag(&ctx.config.tag_prefix)?;
            let commits = match repo.commits_since(since.as_deref()) {
                Ok(commits) => commits,
                // No commit yet.
                Err(rigger_git::GitError::Git2(_)) if since.is_none() => Vec::new(),
                Err(err) => return Err(err.into()),
            };
            Ok(Some(render_changelog(&tag, &commits)))
        })?;

        api.on_release(move |ctx: ReleaseContext| {
            let settings = settings.clone();
            async move {
                let (Some(version), Some(tag)) = (ctx.next_version.clone(), ctx.next_tag()) else {
                    return Ok(());
                };
                if ctx.config.dry_run {
                    info!(%tag, "dry run, skipping commit and tag");
                    return Ok(());
                }

                let repo = open(&ctx.app_data.cwd)?;
                if settings.commit && !repo.is_clean()? {
                    let message = settings.commit_message.replace("{version}", &version);
                    let hash = repo.commit_all(&message)?;
                    info!(%hash, %message, "created release commit");
                }
                if settings.tag {
                    let message = ctx.changelog.clone().unwrap_or_else(|| format!("Release {tag}"));
                    repo.create_tag(&tag, &message)?;
                    info!(%tag, "created tag");
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

    use git2::Signature;
    use rigger_pluggable::{PluggableError, PluginRegistry};
    use rigger_release::{
        ConfigMode, Increment, ReleaseError, ReleaseFlags, ReleaseOptions, ReleaseService,
    };
    use semver::Version;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn create_test_repo() -> (TempDir, git2::Repository) {
        let temp_dir = TempDir::new().unwrap();
        let repo = git2::Repository::init(temp_dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        (temp_dir, repo)
    }

    fn commit_file(dir: &TempDir, repo: &git2::Repository, name: &str, message: &str) {
        fs::write(dir.path().join(name), message).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test User", "test@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }

    fn tag(repo: &git2::Repository, name: &str) {
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        let sig = Signature::now("Test User", "test@example.com").unwrap();
        repo.tag(name, head.as_object(), &sig, name, false).unwrap();
    }

    fn release(dir: &TempDir, flags: ReleaseFlags) -> ReleaseService {
        ReleaseService::new(
            ReleaseOptions::new(dir.path())
                .plugin("rigger-plugin-git")
                .flags(flags)
                .mode(ConfigMode::Test),
            PluginRegistry::new().with("rigger-plugin-git", GitPlugin::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_render_changelog() {
        let commits = vec![Commit {
            hash: "0123456789abcdef".to_string(),
            subject: "feat: add templates".to_string(),
            author: "Test User".to_string(),
            date: chrono::Utc::now(),
        }];
        assert_eq!(
            render_changelog("v1.1.0", &commits),
            "## v1.1.0\n\n- feat: add templates (0123456)\n"
        );
        assert_eq!(render_changelog("v1.1.0", &[]), "## v1.1.0\n\nNo changes.\n");
    }

    #[test]
    fn test_settings() {
        let settings = GitSettings::from_values(&Value::Null, None).unwrap();
        assert_eq!(settings, GitSettings::default());

        let settings =
            GitSettings::from_values(&json!({ "branch": "main", "requireClean": false }), None)
                .unwrap();
        assert_eq!(settings.branch.as_deref(), Some("main"));
        assert!(!settings.require_clean);
        assert!(settings.tag);

        assert!(GitSettings::from_values(&json!({ "push": true }), None).is_err());
    }

    #[tokio::test]
    async fn test_release_commits_and_tags() {
        let (dir, repo) = create_test_repo();
        commit_file(&dir, &repo, "README.md", "feat: first");
        tag(&repo, "v1.0.0");
        commit_file(&dir, &repo, "src.txt", "fix: second");
        fs::write(dir.path().join("CHANGES"), "pending\n").unwrap();

        let mut service = release(
            &dir,
            ReleaseFlags {
                git_checks: Some(false),
                ..ReleaseFlags::default()
            },
        );
        let outcome = service.run().await.unwrap();

        assert_eq!(outcome.next_version, Version::new(1, 0, 1));
        assert_eq!(outcome.increment, Some(Increment::Patch));
        let changelog = outcome.changelog.unwrap();
        assert!(changelog.starts_with("## v1.0.1\n"));
        assert!(changelog.contains("- fix: second"));
        assert!(!changelog.contains("feat: first"));

        let repo = Repository::open(dir.path()).unwrap();
        assert!(repo.is_clean().unwrap());
        assert_eq!(repo.latest_version_tag("v").unwrap().as_deref(), Some("v1.0.1"));
        let commits = repo.commits_since(Some("v1.0.0")).unwrap();
        assert_eq!(commits[0].subject, "chore: release 1.0.1");

        let app_data = &service.context().app_data;
        assert_eq!(app_data.version.as_deref(), Some("1.0.0"));
        assert_eq!(app_data.extra["latestTag"], json!("v1.0.0"));
        assert_eq!(app_data.extra["remoteUrl"], Value::Null);
        assert_eq!(app_data.extra["author"], json!("Test User"));
    }

    #[tokio::test]
    async fn test_dirty_tree_fails_checks() {
        let (dir, repo) = create_test_repo();
        commit_file(&dir, &repo, "README.md", "feat: first");
        fs::write(dir.path().join("dirty.txt"), "x").unwrap();

        let mut service = release(&dir, ReleaseFlags::default());
        let err = service.run().await.unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Pluggable(PluggableError::HookFailed { ref key, .. }) if key == "onCheck"
        ));
        assert!(err.to_string().contains("uncommitted changes"));
    }

    #[tokio::test]
    async fn test_wrong_branch_fails_checks() {
        let (dir, repo) = create_test_repo();
        commit_file(&dir, &repo, "README.md", "feat: first");
        commit_file(&dir, &repo, "rigger.toml", "[git]\nbranch = \"release-train\"\n");

        let mut service = release(&dir, ReleaseFlags::default());
        let err = service.run().await.unwrap_err();
        assert!(err.to_string().contains("releases must be made from release-train"));
    }

    #[tokio::test]
    async fn test_dry_run_does_not_tag() {
        let (dir, repo) = create_test_repo();
        commit_file(&dir, &repo, "README.md", "feat: first");
        tag(&repo, "v0.1.0");

        let mut service = release(
            &dir,
            ReleaseFlags {
                dry_run: Some(true),
                ..ReleaseFlags::default()
            },
        );
        let outcome = service.run().await.unwrap();
        assert_eq!(outcome.next_version, Version::new(0, 1, 1));

        let repo = Repository::open(dir.path()).unwrap();
        assert_eq!(repo.tags().unwrap(), vec!["v0.1.0".to_string()]);
    }

    #[tokio::test]
    async fn test_outside_a_repository() {
        let dir = TempDir::new().unwrap();
        let mut service = release(
            &dir,
            ReleaseFlags {
                git_checks: Some(false),
                dry_run: Some(true),
                ..ReleaseFlags::default()
            },
        );
        let outcome = service.run().await.unwrap();
        assert!(outcome.changelog.is_none());
        assert!(!service.context().app_data.extra.contains_key("branch"));
    }
}
