//! Git repository wrapper.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use git2::{ErrorCode, IndexAddOption, Repository as Git2Repo, StatusOptions};
use serde::Serialize;
use tracing::debug;

use crate::{GitError, GitResult};

/// A commit, as listed by [`Repository::commits_since`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub hash: String,
    /// First line of the message.
    pub subject: String,
    pub author: String,
    pub date: DateTime<Utc>,
}

/// A Git repository wrapper.
pub struct Repository {
    inner: Git2Repo,
}

impl Repository {
    /// Opens a repository at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a valid Git repository.
    pub fn open(path: impl AsRef<Path>) -> GitResult<Self> {
        let path = path.as_ref();
        let inner = Git2Repo::open(path).map_err(|_| GitError::NotARepo(path.to_path_buf()))?;
        Ok(Self { inner })
    }

    /// Discovers the repository containing `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if no repository is found.
    pub fn discover(path: impl AsRef<Path>) -> GitResult<Self> {
        let path = path.as_ref();
        let inner =
            Git2Repo::discover(path).map_err(|_| GitError::NotARepo(path.to_path_buf()))?;
        Ok(Self { inner })
    }

    /// Returns the repository root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.workdir().unwrap_or_else(|| self.inner.path())
    }

    /// Returns the name of the checked out branch.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::DetachedHead`] when HEAD is not a branch.
    pub fn current_branch(&self) -> GitResult<String> {
        match self.inner.head() {
            Ok(head) if head.is_branch() => head
                .shorthand()
                .map(String::from)
                .ok_or(GitError::DetachedHead),
            Ok(_) => Err(GitError::DetachedHead),
            // A fresh repository has HEAD pointing at a branch with no commit.
            Err(err) if err.code() == ErrorCode::UnbornBranch => {
                let head = self.inner.find_reference("HEAD")?;
                head.symbolic_target()
                    .and_then(|target| target.strip_prefix("refs/heads/"))
                    .map(String::from)
                    .ok_or(GitError::DetachedHead)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns true when there are no staged, unstaged or untracked changes.
    ///
    /// # Errors
    ///
    /// Returns an error for bare repositories or unreadable status.
    pub fn is_clean(&self) -> GitResult<bool> {
        if self.inner.is_bare() {
            return Err(GitError::Bare);
        }
        let mut options = StatusOptions::new();
        options.include_untracked(true).include_ignored(false);
        let statuses = self.inner.statuses(Some(&mut options))?;
        debug!(changes = statuses.len(), "repository status");
        Ok(statuses.is_empty())
    }

    /// Returns the URL of the remote `name`, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if remotes cannot be read.
    pub fn remote_url(&self, name: &str) -> GitResult<Option<String>> {
        match self.inner.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(String::from)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns a value from the git configuration (`user.name`, ...).
    #[must_use]
    pub fn config_value(&self, key: &str) -> Option<String> {
        self.inner.config().ok()?.get_string(key).ok()
    }

    /// Returns all tags in the repository.
    ///
    /// # Errors
    ///
    /// Returns an error if tags cannot be read.
    pub fn tags(&self) -> GitResult<Vec<String>> {
        let tags = self.inner.tag_names(None)?;
        Ok(tags.iter().flatten().map(String::from).collect())
    }

    /// Returns commits since the given tag, newest first.
    ///
    /// If tag is `None`, returns all commits.
    ///
    /// # Errors
    ///
    /// Returns an error if commits cannot be read.
    pub fn commits_since(&self, tag: Option<&str>) -> GitResult<Vec<Commit>> {
        let mut revwalk = self.inner.revwalk()?;
        revwalk.push_head()?;

        if let Some(tag_name) = tag {
            let tag_ref = self
                .inner
                .resolve_reference_from_short_name(tag_name)
                .map_err(|_| GitError::TagNotFound(tag_name.to_string()))?;
            let tag_commit = tag_ref
                .peel_to_commit()
                .map_err(|_| GitError::TagNotFound(tag_name.to_string()))?;
            revwalk.hide(tag_commit.id())?;
        }

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.inner.find_commit(oid)?;
            let author = commit.author();

            commits.push(Commit {
                hash: oid.to_string(),
                subject: commit.summary().unwrap_or_default().to_string(),
                author: author.name().unwrap_or("Unknown").to_string(),
                date: Utc
                    .timestamp_opt(commit.time().seconds(), 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            });
        }

        Ok(commits)
    }

    /// Returns the latest tag matching a version pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if tags cannot be read.
    pub fn latest_version_tag(&self, prefix: &str) -> GitResult<Option<String>> {
        let tags = self.tags()?;

        let mut version_tags: Vec<_> = tags
            .into_iter()
            .filter_map(|t| {
                let version = semver::Version::parse(t.strip_prefix(prefix)?).ok()?;
                Some((t, version))
            })
            .collect();

        version_tags.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(version_tags.into_iter().next().map(|(tag, _)| tag))
    }

    /// Stages every change and commits it. Returns the new commit id.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be written or no signature is
    /// configured.
    pub fn commit_all(&self, message: &str) -> GitResult<String> {
        let mut index = self.inner.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;

        let tree = self.inner.find_tree(index.write_tree()?)?;
        let signature = self.inner.signature()?;
        let parent = match self.inner.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(err) if err.code() == ErrorCode::UnbornBranch => None,
            Err(err) => return Err(err.into()),
        };
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let oid = self
            .inner
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        debug!(%oid, "created commit");
        Ok(oid.to_string())
    }

    /// Creates a new annotated tag on HEAD.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag cannot be created.
    pub fn create_tag(&self, name: &str, message: &str) -> GitResult<()> {
        let head = self.inner.head()?;
        let commit = head.peel_to_commit()?;
        let sig = self.inner.signature()?;

        self.inner
            .tag(name, commit.as_object(), &sig, message, false)?;
        debug!(tag = name, "created tag");

        Ok(())
    }
}
