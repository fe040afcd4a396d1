//! Copying and writing project files.
//!
//! Files ending in `.tpl` are rendered with the template data and written
//! without the suffix. Everything else is copied byte for byte.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde_json::Value;
use tracing::debug;

use crate::error::{FilesError, FilesResult};
use crate::template::TemplateCache;

/// Suffix marking files to render.
pub const TEMPLATE_SUFFIX: &str = ".tpl";

/// Returns `path` without its template suffix, if it has one.
#[must_use]
pub fn strip_template_suffix(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stripped = name.strip_suffix(TEMPLATE_SUFFIX)?;
    if stripped.is_empty() {
        return None;
    }
    Some(path.with_file_name(stripped))
}

async fn create_parent(path: &Path) -> FilesResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FilesError::io(parent, e))?;
    }
    Ok(())
}

/// Writes `content` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the directories or the file cannot be written.
pub async fn write_file(path: &Path, content: &str) -> FilesResult<()> {
    create_parent(path).await?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| FilesError::io(path, e))?;
    debug!(path = %path.display(), "wrote file");
    Ok(())
}

/// Copies one file, rendering it when `from` is a template. Returns the
/// path written, which drops the template suffix from `to`.
///
/// # Errors
///
/// Returns an error if `from` is missing, the template does not compile or
/// the destination cannot be written.
pub async fn copy_file(
    templates: &TemplateCache,
    from: &Path,
    to: &Path,
    data: &Value,
) -> FilesResult<PathBuf> {
    if !from.is_file() {
        return Err(FilesError::NotFound(from.to_path_buf()));
    }

    if strip_template_suffix(from).is_some() {
        let dest = strip_template_suffix(to).unwrap_or_else(|| to.to_path_buf());
        let rendered = templates.load(from).await?.render(data);
        write_file(&dest, &rendered).await?;
        return Ok(dest);
    }

    create_parent(to).await?;
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| FilesError::io(from, e))?;
    debug!(from = %from.display(), to = %to.display(), "copied file");
    Ok(to.to_path_buf())
}

/// Lists the entries under `root` relative to it, paired with whether each
/// is a directory. Symlinks are followed and hidden files are kept.
fn walk_tree(root: &Path) -> FilesResult<Vec<(PathBuf, bool)>> {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(true)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        entries.push((relative.to_path_buf(), is_dir));
    }
    Ok(entries)
}

/// Copies the tree under `from` into `to`. Returns the files written,
/// sorted.
///
/// # Errors
///
/// Returns the first error from reading the tree or copying a file.
pub async fn copy_directory(
    templates: &TemplateCache,
    from: &Path,
    to: &Path,
    data: &Value,
) -> FilesResult<Vec<PathBuf>> {
    if !from.is_dir() {
        return Err(FilesError::NotFound(from.to_path_buf()));
    }

    let root = from.to_path_buf();
    let entries = tokio::task::spawn_blocking(move || walk_tree(&root))
        .await
        .map_err(|e| FilesError::io(from, std::io::Error::other(e)))??;

    let mut written = Vec::new();
    for (relative, is_dir) in entries {
        let dest = to.join(&relative);
        if is_dir {
            tokio::fs::create_dir_all(&dest)
                .await
                .map_err(|e| FilesError::io(&dest, e))?;
        } else {
            written.push(copy_file(templates, &from.join(&relative), &dest, data).await?);
        }
    }

    written.sort();
    Ok(written)
}

/// Returns true if `path` is missing or an empty directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub async fn is_empty_dir(path: &Path) -> FilesResult<bool> {
    if !path.exists() {
        return Ok(true);
    }
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| FilesError::io(path, e))?;
    Ok(entries
        .next_entry()
        .await
        .map_err(|e| FilesError::io(path, e))?
        .is_none())
}
