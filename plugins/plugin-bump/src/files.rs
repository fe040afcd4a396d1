//! Version file readers and updaters.
//!
//! Supported formats:
//! - `*.toml` (first `version = "..."` line, formatting preserved)
//! - `*.json` (top-level `version` field)
//! - anything else, e.g. `VERSION` (first semver-looking token)

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use thiserror::Error;

static TOML_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^(\s*version\s*=\s*)"([^"]+)""#).expect("invalid regex")
});

static PLAIN_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?")
        .expect("invalid regex")
});

/// Errors that can occur when reading or updating version files.
#[derive(Debug, Error)]
pub enum FileUpdateError {
    /// File not found.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Failed to read or write the file.
    #[error("failed to access file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the file.
    #[error("failed to parse {file}: {reason}")]
    Parse { file: String, reason: String },

    /// The file has no version.
    #[error("version not found in {0}")]
    VersionNotFound(String),
}

/// Result type for file operations.
pub type FileResult<T> = Result<T, FileUpdateError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
    Plain,
}

fn format_of(path: &Path) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Format::Toml,
        Some("json") => Format::Json,
        _ => Format::Plain,
    }
}

fn read(path: &Path) -> FileResult<String> {
    if !path.is_file() {
        return Err(FileUpdateError::NotFound(path.display().to_string()));
    }
    Ok(fs::read_to_string(path)?)
}

fn parse_version(path: &Path, version: &str) -> FileResult<Version> {
    Version::parse(version).map_err(|e| FileUpdateError::Parse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Writes `new_version` into `path`. Nothing is written when `dry_run`.
///
/// # Errors
///
/// Returns an error if the file does not exist, has no version field or
/// cannot be read or written.
pub fn update_version_file(path: &Path, new_version: &Version, dry_run: bool) -> FileResult<()> {
    let content = read(path)?;
    let updated = match format_of(path) {
        Format::Toml => update_toml(path, &content, new_version)?,
        Format::Json => update_json(path, &content, new_version)?,
        Format::Plain => update_plain(path, &content, new_version)?,
    };

    if !dry_run {
        fs::write(path, updated)?;
    }
    Ok(())
}

/// Reads the version stored in `path`.
///
/// # Errors
///
/// Returns an error if the file does not exist, has no version field or
/// the version is not valid semver.
pub fn read_version_from_file(path: &Path) -> FileResult<Version> {
    let content = read(path)?;
    let not_found = || FileUpdateError::VersionNotFound(path.display().to_string());

    let version = match format_of(path) {
        Format::Toml => TOML_VERSION_RE
            .captures(&content)
            .and_then(|c| c.get(2))
            .map(|m| m.as_str().to_string())
            .ok_or_else(not_found)?,
        Format::Json => json_object(path, &content)?
            .get("version")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(not_found)?,
        Format::Plain => PLAIN_VERSION_RE
            .find(&content)
            .map(|m| m.as_str().to_string())
            .ok_or_else(not_found)?,
    };

    parse_version(path, &version)
}

fn update_toml(path: &Path, content: &str, new_version: &Version) -> FileResult<String> {
    if !TOML_VERSION_RE.is_match(content) {
        return Err(FileUpdateError::VersionNotFound(path.display().to_string()));
    }

    Ok(TOML_VERSION_RE
        .replace(content, format!(r#"${{1}}"{new_version}""#))
        .into_owned())
}

fn json_object(path: &Path, content: &str) -> FileResult<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str(content) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(FileUpdateError::Parse {
            file: path.display().to_string(),
            reason: "not a JSON object".to_string(),
        }),
        Err(e) => Err(FileUpdateError::Parse {
            file: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

fn update_json(path: &Path, content: &str, new_version: &Version) -> FileResult<String> {
    let mut json = json_object(path, content)?;
    if !json.contains_key("version") {
        return Err(FileUpdateError::VersionNotFound(path.display().to_string()));
    }
    json.insert(
        "version".to_string(),
        serde_json::Value::String(new_version.to_string()),
    );

    let pretty = serde_json::to_string_pretty(&json).map_err(|e| FileUpdateError::Parse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(format!("{pretty}\n"))
}

fn update_plain(path: &Path, content: &str, new_version: &Version) -> FileResult<String> {
    if !PLAIN_VERSION_RE.is_match(content) {
        return Err(FileUpdateError::VersionNotFound(path.display().to_string()));
    }
    Ok(PLAIN_VERSION_RE
        .replace(content, new_version.to_string().as_str())
        .into_owned())
}
