//! Version increments.

use std::fmt;
use std::str::FromStr;

use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};

use crate::{ReleaseError, ReleaseResult};

/// How to move from the current version to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Increment {
    Major,
    Minor,
    Patch,
    Premajor,
    Preminor,
    Prepatch,
    Prerelease,
}

impl Increment {
    fn as_str(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
            Self::Premajor => "premajor",
            Self::Preminor => "preminor",
            Self::Prepatch => "prepatch",
            Self::Prerelease => "prerelease",
        }
    }
}

impl FromStr for Increment {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            "premajor" => Ok(Self::Premajor),
            "preminor" => Ok(Self::Preminor),
            "prepatch" => Ok(Self::Prepatch),
            "prerelease" => Ok(Self::Prerelease),
            other => Err(ReleaseError::UnknownIncrement(other.to_string())),
        }
    }
}

impl fmt::Display for Increment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a version, accepting a leading `v`.
///
/// # Errors
///
/// Returns [`ReleaseError::InvalidVersion`] if the string is not semver.
pub fn parse_version(version: &str) -> ReleaseResult<Version> {
    let trimmed = version.trim();
    Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed)).map_err(|source| {
        ReleaseError::InvalidVersion {
            version: version.to_string(),
            source,
        }
    })
}

/// Applies `increment` to `version`. Pre-releases use `preid` as their
/// first identifier (`1.3.0-beta.0`).
///
/// # Errors
///
/// Returns [`ReleaseError::InvalidVersion`] when `preid` does not form a
/// valid pre-release.
pub fn bump(version: &Version, increment: Increment, preid: &str) -> ReleaseResult<Version> {
    let mut next = version.clone();
    next.build = BuildMetadata::EMPTY;
    next.pre = Prerelease::EMPTY;

    match increment {
        Increment::Major | Increment::Premajor => {
            next.major += 1;
            next.minor = 0;
            next.patch = 0;
        }
        Increment::Minor | Increment::Preminor => {
            next.minor += 1;
            next.patch = 0;
        }
        Increment::Patch | Increment::Prepatch => {
            next.patch += 1;
        }
        Increment::Prerelease => {
            if version.pre.is_empty() {
                next.patch += 1;
            } else {
                next.pre = next_prerelease(&version.pre)?;
                return Ok(next);
            }
        }
    }

    if matches!(
        increment,
        Increment::Premajor | Increment::Preminor | Increment::Prepatch | Increment::Prerelease
    ) {
        next.pre = prerelease(&format!("{preid}.0"))?;
    }
    Ok(next)
}

fn next_prerelease(pre: &Prerelease) -> ReleaseResult<Prerelease> {
    let mut parts: Vec<String> = pre.as_str().split('.').map(String::from).collect();
    match parts.last().and_then(|last| last.parse::<u64>().ok()) {
        Some(n) => {
            if let Some(last) = parts.last_mut() {
                *last = (n + 1).to_string();
            }
        }
        None => parts.push("0".to_string()),
    }
    prerelease(&parts.join("."))
}

fn prerelease(value: &str) -> ReleaseResult<Prerelease> {
    Prerelease::new(value).map_err(|source| ReleaseError::InvalidVersion {
        version: value.to_string(),
        source,
    })
}
