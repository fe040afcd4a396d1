//! Configuration discovery and layering.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use toml::Table;
use tracing::debug;

use crate::{ConfigError, ConfigResult, deep_merge};

/// Default configuration file names, in lookup order.
pub const CONFIG_FILE_NAMES: &[&str] = &["rigger.toml", ".riggerrc.toml"];

/// Environment variable selecting the configuration mode.
pub const MODE_ENV_VAR: &str = "RIGGER_ENV";

/// Selects the `<stem>.<mode>.toml` overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    Dev,
    Prod,
    Test,
}

impl ConfigMode {
    /// Parses an optional mode value, as read from [`MODE_ENV_VAR`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMode`] for values other than `dev`,
    /// `prod` and `test`.
    pub fn from_env_value(value: Option<&str>) -> ConfigResult<Option<Self>> {
        match value.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => value.parse().map(Some),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
            Self::Test => "test",
        }
    }
}

impl FromStr for ConfigMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for ConfigMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The merged configuration and the files it came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: Table,
    /// Files that contributed, in merge order.
    pub files: Vec<PathBuf>,
}

impl LoadedConfig {
    /// Decodes the value under `key`, `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the value does not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<Option<T>> {
        self.config
            .get(key)
            .map(|value| {
                value.clone().try_into().map_err(|e: toml::de::Error| ConfigError::Invalid {
                    key: key.to_string(),
                    reason: e.message().to_string(),
                })
            })
            .transpose()
    }

    /// Returns the configuration as JSON, the shape plugins receive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a value has no JSON form.
    pub fn to_json(&self) -> ConfigResult<serde_json::Value> {
        serde_json::to_value(&self.config).map_err(|e| ConfigError::Invalid {
            key: "<root>".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Locates and loads layered configuration for a project directory.
///
/// Given `rigger.toml`, the files merged are `rigger.toml`, then
/// `rigger.<mode>.toml`, then `rigger.local.toml`, whichever exist.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    cwd: PathBuf,
    default_files: Vec<String>,
    mode: Option<ConfigMode>,
}

impl ConfigManager {
    /// Creates a manager looking for [`CONFIG_FILE_NAMES`] in `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            default_files: CONFIG_FILE_NAMES.iter().map(ToString::to_string).collect(),
            mode: None,
        }
    }

    /// Replaces the candidate file names.
    #[must_use]
    pub fn with_default_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the mode overlay.
    #[must_use]
    pub fn with_mode(mut self, mode: Option<ConfigMode>) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the mode from [`MODE_ENV_VAR`] unless one was set explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMode`] for an unknown value.
    pub fn with_env_mode(mut self) -> ConfigResult<Self> {
        if self.mode.is_none() {
            let value = std::env::var(MODE_ENV_VAR).ok();
            self.mode = ConfigMode::from_env_value(value.as_deref())?;
        }
        Ok(self)
    }

    /// Returns the first candidate file that exists.
    #[must_use]
    pub fn config_file(&self) -> Option<PathBuf> {
        self.default_files
            .iter()
            .map(|name| self.cwd.join(name))
            .find(|path| path.is_file())
    }

    /// Returns every existing file layered on top of `main`, `main` first.
    #[must_use]
    pub fn config_files(&self, main: &Path) -> Vec<PathBuf> {
        let mut files = vec![main.to_path_buf()];

        let (Some(parent), Some(stem), Some(ext)) = (
            main.parent(),
            main.file_stem().and_then(|s| s.to_str()),
            main.extension().and_then(|s| s.to_str()),
        ) else {
            return files;
        };

        let mut suffixes = Vec::with_capacity(2);
        if let Some(mode) = self.mode {
            suffixes.push(mode.as_str());
        }
        suffixes.push("local");

        files.extend(
            suffixes
                .into_iter()
                .map(|suffix| parent.join(format!("{stem}.{suffix}.{ext}")))
                .filter(|path| path.is_file()),
        );
        files
    }

    /// Loads and merges the configuration. `None` when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed.
    pub fn load(&self) -> ConfigResult<Option<LoadedConfig>> {
        let Some(main) = self.config_file() else {
            debug!(cwd = %self.cwd.display(), "no configuration file");
            return Ok(None);
        };

        let files = self.config_files(&main);
        let mut config = Table::new();
        for file in &files {
            debug!(path = %file.display(), "loading configuration");
            let content = std::fs::read_to_string(file)?;
            let table: Table = toml::from_str(&content).map_err(|source| ConfigError::InvalidToml {
                path: file.clone(),
                source,
            })?;
            deep_merge(&mut config, table);
        }

        Ok(Some(LoadedConfig { config, files }))
    }
}
