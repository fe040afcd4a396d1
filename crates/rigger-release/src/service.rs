//! The release pipeline.

use std::path::PathBuf;

use rigger_config::{ConfigManager, ConfigMode};
use rigger_pluggable::{
    ApplyPluginsOptions, ApplyPluginsType, Pluggable, PluginDeclaration, PluginRegistry, Stage,
};
use semver::Version;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::api::{CONFIG_PROP, hooks};
use crate::{
    AppData, Increment, ReleaseConfig, ReleaseContext, ReleaseError, ReleaseFlags, ReleaseResult,
    bump, parse_version,
};

/// Top-level config key holding [`ReleaseConfig`].
pub const CONFIG_KEY: &str = "release";

/// Inputs of a [`ReleaseService`].
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    pub cwd: PathBuf,
    pub presets: Vec<PluginDeclaration>,
    pub plugins: Vec<PluginDeclaration>,
    pub flags: ReleaseFlags,
    /// Config overlay mode. Falls back to `RIGGER_ENV`.
    pub mode: Option<ConfigMode>,
}

impl ReleaseOptions {
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            presets: Vec::new(),
            plugins: Vec::new(),
            flags: ReleaseFlags::default(),
            mode: None,
        }
    }

    #[must_use]
    pub fn preset(mut self, declaration: impl Into<PluginDeclaration>) -> Self {
        self.presets.push(declaration.into());
        self
    }

    #[must_use]
    pub fn plugin(mut self, declaration: impl Into<PluginDeclaration>) -> Self {
        self.plugins.push(declaration.into());
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: ReleaseFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: ConfigMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// What a finished release produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// Version before the release, `0.0.0` when none was known.
    pub current_version: Version,
    pub next_version: Version,
    /// `None` when the version was given explicitly.
    pub increment: Option<Increment>,
    pub changelog: Option<String>,
    pub dry_run: bool,
}

/// Runs a release through the plugin hooks.
///
/// A service runs once; calling [`ReleaseService::run`] again fails with an
/// illegal lifecycle transition.
pub struct ReleaseService {
    pluggable: Pluggable,
    presets: Vec<PluginDeclaration>,
    plugins: Vec<PluginDeclaration>,
    context: ReleaseContext,
}

impl ReleaseService {
    /// Loads the user configuration under `options.cwd` and prepares the
    /// runtime. Plugins are not resolved until [`ReleaseService::run`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or its
    /// `release`, `presets` or `plugins` entries are malformed.
    pub fn new(options: ReleaseOptions, registry: PluginRegistry) -> ReleaseResult<Self> {
        let ReleaseOptions {
            cwd,
            mut presets,
            mut plugins,
            flags,
            mode,
        } = options;

        let loaded = ConfigManager::new(&cwd)
            .with_mode(mode)
            .with_env_mode()?
            .load()?
            .unwrap_or_default();
        presets.extend(loaded.get::<Vec<PluginDeclaration>>("presets")?.unwrap_or_default());
        plugins.extend(loaded.get::<Vec<PluginDeclaration>>("plugins")?.unwrap_or_default());

        let mut config: ReleaseConfig = loaded.get(CONFIG_KEY)?.unwrap_or_default();
        flags.apply(&mut config);
        debug!(?config, files = loaded.files.len(), "release configuration");

        let mut pluggable = Pluggable::new(cwd.clone(), registry)
            .with_user_config(loaded.to_json()?)
            .with_config_keys([CONFIG_KEY]);
        pluggable.set_prop(CONFIG_PROP, serde_json::to_value(&config)?);

        Ok(Self {
            pluggable,
            presets,
            plugins,
            context: ReleaseContext {
                config,
                app_data: AppData {
                    cwd,
                    ..AppData::default()
                },
                current_version: None,
                increment: None,
                next_version: None,
                changelog: None,
            },
        })
    }

    #[must_use]
    pub fn pluggable(&self) -> &Pluggable {
        &self.pluggable
    }

    /// Returns the data hooks see, as far as the release got.
    #[must_use]
    pub fn context(&self) -> &ReleaseContext {
        &self.context
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.pluggable.stage()
    }

    /// Resolves the plugins and runs every release phase.
    ///
    /// # Errors
    ///
    /// Returns the first resolution, validation or hook error; later phases
    /// do not run.
    pub async fn run(&mut self) -> ReleaseResult<ReleaseOutcome> {
        let presets = std::mem::take(&mut self.presets);
        let plugins = std::mem::take(&mut self.plugins);
        self.pluggable.init(presets, plugins)?;
        self.pluggable.validate_config()?;

        self.pluggable.transition(Stage::Prompting)?;
        self.context.config = self.modify(hooks::MODIFY_CONFIG, &self.context.config).await?;
        self.context.app_data = self
            .modify(hooks::MODIFY_APP_DATA, &self.context.app_data)
            .await?;
        self.context.current_version = self.context.app_data.version.clone();

        self.pluggable.transition(Stage::Running)?;
        self.event(hooks::ON_START).await?;
        if self.context.config.git_checks {
            self.event(hooks::ON_CHECK).await?;
        } else {
            debug!("git checks disabled");
        }

        let current = match &self.context.current_version {
            Some(version) => parse_version(version)?,
            None => Version::new(0, 0, 0),
        };
        let next = self.next_version(&current).await?;
        self.context.next_version = Some(next.to_string());
        info!(from = %current, to = %next, "next version");

        self.context.changelog = self.get(hooks::GET_CHANGELOG).await?;

        for key in [
            hooks::ON_BEFORE_BUMP_VERSION,
            hooks::ON_BUMP_VERSION,
            hooks::ON_BEFORE_RELEASE,
            hooks::ON_RELEASE,
        ] {
            self.event(key).await?;
        }

        self.event(hooks::ON_END).await?;
        self.pluggable.transition(Stage::Done)?;
        info!(version = %next, dry_run = self.context.config.dry_run, "release finished");

        Ok(ReleaseOutcome {
            current_version: current,
            next_version: next,
            increment: self.context.increment,
            changelog: self.context.changelog.clone(),
            dry_run: self.context.config.dry_run,
        })
    }

    async fn next_version(&mut self, current: &Version) -> ReleaseResult<Version> {
        let next = if let Some(target) = &self.context.config.target_version {
            debug!(%target, "using target version");
            parse_version(target)?
        } else {
            let increment = match self.get::<Increment>(hooks::GET_INCREMENT).await? {
                Some(increment) => increment,
                None => {
                    info!("no plugin proposed an increment, using patch");
                    Increment::Patch
                }
            };
            self.context.increment = Some(increment);
            bump(current, increment, &self.context.config.preid)?
        };

        if self.context.current_version.is_some() && next <= *current {
            return Err(ReleaseError::NotIncreasing {
                current: current.to_string(),
                next: next.to_string(),
            });
        }
        Ok(next)
    }

    fn options(&self, key: &str, kind: ApplyPluginsType) -> ReleaseResult<ApplyPluginsOptions> {
        Ok(ApplyPluginsOptions::new(key, kind).args(serde_json::to_value(&self.context)?))
    }

    async fn modify<T: Serialize + DeserializeOwned>(&self, key: &str, value: &T) -> ReleaseResult<T> {
        let options = self
            .options(key, ApplyPluginsType::Modify)?
            .initial_value(serde_json::to_value(value)?);
        Ok(self.pluggable.apply_plugins_as(options).await?)
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> ReleaseResult<Option<T>> {
        let options = self.options(key, ApplyPluginsType::Get)?;
        Ok(self.pluggable.apply_plugins_as(options).await?)
    }

    async fn event(&self, key: &str) -> ReleaseResult<()> {
        let options = self.options(key, ApplyPluginsType::Event)?;
        self.pluggable.apply_plugins(options).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ReleaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseService")
            .field("pluggable", &self.pluggable)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
