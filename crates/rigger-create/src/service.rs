//! The project generator.

use std::collections::HashSet;
use std::path::PathBuf;

use rigger_config::{ConfigManager, ConfigMode};
use rigger_pluggable::{
    ApplyPluginsOptions, ApplyPluginsType, Pluggable, PluginDeclaration, PluginRegistry, Stage,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::api::{PATHS_PROP, hooks};
use crate::{
    Answers, AppData, CreateResult, GenerateContext, NonInteractivePrompter, Paths, Prompter,
    Question,
};

/// Inputs of a [`GenerateService`].
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub cwd: PathBuf,
    /// Name of the project; the target directory is `cwd/name`.
    pub name: String,
    /// Template directory, relative to `cwd` unless absolute.
    pub template: Option<PathBuf>,
    /// Answers supplied up front.
    pub args: Answers,
    pub presets: Vec<PluginDeclaration>,
    pub plugins: Vec<PluginDeclaration>,
    /// Config overlay mode. Falls back to `RIGGER_ENV`.
    pub mode: Option<ConfigMode>,
}

impl GenerateOptions {
    pub fn new(cwd: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            cwd: cwd.into(),
            name: name.into(),
            template: None,
            args: Answers::new(),
            presets: Vec::new(),
            plugins: Vec::new(),
            mode: None,
        }
    }

    #[must_use]
    pub fn template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }

    #[must_use]
    pub fn args(mut self, args: Answers) -> Self {
        self.args = args;
        self
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
    pub fn mode(mut self, mode: ConfigMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Generates a project through the plugin hooks.
///
/// Like every service, it runs once.
pub struct GenerateService {
    pluggable: Pluggable,
    presets: Vec<PluginDeclaration>,
    plugins: Vec<PluginDeclaration>,
    prompter: Box<dyn Prompter>,
    context: GenerateContext,
}

impl GenerateService {
    /// Loads the user configuration under `options.cwd` and prepares the
    /// runtime. Answers come from [`NonInteractivePrompter`] unless
    /// [`GenerateService::with_prompter`] says otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or its
    /// `presets` or `plugins` entries are malformed.
    pub fn new(options: GenerateOptions, registry: PluginRegistry) -> CreateResult<Self> {
        let GenerateOptions {
            cwd,
            name,
            template,
            args,
            mut presets,
            mut plugins,
            mode,
        } = options;

        let loaded = ConfigManager::new(&cwd)
            .with_mode(mode)
            .with_env_mode()?
            .load()?
            .unwrap_or_default();
        presets.extend(loaded.get::<Vec<PluginDeclaration>>("presets")?.unwrap_or_default());
        plugins.extend(loaded.get::<Vec<PluginDeclaration>>("plugins")?.unwrap_or_default());

        let paths = Paths {
            target: cwd.join(&name),
            template: template.map(|t| cwd.join(t)),
            cwd: cwd.clone(),
        };
        debug!(?paths, "generator paths");

        let mut pluggable =
            Pluggable::new(cwd, registry).with_user_config(loaded.to_json()?);
        pluggable.set_prop(PATHS_PROP, serde_json::to_value(&paths)?);

        Ok(Self {
            pluggable,
            presets,
            plugins,
            prompter: Box::new(NonInteractivePrompter),
            context: GenerateContext {
                paths,
                app_data: AppData {
                    name,
                    cli_version: env!("CARGO_PKG_VERSION").to_string(),
                    ..AppData::default()
                },
                args,
                prompts: Answers::new(),
            },
        })
    }

    /// Replaces the prompter.
    #[must_use]
    pub fn with_prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Box::new(prompter);
        self
    }

    #[must_use]
    pub fn pluggable(&self) -> &Pluggable {
        &self.pluggable
    }

    #[must_use]
    pub fn context(&self) -> &GenerateContext {
        &self.context
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.pluggable.stage()
    }

    /// Resolves the plugins, prompts and generates the files.
    ///
    /// # Errors
    ///
    /// Returns the first resolution, validation, prompt or hook error;
    /// later phases do not run and written files stay in place.
    pub async fn run(&mut self) -> CreateResult<GenerateContext> {
        let presets = std::mem::take(&mut self.presets);
        let plugins = std::mem::take(&mut self.plugins);
        self.pluggable.init(presets, plugins)?;
        self.pluggable.validate_config()?;

        self.pluggable.transition(Stage::Prompting)?;
        self.context.paths = self.modify(hooks::MODIFY_PATHS, &self.context.paths).await?;
        self.context.app_data = self
            .modify(hooks::MODIFY_APP_DATA, &self.context.app_data)
            .await?;

        let questions = self.questions().await?;
        let answers = self.prompter.prompt(&questions, &self.context.args).await?;
        self.context.prompts = answers;
        self.context.prompts = self
            .modify(hooks::MODIFY_PROMPTS, &self.context.prompts)
            .await?;

        self.pluggable.transition(Stage::Running)?;
        self.event(hooks::ON_BEFORE_GENERATE_FILES).await?;
        self.event(hooks::ON_GENERATE_FILES).await?;

        self.event(hooks::ON_GENERATE_DONE).await?;
        self.pluggable.transition(Stage::Done)?;
        info!(dir = %self.context.paths.target.display(), "project generated");

        Ok(self.context.clone())
    }

    /// Collects the questions, keeping the first one of each name.
    async fn questions(&self) -> CreateResult<Vec<Question>> {
        let options = self.options(hooks::ADD_QUESTIONS, ApplyPluginsType::Add)?;
        let questions: Vec<Question> = self.pluggable.apply_plugins_as(options).await?;

        let mut seen = HashSet::new();
        Ok(questions
            .into_iter()
            .filter(|q| {
                let first = seen.insert(q.name.clone());
                if !first {
                    warn!(name = %q.name, "duplicate question ignored");
                }
                first
            })
            .collect())
    }

    fn options(&self, key: &str, kind: ApplyPluginsType) -> CreateResult<ApplyPluginsOptions> {
        Ok(ApplyPluginsOptions::new(key, kind).args(serde_json::to_value(&self.context)?))
    }

    async fn modify<T: Serialize + DeserializeOwned>(&self, key: &str, value: &T) -> CreateResult<T> {
        let options = self
            .options(key, ApplyPluginsType::Modify)?
            .initial_value(serde_json::to_value(value)?);
        Ok(self.pluggable.apply_plugins_as(options).await?)
    }

    async fn event(&self, key: &str) -> CreateResult<()> {
        let options = self.options(key, ApplyPluginsType::Event)?;
        self.pluggable.apply_plugins(options).await?;
        Ok(())
    }
}

impl std::fmt::Debug for GenerateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerateService")
            .field("pluggable", &self.pluggable)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
