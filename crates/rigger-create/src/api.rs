//! Generator-specific registration helpers on top of [`PluginApi`].

use std::future::Future;

use rigger_pluggable::{BoxError, HookBuilder, PluggableError, PluggableResult, PluginApi, typed};

use crate::{Answers, AppData, GenerateContext, Paths, Question};

/// Hook keys applied by [`crate::GenerateService`].
pub mod hooks {
    pub const MODIFY_PATHS: &str = "modifyPaths";
    pub const MODIFY_APP_DATA: &str = "modifyAppData";
    pub const ADD_QUESTIONS: &str = "addQuestions";
    pub const MODIFY_PROMPTS: &str = "modifyPrompts";
    pub const ON_BEFORE_GENERATE_FILES: &str = "onBeforeGenerateFiles";
    pub const ON_GENERATE_FILES: &str = "onGenerateFiles";
    pub const ON_GENERATE_DONE: &str = "onGenerateDone";
}

/// Property holding the initial [`Paths`] while plugins apply.
pub const PATHS_PROP: &str = "paths";

/// Typed generator hooks for plugins.
pub trait GenerateApi {
    /// Adjusts the generator paths (Modify).
    ///
    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn modify_paths<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(Paths, GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Paths, BoxError>> + Send + 'static;

    /// Adjusts the app data (Modify).
    ///
    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn modify_app_data<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(AppData, GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AppData, BoxError>> + Send + 'static;

    /// Contributes questions (Add).
    ///
    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn add_questions<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Question>, BoxError>> + Send + 'static;

    /// Adjusts the answers after prompting (Modify).
    ///
    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn modify_prompts<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(Answers, GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Answers, BoxError>> + Send + 'static;

    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn on_before_generate_files<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static;

    /// Writes the project files (Event).
    ///
    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn on_generate_files<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static;

    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn on_generate_done<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static;

    /// Returns the paths as known when plugins apply, before any
    /// `modifyPaths` hook ran.
    ///
    /// # Errors
    ///
    /// Returns an error outside of a generator run.
    fn paths(&self) -> PluggableResult<Paths>;
}

fn event<F, Fut>(api: &mut PluginApi<'_>, key: &str, handler: F) -> PluggableResult<()>
where
    F: Fn(GenerateContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    api.register(HookBuilder::new().key(key).boxed_handler(typed::event(handler)))
}

impl GenerateApi for PluginApi<'_> {
    fn modify_paths<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(Paths, GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Paths, BoxError>> + Send + 'static,
    {
        self.register(
            HookBuilder::new()
                .key(hooks::MODIFY_PATHS)
                .boxed_handler(typed::modify(handler)),
        )
    }

    fn modify_app_data<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(AppData, GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AppData, BoxError>> + Send + 'static,
    {
        self.register(
            HookBuilder::new()
                .key(hooks::MODIFY_APP_DATA)
                .boxed_handler(typed::modify(handler)),
        )
    }

    fn add_questions<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Question>, BoxError>> + Send + 'static,
    {
        self.register(
            HookBuilder::new()
                .key(hooks::ADD_QUESTIONS)
                .boxed_handler(typed::add(handler)),
        )
    }

    fn modify_prompts<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(Answers, GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Answers, BoxError>> + Send + 'static,
    {
        self.register(
            HookBuilder::new()
                .key(hooks::MODIFY_PROMPTS)
                .boxed_handler(typed::modify(handler)),
        )
    }

    fn on_before_generate_files<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        event(self, hooks::ON_BEFORE_GENERATE_FILES, handler)
    }

    fn on_generate_files<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        event(self, hooks::ON_GENERATE_FILES, handler)
    }

    fn on_generate_done<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(GenerateContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        event(self, hooks::ON_GENERATE_DONE, handler)
    }

    fn paths(&self) -> PluggableResult<Paths> {
        self.prop_as(PATHS_PROP)?.ok_or_else(|| PluggableError::InvalidValue {
            key: PATHS_PROP.to_string(),
            reason: "not running under the generator".to_string(),
        })
    }
}
