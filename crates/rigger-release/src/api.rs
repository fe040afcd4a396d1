//! Release-specific registration helpers on top of [`PluginApi`].

use std::future::Future;

use rigger_pluggable::{BoxError, HookBuilder, PluggableResult, PluginApi, typed};

use crate::{Increment, ReleaseConfig, ReleaseContext};

/// Hook keys applied by [`crate::ReleaseService`].
pub mod hooks {
    pub const MODIFY_CONFIG: &str = "modifyConfig";
    pub const MODIFY_APP_DATA: &str = "modifyAppData";
    pub const ON_START: &str = "onStart";
    pub const ON_CHECK: &str = "onCheck";
    pub const GET_INCREMENT: &str = "getIncrement";
    pub const GET_CHANGELOG: &str = "getChangelog";
    pub const ON_BEFORE_BUMP_VERSION: &str = "onBeforeBumpVersion";
    pub const ON_BUMP_VERSION: &str = "onBumpVersion";
    pub const ON_BEFORE_RELEASE: &str = "onBeforeRelease";
    pub const ON_RELEASE: &str = "onRelease";
    pub const ON_END: &str = "onEnd";
}

/// Property holding the effective [`ReleaseConfig`] while plugins apply.
pub const CONFIG_PROP: &str = "releaseConfig";

/// Typed release hooks for plugins.
///
/// ```ignore
/// fn apply(&self, api: &mut PluginApi<'_>, _: &Value) -> Result<Option<PluginReturn>, BoxError> {
///     api.get_increment(|ctx| async move { Ok(Some(Increment::Minor)) })?;
///     Ok(None)
/// }
/// ```
pub trait ReleaseApi {
    /// Adjusts the release configuration (Modify).
    ///
    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn modify_config<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseConfig, ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReleaseConfig, BoxError>> + Send + 'static;

    /// Adjusts the app data (Modify).
    ///
    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn modify_app_data<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(crate::AppData, ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<crate::AppData, BoxError>> + Send + 'static;

    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn on_start<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static;

    /// Pre-release checks, run only when `gitChecks` is on.
    ///
    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn on_check<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static;

    /// Proposes the increment (Get). The first answer wins.
    ///
    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn get_increment<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Increment>, BoxError>> + Send + 'static;

    /// Produces the changelog for the release (Get).
    ///
    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn get_changelog<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<String>, BoxError>> + Send + 'static;

    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn on_before_bump_version<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static;

    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn on_bump_version<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static;

    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn on_before_release<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static;

    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn on_release<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static;

    /// # Errors
    ///
    /// Returns a registration error from [`PluginApi::register`].
    fn on_end<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static;

    /// Returns the release configuration as known when plugins apply,
    /// before any `modifyConfig` hook ran.
    ///
    /// # Errors
    ///
    /// Returns an error if the injected property does not decode.
    fn release_config(&self) -> PluggableResult<ReleaseConfig>;
}

fn event<F, Fut>(api: &mut PluginApi<'_>, key: &str, handler: F) -> PluggableResult<()>
where
    F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    api.register(HookBuilder::new().key(key).boxed_handler(typed::event(handler)))
}

impl ReleaseApi for PluginApi<'_> {
    fn modify_config<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseConfig, ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReleaseConfig, BoxError>> + Send + 'static,
    {
        self.register(
            HookBuilder::new()
                .key(hooks::MODIFY_CONFIG)
                .boxed_handler(typed::modify(handler)),
        )
    }

    fn modify_app_data<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(crate::AppData, ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<crate::AppData, BoxError>> + Send + 'static,
    {
        self.register(
            HookBuilder::new()
                .key(hooks::MODIFY_APP_DATA)
                .boxed_handler(typed::modify(handler)),
        )
    }

    fn on_start<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        event(self, hooks::ON_START, handler)
    }

    fn on_check<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        event(self, hooks::ON_CHECK, handler)
    }

    fn get_increment<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Increment>, BoxError>> + Send + 'static,
    {
        self.register(
            HookBuilder::new()
                .key(hooks::GET_INCREMENT)
                .boxed_handler(typed::get(handler)),
        )
    }

    fn get_changelog<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<String>, BoxError>> + Send + 'static,
    {
        self.register(
            HookBuilder::new()
                .key(hooks::GET_CHANGELOG)
                .boxed_handler(typed::get(handler)),
        )
    }

    fn on_before_bump_version<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        event(self, hooks::ON_BEFORE_BUMP_VERSION, handler)
    }

    fn on_bump_version<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        event(self, hooks::ON_BUMP_VERSION, handler)
    }

    fn on_before_release<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        event(self, hooks::ON_BEFORE_RELEASE, handler)
    }

    fn on_release<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        event(self, hooks::ON_RELEASE, handler)
    }

    fn on_end<F, Fut>(&mut self, handler: F) -> PluggableResult<()>
    where
        F: Fn(ReleaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        event(self, hooks::ON_END, handler)
    }

    fn release_config(&self) -> PluggableResult<ReleaseConfig> {
        Ok(self.prop_as(CONFIG_PROP)?.unwrap_or_default())
    }
}
