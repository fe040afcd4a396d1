//! Built-in plugins and presets.

use rigger_pluggable::{FnPlugin, PluginApi, PluginRegistry, PluginReturn};
use rigger_plugin_bump::BumpPlugin;
use rigger_plugin_files::FilesPlugin;
use rigger_plugin_git::GitPlugin;
use serde_json::Value;

pub const PLUGIN_FILES: &str = "rigger-plugin-files";
pub const PLUGIN_GIT: &str = "rigger-plugin-git";
pub const PLUGIN_BUMP: &str = "rigger-plugin-bump";

/// Preset every `rigger create` run starts from.
pub const PRESET_CREATE: &str = "rigger-preset-create";
/// Preset every `rigger release` run starts from.
pub const PRESET_RELEASE: &str = "rigger-preset-release";

/// Returns a registry holding the built-in plugins and presets.
pub fn registry() -> PluginRegistry {
    PluginRegistry::new()
        .with(PLUGIN_FILES, FilesPlugin::new())
        .with(PLUGIN_GIT, GitPlugin::new())
        .with(PLUGIN_BUMP, BumpPlugin::new())
        .with(
            PRESET_CREATE,
            FnPlugin::new(PRESET_CREATE, |_api: &mut PluginApi<'_>, _options: &Value| {
                Ok(Some(PluginReturn::new().plugin(PLUGIN_FILES)))
            }),
        )
        .with(
            PRESET_RELEASE,
            FnPlugin::new(PRESET_RELEASE, |_api: &mut PluginApi<'_>, _options: &Value| {
                Ok(Some(PluginReturn::new().plugin(PLUGIN_GIT).plugin(PLUGIN_BUMP)))
            }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contents() {
        let registry = registry();
        for id in [PLUGIN_FILES, PLUGIN_GIT, PLUGIN_BUMP, PRESET_CREATE, PRESET_RELEASE] {
            assert!(registry.get(id).is_some(), "{id} is not registered");
        }
    }
}
