//! Files plugin for the generator.
//!
//! Asks for a description and a license, then copies the template
//! directory into the new project, rendering `*.tpl` files with the
//! template data. Other plugins reach the same machinery through methods:
//!
//! | method          | arguments                          | returns        |
//! |-----------------|------------------------------------|----------------|
//! | `copyFile`      | `{ from, to, data? }`              | written path   |
//! | `copyDirectory` | `{ from, to, data? }`              | written paths  |
//! | `writeFile`     | `{ path, content }`                | written path   |
//! | `render`        | `{ template, data? }`              | rendered text  |
//! | `resolve`       | `[segment, ...]`                   | absolute path  |
//!
//! Relative paths resolve against the working directory.

mod copy;
mod error;
mod template;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rigger_cache::CacheOptions;
use rigger_create::{GenerateApi, GenerateContext, Question};
use rigger_pluggable::{BoxError, Plugin, PluginApi, PluginDescriptor, PluginReturn};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

pub use copy::{
    TEMPLATE_SUFFIX, copy_directory, copy_file, is_empty_dir, strip_template_suffix, write_file,
};
pub use error::{FilesError, FilesResult};
pub use template::{Segment, Template, TemplateCache};

/// Licenses offered by the default license question.
pub const LICENSES: &[&str] = &["MIT", "Apache-2.0", "MPL-2.0", "GPL-3.0-only", "UNLICENSED"];

/// Plugin settings, from the declaration options and the `files` config
/// section (the latter wins).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct FilesSettings {
    /// Ask the description and license questions.
    pub questions: bool,
    /// Cache compiled templates.
    pub cache: bool,
    /// Defaults to `~/.rigger-cache`.
    pub cache_dir: Option<PathBuf>,
    /// Allow generating into a non-empty directory.
    pub overwrite: bool,
}

impl Default for FilesSettings {
    fn default() -> Self {
        Self {
            questions: true,
            cache: true,
            cache_dir: None,
            overwrite: false,
        }
    }
}

impl FilesSettings {
    fn from_values(options: &Value, user_config: Option<&Value>) -> Result<Self, serde_json::Error> {
        let value = match user_config {
            Some(config @ Value::Object(_)) => config.clone(),
            _ => options.clone(),
        };
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }

    fn cache_options(&self, cwd: &Path) -> CacheOptions {
        let options = CacheOptions::new().disabled(!self.cache);
        match &self.cache_dir {
            Some(dir) => options.dir(cwd.join(dir)),
            None => options,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CopyArgs {
    from: PathBuf,
    to: PathBuf,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct WriteArgs {
    path: PathBuf,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RenderArgs {
    template: String,
    #[serde(default)]
    data: Value,
}

fn path_value(path: &Path) -> Value {
    Value::String(path.display().to_string())
}

fn default_questions() -> Vec<Question> {
    vec![
        Question::input("description", "Project description").with_default(""),
        Question::select("license", "License", LICENSES.iter().copied()).with_default("MIT"),
    ]
}

/// Copies templates and writes project files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesPlugin;

impl FilesPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FilesPlugin {
    fn register_methods(
        api: &mut PluginApi<'_>,
        templates: &Arc<TemplateCache>,
    ) -> Result<(), BoxError> {
        let cwd: Arc<Path> = api.cwd().into();

        let (base, cache) = (cwd.clone(), templates.clone());
        api.register_method("copyFile", move |args| {
            let (base, cache) = (base.clone(), cache.clone());
            async move {
                let args: CopyArgs = serde_json::from_value(args).map_err(FilesError::from)?;
                let written =
                    copy_file(&cache, &base.join(&args.from), &base.join(&args.to), &args.data)
                        .await?;
                Ok(path_value(&written))
            }
        })?;

        let (base, cache) = (cwd.clone(), templates.clone());
        api.register_method("copyDirectory", move |args| {
            let (base, cache) = (base.clone(), cache.clone());
            async move {
                let args: CopyArgs = serde_json::from_value(args).map_err(FilesError::from)?;
                let written =
                    copy_directory(&cache, &base.join(&args.from), &base.join(&args.to), &args.data)
                        .await?;
                Ok(written.iter().map(|p| path_value(p)).collect())
            }
        })?;

        let base = cwd.clone();
        api.register_method("writeFile", move |args| {
            let base = base.clone();
            async move {
                let args: WriteArgs = serde_json::from_value(args).map_err(FilesError::from)?;
                let path = base.join(&args.path);
                write_file(&path, &args.content).await?;
                Ok(path_value(&path))
            }
        })?;

        let cache = templates.clone();
        api.register_method("render", move |args| {
            let cache = cache.clone();
            async move {
                let args: RenderArgs = serde_json::from_value(args).map_err(FilesError::from)?;
                let template = cache.compile(&args.template).await?;
                Ok(Value::String(template.render(&args.data)))
            }
        })?;

        let base = cwd;
        api.register_method("resolve", move |args| {
            let base = base.clone();
            async move {
                let segments: Vec<PathBuf> =
                    serde_json::from_value(args).map_err(FilesError::from)?;
                let path = segments
                    .iter()
                    .fold(base.to_path_buf(), |path, segment| path.join(segment));
                Ok(path_value(&path))
            }
        })?;

        Ok(())
    }
}

impl Plugin for FilesPlugin {
    fn name(&self) -> &str {
        "files"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Copies the project template and provides file methods"
    }

    fn apply(
        &self,
        api: &mut PluginApi<'_>,
        options: &Value,
    ) -> Result<Option<PluginReturn>, BoxError> {
        api.describe(PluginDescriptor::new().config_validator(|value| {
            serde_json::from_value::<FilesSettings>(value.clone())
                .map(|_| ())
                .map_err(|e| vec![e.to_string()])
        }));

        let settings = FilesSettings::from_values(options, api.user_config())?;
        let templates = Arc::new(TemplateCache::new(settings.cache_options(api.cwd())));
        debug!(?templates, "template cache");

        Self::register_methods(api, &templates)?;

        if settings.questions {
            api.add_questions(|_ctx: GenerateContext| async { Ok(default_questions()) })?;
        }

        let overwrite = settings.overwrite;
        api.on_before_generate_files(move |ctx: GenerateContext| async move {
            let target = &ctx.paths.target;
            if !overwrite && !is_empty_dir(target).await? {
                return Err(FilesError::TargetNotEmpty(target.clone()).into());
            }
            Ok(())
        })?;

        api.on_generate_files(move |ctx: GenerateContext| {
            let templates = templates.clone();
            async move {
                let target = &ctx.paths.target;
                tokio::fs::create_dir_all(target)
                    .await
                    .map_err(|e| FilesError::io(target, e))?;

                let Some(template) = &ctx.paths.template else {
                    debug!("no template, created an empty project directory");
                    return Ok(());
                };
                let written =
                    copy_directory(&templates, template, target, &ctx.template_data()).await?;
                info!(count = written.len(), dir = %target.display(), "generated files");
                Ok(())
            }
        })?;

        api.on_generate_done(|ctx: GenerateContext| async move {
            info!(name = %ctx.app_data.name, dir = %ctx.paths.target.display(), "project ready");
            Ok(())
        })?;

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rigger_create::{Answers, ConfigMode, CreateError, GenerateOptions, GenerateService};
    use rigger_pluggable::{PluggableError, PluginDeclaration, PluginRegistry};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn service(dir: &TempDir, template: Option<&str>, args: Answers) -> GenerateService {
        let declaration = PluginDeclaration::with_options(
            "rigger-plugin-files",
            json!({ "cacheDir": dir.path().join(".cache") }),
        );
        let mut options = GenerateOptions::new(dir.path(), "demo")
            .plugin(declaration)
            .args(args)
            .mode(ConfigMode::Test);
        if let Some(template) = template {
            options = options.template(template);
        }
        GenerateService::new(
            options,
            PluginRegistry::new().with("rigger-plugin-files", FilesPlugin::new()),
        )
        .unwrap()
    }

    fn write_template(dir: &TempDir) {
        let template = dir.path().join("template");
        fs::create_dir_all(template.join("src")).unwrap();
        fs::write(
            template.join("README.md.tpl"),
            "# {{ name }}\n\n{{ description }}\n\nLicense: {{ license }}\n",
        )
        .unwrap();
        fs::write(template.join("src/main.rs"), "fn main() {}\n").unwrap();
    }

    #[test]
    fn test_settings() {
        assert_eq!(
            FilesSettings::from_values(&Value::Null, None).unwrap(),
            FilesSettings::default()
        );
        let settings =
            FilesSettings::from_values(&json!({ "cache": true }), Some(&json!({ "questions": false })))
                .unwrap();
        assert!(!settings.questions);
        assert!(FilesSettings::from_values(&json!({ "cacheDirectory": "x" }), None).is_err());
    }

    #[tokio::test]
    async fn test_generates_project_from_template() {
        let dir = TempDir::new().unwrap();
        write_template(&dir);
        let mut args = Answers::new();
        args.insert("description".to_string(), json!("A demo project"));

        let mut service = service(&dir, Some("template"), args);
        let context = service.run().await.unwrap();

        assert_eq!(context.prompts["license"], json!("MIT"));
        let target = dir.path().join("demo");
        assert_eq!(
            fs::read_to_string(target.join("README.md")).unwrap(),
            "# demo\n\nA demo project\n\nLicense: MIT\n"
        );
        assert_eq!(
            fs::read_to_string(target.join("src/main.rs")).unwrap(),
            "fn main() {}\n"
        );
    }

    #[tokio::test]
    async fn test_refuses_non_empty_target() {
        let dir = TempDir::new().unwrap();
        write_template(&dir);
        fs::create_dir_all(dir.path().join("demo")).unwrap();
        fs::write(dir.path().join("demo/keep.txt"), "mine").unwrap();

        let mut service = service(&dir, Some("template"), Answers::new());
        let err = service.run().await.unwrap_err();
        assert!(matches!(
            err,
            CreateError::Pluggable(PluggableError::HookFailed { ref key, .. })
                if key == "onBeforeGenerateFiles"
        ));
        assert!(!dir.path().join("demo/README.md").exists());
    }

    #[tokio::test]
    async fn test_missing_template_fails() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir, Some("nowhere"), Answers::new());
        let err = service.run().await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_without_template_creates_empty_directory() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir, None, Answers::new());
        service.run().await.unwrap();
        assert!(is_empty_dir(&dir.path().join("demo")).await.unwrap());
        assert!(dir.path().join("demo").is_dir());
    }

    #[tokio::test]
    async fn test_methods() {
        let dir = TempDir::new().unwrap();
        write_template(&dir);
        let mut service = service(&dir, None, Answers::new());
        service.run().await.unwrap();
        let pluggable = service.pluggable();

        let rendered = pluggable
            .call_method("render", json!({ "template": "v{{ v }}", "data": { "v": 2 } }))
            .await
            .unwrap();
        assert_eq!(rendered, json!("v2"));

        let written = pluggable
            .call_method("writeFile", json!({ "path": "demo/notes.txt", "content": "hi" }))
            .await
            .unwrap();
        assert_eq!(written, path_value(&dir.path().join("demo/notes.txt")));
        assert_eq!(fs::read_to_string(dir.path().join("demo/notes.txt")).unwrap(), "hi");

        let written = pluggable
            .call_method(
                "copyFile",
                json!({ "from": "template/README.md.tpl", "to": "copy/README.md.tpl", "data": { "name": "x" } }),
            )
            .await
            .unwrap();
        assert_eq!(written, path_value(&dir.path().join("copy/README.md")));

        let written = pluggable
            .call_method("copyDirectory", json!({ "from": "template/src", "to": "copy/src" }))
            .await
            .unwrap();
        assert_eq!(written, json!([path_value(&dir.path().join("copy/src/main.rs"))]));

        let resolved = pluggable
            .call_method("resolve", json!(["a", "b.txt"]))
            .await
            .unwrap();
        assert_eq!(resolved, path_value(&dir.path().join("a").join("b.txt")));

        let err = pluggable
            .call_method("writeFile", json!({ "path": "x" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("writeFile"));
    }

    #[tokio::test]
    async fn test_questions_can_be_turned_off() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("rigger.toml"), "[files]\nquestions = false\ncache = false\n").unwrap();
        let mut service = service(&dir, None, Answers::new());
        let context = service.run().await.unwrap();
        assert!(context.prompts.is_empty());
    }
}
