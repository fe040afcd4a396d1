//! `{{ key }}` placeholder templates.
//!
//! Placeholders name a dotted path into the render data. Strings render
//! as-is, other JSON values in their JSON form, missing keys as nothing.
//! Compiled templates are cached on disk against their source file.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use rigger_cache::{Cache, CacheOptions, CacheStats};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{FilesError, FilesResult};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}").expect("invalid regex")
});

/// A compiled piece of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Segment {
    Text(String),
    Var(String),
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Compiles `source`. `name` only appears in errors.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::Template`] for an opening `{{` that does not
    /// start a valid placeholder.
    pub fn compile(name: &str, source: &str) -> FilesResult<Self> {
        let mut segments = Vec::new();
        let mut last = 0;

        for captures in PLACEHOLDER_RE.captures_iter(source) {
            let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            push_text(name, &mut segments, source, last, whole.start())?;
            segments.push(Segment::Var(key.as_str().to_string()));
            last = whole.end();
        }
        push_text(name, &mut segments, source, last, source.len())?;

        Ok(Self { segments })
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the placeholder keys in order of appearance.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Var(key) => Some(key.as_str()),
            Segment::Text(_) => None,
        })
    }

    #[must_use]
    pub fn render(&self, data: &Value) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var(key) => match lookup(data, key) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(Value::Null) | None => debug!(%key, "no value for placeholder"),
                    Some(other) => out.push_str(&other.to_string()),
                },
            }
        }
        out
    }
}

impl From<Vec<Segment>> for Template {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

fn push_text(
    name: &str,
    segments: &mut Vec<Segment>,
    source: &str,
    start: usize,
    end: usize,
) -> FilesResult<()> {
    let text = &source[start..end];
    if let Some(offset) = text.find("{{") {
        return Err(FilesError::Template {
            name: name.to_string(),
            reason: format!("malformed placeholder at byte {}", start + offset),
        });
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
    Ok(())
}

fn lookup<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(data, |value, part| value.get(part))
}

/// Compiles templates, reusing cached compilations.
pub struct TemplateCache {
    cache: Cache<Vec<Segment>>,
}

impl TemplateCache {
    #[must_use]
    pub fn new(options: CacheOptions) -> Self {
        Self {
            cache: Cache::new(options),
        }
    }

    /// Loads and compiles the template at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not compile.
    pub async fn load(&self, path: &Path) -> FilesResult<Template> {
        if let Some(segments) = self.cache.get(path).await {
            return Ok(segments.into());
        }

        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FilesError::io(path, e))?;
        let template = Template::compile(&path.display().to_string(), &source)?;
        self.cache.set(path, template.segments.clone()).await;
        Ok(template)
    }

    /// Compiles an inline template.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` does not compile.
    pub async fn compile(&self, source: &str) -> FilesResult<Template> {
        let key = format!("inline:{source}");
        if let Some(segments) = self.cache.get_by_key(&key).await {
            return Ok(segments.into());
        }

        let template = Template::compile("<inline>", source)?;
        self.cache.set_by_key(&key, template.segments.clone()).await;
        Ok(template)
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("dir", &self.cache.dir())
            .field("enabled", &self.cache.is_enabled())
            .finish_non_exhaustive()
    }
}
