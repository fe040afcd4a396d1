//! Data the generator hands to hooks.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Answers;

/// Where the generator reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paths {
    pub cwd: PathBuf,
    /// Directory of the new project.
    pub target: PathBuf,
    /// Template directory copied into `target`, if any.
    #[serde(default)]
    pub template: Option<PathBuf>,
}

/// Project facts gathered before prompting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    /// Name given on the command line.
    pub name: String,
    /// Version of the generator.
    pub cli_version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Snapshot passed as arguments to every generator hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContext {
    pub paths: Paths,
    pub app_data: AppData,
    /// Answers supplied up front.
    pub args: Answers,
    /// Answers after prompting; empty before.
    pub prompts: Answers,
}

impl GenerateContext {
    /// Returns the data templates are rendered with: app data, then
    /// answers on top.
    #[must_use]
    pub fn template_data(&self) -> Value {
        let mut data = match serde_json::to_value(&self.app_data) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        data.extend(self.prompts.iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::Object(data)
    }
}
