use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Metadata a plugin contributes to the command tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    #[serde(default)]
    pub help: String,
    /// Arbitrary extra fields declared by the plugin manifest.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Manifest a directory plugin ships as `plugin.toml`.
///
/// Every field is optional; declared keys win over discovery-derived
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginManifest {
    pub name: Option<String>,
    pub help: Option<String>,
    pub version: Option<String>,
    /// Logger binding; log files are expected under `logs/<logger>/`.
    pub logger: Option<String>,
    /// Entry script, relative to the plugin directory.
    pub entry: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One registered plugin, persisted in `registry.json` keyed by name.
///
/// The enabled flag lives in the config store under
/// `plugins.<name>.enabled`, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub logger: String,
    pub metadata: PluginMetadata,
    #[serde(default = "default_version")]
    pub version: String,
    /// Entry script relative to `path`; `None` for file plugins.
    #[serde(default)]
    pub entry: Option<String>,
}
