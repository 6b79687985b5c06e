//! Persistent plugin registry
//!
//! `registry.json` maps plugin name to its entry. `update` is a full
//! rescan of the plugins directory: reserved names, dotfiles, and cache
//! directories are skipped silently, everything else is re-registered and
//! re-enabled. Re-running `update` therefore resets a previously disabled
//! plugin to enabled; inherited behavior, kept as-is.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config::ConfigStore,
    error::{Error, Result},
    paths::Paths,
    plugins::types::{PluginEntry, PluginManifest, PluginMetadata},
};

/// Subcommand names a plugin can never shadow.
pub const RESERVED_COMMANDS: &[&str] = &["config", "env", "plugins"];

/// Extensions accepted for single-file script plugins.
const SCRIPT_EXTENSIONS: &[&str] = &["sh", "py", "rb", "js"];

const MANIFEST_FILE: &str = "plugin.toml";
const CACHE_DIR: &str = "__pycache__";

/// The persistent table of known plugins.
#[derive(Debug)]
pub struct PluginRegistry {
    path: PathBuf,
    entries: BTreeMap<String, PluginEntry>,
}

impl PluginRegistry {
    /// Load the registry, starting empty when the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Write the registry document back to disk.
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PluginEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Entries in registry order, each annotated with its live enabled flag.
    pub fn list<'a>(&'a self, config: &ConfigStore) -> Vec<(&'a PluginEntry, bool)> {
        self.entries
            .values()
            .map(|entry| (entry, is_enabled_flag(config, &entry.name)))
            .collect()
    }

    /// Full rescan of the plugins directory; returns the registered names.
    pub fn update(&mut self, paths: &Paths, config: &mut ConfigStore) -> Result<Vec<String>> {
        let plugins_dir = paths.plugins_dir();
        if !plugins_dir.exists() {
            return Ok(Vec::new());
        }
        let mut candidates: Vec<PathBuf> = fs::read_dir(&plugins_dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|entry| entry.path())
            .collect();
        candidates.sort();

        let mut registered = Vec::new();
        for path in candidates {
            match self.register_path(&path, config) {
                Ok(Some(name)) => registered.push(name),
                Ok(None) => {}
                Err(err) => warn!(path = %path.display(), "skipping plugin: {err}"),
            }
        }
        self.persist()?;
        Ok(registered)
    }

    /// Register a single candidate path, upserting its entry and setting
    /// `plugins.<name>.enabled = true`. Returns `None` when the path is not
    /// a plugin: dotfile, cache directory, unsupported extension, or a name
    /// that collides with a reserved command.
    pub fn register_path(
        &mut self,
        path: &Path,
        config: &mut ConfigStore,
    ) -> Result<Option<String>> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        if file_name.starts_with('.') || file_name == CACHE_DIR {
            return Ok(None);
        }
        let is_dir = path.is_dir();
        if !is_dir {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !SCRIPT_EXTENSIONS.contains(&ext) {
                return Ok(None);
            }
        }
        let stem = file_name.split('.').next().unwrap_or(file_name).to_string();

        let manifest = if is_dir {
            read_manifest(path)?
        } else {
            PluginManifest::default()
        };
        let name = manifest.name.clone().unwrap_or_else(|| stem.clone());
        if RESERVED_COMMANDS.contains(&name.as_str()) {
            debug!(name = %name, "skipping plugin shadowing a reserved command");
            return Ok(None);
        }

        let help = match manifest.help.clone() {
            Some(help) => help,
            None if is_dir => String::new(),
            None => leading_comment_block(path),
        };
        let version = manifest.version.clone().unwrap_or_else(|| "1.0.0".into());
        let logger = manifest.logger.clone().unwrap_or_else(|| name.clone());
        let entry_script = if is_dir { manifest.entry.clone() } else { None };

        let entry = PluginEntry {
            name: name.clone(),
            path: path.to_path_buf(),
            is_dir,
            logger,
            metadata: PluginMetadata {
                name: name.clone(),
                help,
                extra: manifest.extra,
            },
            version,
            entry: entry_script,
        };
        debug!(name = %name, path = %path.display(), "registered plugin");
        self.entries.insert(name.clone(), entry);
        config.set(&format!("plugins.{name}.enabled"), Value::Bool(true))?;
        Ok(Some(name))
    }

    /// Flip the enabled flag. Succeeds even for names the registry has
    /// never seen.
    pub fn set_enabled(
        &self,
        name: &str,
        enabled: bool,
        config: &mut ConfigStore,
    ) -> Result<()> {
        config.set(&format!("plugins.{name}.enabled"), Value::Bool(enabled))
    }

    /// Live enabled flag; unknown names and non-boolean values read as
    /// disabled.
    pub fn is_enabled(&self, name: &str, config: &ConfigStore) -> bool {
        is_enabled_flag(config, name)
    }

    /// Drop a plugin from the registry and clear its enabled flag.
    pub fn remove(&mut self, name: &str, config: &mut ConfigStore) -> Result<PluginEntry> {
        let entry = self
            .entries
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("plugin '{name}' is not registered")))?;
        config.remove(&format!("plugins.{name}.enabled"))?;
        self.persist()?;
        Ok(entry)
    }
}

fn is_enabled_flag(config: &ConfigStore, name: &str) -> bool {
    config.get_bool(&format!("plugins.{name}.enabled"))
}

fn read_manifest(dir: &Path) -> Result<PluginManifest> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(PluginManifest::default());
    }
    Ok(toml::from_str(&fs::read_to_string(&path)?)?)
}

/// Help text for a file plugin: its leading `#` comment block, shebang
/// excluded. Unreadable files default to an empty string.
fn leading_comment_block(path: &Path) -> String {
    let contents = fs::read_to_string(path).unwrap_or_default();
    let mut lines: Vec<&str> = Vec::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if lines.is_empty() && (trimmed.starts_with("#!") || trimmed.is_empty()) {
            continue;
        }
        match trimmed.strip_prefix('#') {
            Some(rest) => lines.push(rest.trim()),
            None => break,
        }
    }
    lines.join("\n").trim().to_string()
}
