//! Persistent key-value configuration
//!
//! Dotted-path string keys over a flat JSON document (`config.json`).
//! Declared defaults are consulted when a key has never been written.
//! The core itself only ever writes `plugins.<name>.enabled`; everything
//! else is user-owned.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::error::Result;

/// Dotted-key configuration store backed by a JSON file.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl ConfigStore {
    /// Load the store, starting empty when the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let values = if path.exists() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    /// Value for `key`, falling back to the declared default.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.values.get(key) {
            Some(Value::Null) | None => default_for(key),
            Some(value) => Some(value.clone()),
        }
    }

    /// String value for `key`; non-string values are treated as unset.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Boolean flag for `key`; anything that is not `true` reads as false.
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Bool(true)))
    }

    /// String-list value for `key`; non-string elements are dropped.
    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Set `key` and persist immediately.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.save()
    }

    /// Remove `key` and persist; removing an unknown key is a no-op.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        if self.values.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.values)?)?;
        Ok(())
    }
}

/// Declared defaults for user-facing settings.
fn default_for(key: &str) -> Option<Value> {
    let value = match key {
        "app.theme" => Value::from("monokai"),
        "app.logger.level" => Value::from("info"),
        "app.editor.prefer_visual" => Value::from(false),
        "app.editor.flags" => Value::Array(Vec::new()),
        "app.pager.flags" => Value::Array(Vec::new()),
        "app.default_verbosity" => Value::from(0),
        _ => return None,
    };
    Some(value)
}
