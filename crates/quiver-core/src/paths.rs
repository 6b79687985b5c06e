//! Centralized path layout
//!
//! Every application path hangs off a single data root (`~/.quiver`), so
//! tests can point the whole tree at a temporary directory.

use std::path::{Path, PathBuf};

const DATA_DIR_NAME: &str = ".quiver";

/// Filesystem layout under the application data root.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Layout rooted at `~/.quiver`.
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            root: home.join(DATA_DIR_NAME),
        }
    }

    /// Layout rooted at an explicit directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Key-value configuration document
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Persistent plugin registry document
    pub fn registry_file(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    /// Plugin sources
    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Per-plugin log directory, keyed by the plugin's logger binding
    pub fn plugin_log_dir(&self, logger: &str) -> PathBuf {
        self.logs_dir().join(logger)
    }

    /// PKCS#8 PEM private signing key
    pub fn private_key_file(&self) -> PathBuf {
        self.root.join("key")
    }

    /// OpenSSH-encoded public signing key
    pub fn public_key_file(&self) -> PathBuf {
        self.root.join("key.pub")
    }

    /// Create the directories every command expects to exist.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.plugins_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
