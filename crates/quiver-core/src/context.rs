//! Per-invocation application context
//!
//! Replaces process-wide singletons: built once at command-dispatch start,
//! passed by reference into every operation, dropped at process exit.

use crate::{
    config::ConfigStore,
    error::Result,
    paths::Paths,
    plugins::registry::PluginRegistry,
};

/// Everything a command handler needs to touch persistent state.
pub struct Context {
    pub paths: Paths,
    pub config: ConfigStore,
    pub registry: PluginRegistry,
}

impl Context {
    /// Open the data root, creating the expected directory layout on
    /// first use.
    pub fn open(paths: Paths) -> Result<Self> {
        paths.ensure_layout()?;
        let config = ConfigStore::load(&paths.config_file())?;
        let registry = PluginRegistry::load(&paths.registry_file())?;
        Ok(Self {
            paths,
            config,
            registry,
        })
    }
}
