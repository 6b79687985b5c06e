//! Plugin registry, manifest types, and command loading.
//!
//! A plugin is a script file or a directory under the plugins dir that
//! contributes one subcommand to the CLI. Directory plugins declare their
//! metadata in `plugin.toml`; file plugins derive it from the file itself.

pub mod loader;
pub mod registry;
pub mod types;

pub use loader::CommandSpec;
pub use registry::{PluginRegistry, RESERVED_COMMANDS};
pub use types::{PluginEntry, PluginManifest, PluginMetadata};
