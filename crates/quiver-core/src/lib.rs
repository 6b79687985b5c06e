//! Quiver core library
//!
//! Config storage, the plugin registry, archive packaging, and the signed
//! publish/install protocol against remote plugin registries. The `quiver`
//! binary in `quiver-cli` is a thin command layer over these types.

pub mod archive;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod keystore;
pub mod paths;
pub mod plugins;
pub mod remote;

pub use context::Context;
pub use error::{Error, Result};
