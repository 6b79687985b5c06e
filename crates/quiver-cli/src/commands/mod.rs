//! Command handlers for the static half of the command tree.

pub mod config;
pub mod plugins;
