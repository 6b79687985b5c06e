//! `quiver config` subcommands.

use anyhow::Result;
use clap::Subcommand;
use serde_json::Value;

use quiver_core::Context;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print a configuration value
    Get { key: String },
    /// Set a configuration value (parsed as JSON, else stored as a string)
    Set { key: String, value: String },
    /// Remove a configuration value
    Unset { key: String },
}

pub fn run(ctx: &mut Context, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Get { key } => match ctx.config.get(&key) {
            Some(value) => println!("{value}"),
            None => println!("null"),
        },
        ConfigCommand::Set { key, value } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            ctx.config.set(&key, value)?;
        }
        ConfigCommand::Unset { key } => ctx.config.remove(&key)?,
    }
    Ok(())
}
