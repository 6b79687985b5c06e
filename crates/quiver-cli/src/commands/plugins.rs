//! `quiver plugins` subcommands.

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::Subcommand;

use quiver_core::{
    client::SignedClient,
    config::ConfigStore,
    keystore,
    remote::RemoteRegistry,
    Context, Error,
};

#[derive(Subcommand)]
pub enum PluginsCommand {
    /// Update the plugin registry from the plugins directory
    Update,
    /// Open a plugin's source in your editor
    Edit { name: String },
    /// Page the most recent log for a plugin
    Logs { name: String },
    /// Enable a plugin
    Enable { name: String },
    /// Disable a plugin
    Disable { name: String },
    /// List registered plugins
    Ls,
    /// Install a plugin from the remote registry
    Install {
        name: String,
        #[arg(short = 'v', long, default_value = "latest")]
        version: String,
    },
    /// Publish a plugin to a registry
    Publish {
        name: String,
        #[arg(long)]
        registry: Option<String>,
    },
    /// Remove a plugin and its registry entry
    Uninstall { name: String },
    /// Reinstall one or all plugins at the requested version
    Upgrade {
        #[arg(short, long)]
        plugin: Option<String>,
        #[arg(long, default_value = "latest")]
        version: String,
    },
}

pub async fn run(ctx: &mut Context, command: PluginsCommand) -> Result<()> {
    match command {
        PluginsCommand::Update => {
            let registered = ctx.registry.update(&ctx.paths, &mut ctx.config)?;
            println!("{} plugin(s) registered.", registered.len());
        }
        PluginsCommand::Edit { name } => edit(ctx, &name)?,
        PluginsCommand::Logs { name } => logs(ctx, &name)?,
        PluginsCommand::Enable { name } => {
            ctx.registry.set_enabled(&name, true, &mut ctx.config)?;
        }
        PluginsCommand::Disable { name } => {
            ctx.registry.set_enabled(&name, false, &mut ctx.config)?;
        }
        PluginsCommand::Ls => ls(ctx),
        PluginsCommand::Install { name, version } => install(ctx, &name, &version).await?,
        PluginsCommand::Publish { name, registry } => {
            keystore::ensure_keypair(&ctx.paths)?;
            let client = SignedClient::new(&ctx.paths, &ctx.config)?;
            let remote = RemoteRegistry::new(client, &ctx.config);
            let version = remote
                .publish(&ctx.registry, &name, registry.as_deref())
                .await?;
            println!("Published {name} v{version}.");
        }
        PluginsCommand::Uninstall { name } => uninstall(ctx, &name)?,
        PluginsCommand::Upgrade { plugin, version } => upgrade(ctx, plugin, &version).await?,
    }
    Ok(())
}

async fn install(ctx: &mut Context, name: &str, version: &str) -> Result<()> {
    keystore::ensure_keypair(&ctx.paths)?;
    let client = SignedClient::new(&ctx.paths, &ctx.config)?;
    let remote = RemoteRegistry::new(client, &ctx.config);
    remote
        .install(&ctx.paths, &mut ctx.config, &mut ctx.registry, name, version)
        .await?;
    println!("Plugin {name} v{version} has been installed.");
    Ok(())
}

fn edit(ctx: &Context, name: &str) -> Result<()> {
    let entry = ctx
        .registry
        .get(name)
        .ok_or_else(|| Error::NotFound(format!("plugin '{name}' is not registered")))?;
    let (editor, flags) = editor_command(&ctx.config);
    let status = std::process::Command::new(&editor)
        .args(&flags)
        .arg(&entry.path)
        .status()
        .with_context(|| format!("failed to launch editor '{editor}'"))?;
    if !status.success() {
        bail!("editor exited with {status}");
    }
    Ok(())
}

/// Editor selection: `app.editor.name`, else `$VISUAL`/`$EDITOR` in the
/// order `app.editor.prefer_visual` dictates, else `vi`.
fn editor_command(config: &ConfigStore) -> (String, Vec<String>) {
    let from_env = || {
        let (first, second) = if config.get_bool("app.editor.prefer_visual") {
            ("VISUAL", "EDITOR")
        } else {
            ("EDITOR", "VISUAL")
        };
        std::env::var(first).or_else(|_| std::env::var(second)).ok()
    };
    let editor = config
        .get_str("app.editor.name")
        .or_else(from_env)
        .unwrap_or_else(|| "vi".into());
    (editor, config.get_str_list("app.editor.flags"))
}

fn logs(ctx: &Context, name: &str) -> Result<()> {
    let entry = ctx
        .registry
        .get(name)
        .ok_or_else(|| Error::NotFound(format!("plugin '{name}' is not registered")))?;
    let latest = latest_log_file(&ctx.paths.plugin_log_dir(&entry.logger))
        .ok_or_else(|| Error::NotFound(format!("no log files for plugin '{name}'")))?;

    let pager = ctx
        .config
        .get_str("app.pager.name")
        .or_else(|| std::env::var("PAGER").ok())
        .unwrap_or_else(|| "less".into());
    let status = std::process::Command::new(&pager)
        .args(ctx.config.get_str_list("app.pager.flags"))
        .arg(&latest)
        .status()
        .with_context(|| format!("failed to launch pager '{pager}'"))?;
    if !status.success() {
        bail!("pager exited with {status}");
    }
    Ok(())
}

/// Most recent log file: file names sort chronologically, so the
/// lexicographically last one wins.
fn latest_log_file(dir: &std::path::Path) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files.pop()
}

fn ls(ctx: &Context) {
    for (entry, enabled) in ctx.registry.list(&ctx.config) {
        let flag = if enabled { "enabled" } else { "disabled" };
        let help = entry.metadata.help.lines().next().unwrap_or("");
        println!("{:<20} {:<9} {}", entry.name, flag, help);
    }
}

fn uninstall(ctx: &mut Context, name: &str) -> Result<()> {
    let entry = ctx.registry.remove(name, &mut ctx.config)?;
    if entry.path.exists() {
        if entry.is_dir {
            std::fs::remove_dir_all(&entry.path)?;
        } else {
            std::fs::remove_file(&entry.path)?;
        }
    }
    println!("Plugin {name} has been uninstalled.");
    Ok(())
}

/// Upgrade one plugin, or every registered plugin when none is named.
async fn upgrade(ctx: &mut Context, plugin: Option<String>, version: &str) -> Result<()> {
    let targets = match plugin {
        Some(name) => {
            if !ctx.registry.contains(&name) {
                bail!(Error::NotFound(format!("plugin '{name}' is not registered")));
            }
            vec![name]
        }
        None => ctx.registry.names(),
    };
    for name in targets {
        install(ctx, &name, version).await?;
    }
    Ok(())
}
