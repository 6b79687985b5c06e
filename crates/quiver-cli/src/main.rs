//! Quiver - a plugin-centric command-line toolbox
//!
//! Centralizes user scripts as plugins that contribute subcommands, with a
//! signed publish/install workflow against remote plugin registries.

use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use quiver_core::{paths::Paths, plugins::loader, Context};

mod commands;

use commands::{config::ConfigCommand, plugins::PluginsCommand};

/// Quiver - centralize your scripts and odds and ends as plugins
#[derive(Parser)]
#[command(name = "quiver", version)]
#[command(about = "Centralize your scripts and odds and ends as plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage CLI plugins
    Plugins {
        #[command(subcommand)]
        command: PluginsCommand,
    },
    /// Inspect and edit configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Invoke an enabled plugin by name
    #[command(external_subcommand)]
    Plugin(Vec<OsString>),
}

/// Log to a file under `logs/quiver/` so plugin output owns the terminal.
fn init_logging(paths: &Paths, level: &str) {
    let log_dir = paths.plugin_log_dir("quiver");
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("failed to create log directory: {e}");
        return;
    }
    match std::fs::File::create(log_dir.join("quiver.log")) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
                )
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        Err(e) => eprintln!("failed to create log file: {e}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut ctx = match Context::open(Paths::new()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let level = ctx
        .config
        .get_str("app.logger.level")
        .unwrap_or_else(|| "info".into());
    init_logging(&ctx.paths, &level);

    match run(&mut ctx, cli.command).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(ctx: &mut Context, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Plugins { command } => {
            commands::plugins::run(ctx, command).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { command } => {
            commands::config::run(ctx, command)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plugin(args) => dispatch_plugin(ctx, args).await,
    }
}

/// Route an external subcommand to the matching enabled plugin.
async fn dispatch_plugin(ctx: &Context, args: Vec<OsString>) -> Result<ExitCode> {
    let Some(name) = args.first().and_then(|a| a.to_str()) else {
        anyhow::bail!("invalid plugin command");
    };
    let Some(entry) = ctx.registry.get(name) else {
        anyhow::bail!("unknown command or plugin '{name}'; run `quiver plugins update`");
    };
    if !ctx.registry.is_enabled(name, &ctx.config) {
        anyhow::bail!("plugin '{name}' is disabled; run `quiver plugins enable {name}`");
    }

    let spec = loader::resolve(entry);
    tracing::info!(command = %spec.name, version = %spec.version, "dispatching plugin command");
    let status = loader::invoke(&ctx.paths, entry, &args[1..]).await?;
    Ok(match status.code() {
        Some(0) => ExitCode::SUCCESS,
        Some(code) => ExitCode::from(code.clamp(0, 255) as u8),
        None => ExitCode::FAILURE,
    })
}
