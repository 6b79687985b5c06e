//! Plugin command resolution and invocation
//!
//! A registered plugin contributes exactly one subcommand to the CLI.
//! Resolution turns a registry entry into a command fragment; invocation
//! runs the plugin's entry script as a child process with its log
//! directory exported as `QUIVER_LOG_DIR`.

use std::{ffi::OsString, path::PathBuf, process::ExitStatus};

use tokio::process::Command;
use tracing::info;

use crate::{
    error::{Error, Result},
    paths::Paths,
    plugins::types::PluginEntry,
};

/// Entry script a directory plugin falls back to when its manifest does
/// not declare one.
const DEFAULT_ENTRY: &str = "main.sh";

/// Command-tree fragment a plugin contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub about: String,
    pub version: String,
}

/// Resolve a registry entry to its command fragment. Missing manifest
/// fields were already defaulted at registration time.
pub fn resolve(entry: &PluginEntry) -> CommandSpec {
    CommandSpec {
        name: entry.metadata.name.clone(),
        about: entry.metadata.help.clone(),
        version: entry.version.clone(),
    }
}

fn entry_script(entry: &PluginEntry) -> PathBuf {
    if entry.is_dir {
        entry
            .path
            .join(entry.entry.as_deref().unwrap_or(DEFAULT_ENTRY))
    } else {
        entry.path.clone()
    }
}

/// Run the plugin with `args`, inheriting stdio, and return its exit
/// status.
pub async fn invoke(paths: &Paths, entry: &PluginEntry, args: &[OsString]) -> Result<ExitStatus> {
    let script = entry_script(entry);
    if !script.exists() {
        return Err(Error::NotFound(format!(
            "plugin '{}' entry script {} is missing",
            entry.name,
            script.display()
        )));
    }
    let log_dir = paths.plugin_log_dir(&entry.logger);
    std::fs::create_dir_all(&log_dir)?;

    info!(plugin = %entry.name, script = %script.display(), "invoking plugin");
    let status = Command::new(&script)
        .args(args)
        .env("QUIVER_LOG_DIR", &log_dir)
        .status()
        .await?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::types::PluginMetadata;
    use std::collections::BTreeMap;

    fn entry(path: PathBuf, is_dir: bool) -> PluginEntry {
        PluginEntry {
            name: "demo".into(),
            path,
            is_dir,
            logger: "demo".into(),
            metadata: PluginMetadata {
                name: "demo".into(),
                help: "A demo plugin.".into(),
                extra: BTreeMap::new(),
            },
            version: "1.2.3".into(),
            entry: None,
        }
    }

    #[test]
    fn resolve_builds_the_fragment_from_metadata() {
        let spec = resolve(&entry(PathBuf::from("/plugins/demo.sh"), false));
        assert_eq!(
            spec,
            CommandSpec {
                name: "demo".into(),
                about: "A demo plugin.".into(),
                version: "1.2.3".into(),
            }
        );
    }

    #[test]
    fn directory_plugins_default_their_entry_script() {
        let mut dir_entry = entry(PathBuf::from("/plugins/demo"), true);
        assert_eq!(
            entry_script(&dir_entry),
            PathBuf::from("/plugins/demo/main.sh")
        );
        dir_entry.entry = Some("bin/run.sh".into());
        assert_eq!(
            entry_script(&dir_entry),
            PathBuf::from("/plugins/demo/bin/run.sh")
        );
    }

    #[tokio::test]
    async fn invoking_a_missing_script_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = Paths::with_root(temp.path());
        let gone = entry(temp.path().join("gone.sh"), false);
        let err = invoke(&paths, &gone, &[]).await.err().expect("missing script fails");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invoke_runs_the_script_with_its_log_dir_exported() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let paths = Paths::with_root(temp.path());
        let script = temp.path().join("demo.sh");
        let marker = temp.path().join("marker");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$QUIVER_LOG_DIR\" > {}\n", marker.display()),
        )
        .expect("write script");
        let mut perms = std::fs::metadata(&script).expect("metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).expect("chmod");

        let status = invoke(&paths, &entry(script, false), &[])
            .await
            .expect("invoke");
        assert!(status.success());
        let exported = std::fs::read_to_string(&marker).expect("read marker");
        assert_eq!(
            exported.trim(),
            paths.plugin_log_dir("demo").display().to_string()
        );
    }
}
