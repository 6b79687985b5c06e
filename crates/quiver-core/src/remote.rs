//! Remote registry protocol
//!
//! Install resolves a plugin version against an ordered host list: the
//! configured registries first, then the implicit default host. The first
//! host answering 200 wins and the rest are never tried. Publish targets a
//! single registry, bootstraps the plugin record on 404, refuses duplicate
//! versions, and signs every mutating request.

use std::path::{Path, PathBuf};

use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    archive::{extract_archive, make_archive},
    client::SignedClient,
    config::ConfigStore,
    error::{Error, Result},
    paths::Paths,
    plugins::registry::PluginRegistry,
};

/// Registry host implied after every configured host.
pub const DEFAULT_REGISTRY: &str = "registry.quiver.dev";

/// Per-plugin ignore file honored when packaging for publish.
const IGNORE_FILE: &str = ".qvignore";

#[derive(Debug, Deserialize)]
struct VersionList {
    #[serde(default)]
    data: Vec<RemoteVersion>,
}

/// One published version as reported by a registry.
#[derive(Debug, Deserialize)]
pub struct RemoteVersion {
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct DownloadEnvelope {
    data: DownloadPayload,
}

#[derive(Debug, Deserialize)]
struct DownloadPayload {
    /// base85(gzip(tar)) plugin archive
    file: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Serialize)]
struct CreatePlugin<'a> {
    name: &'a str,
}

/// Client side of the plugin registry wire protocol.
pub struct RemoteRegistry {
    client: SignedClient,
    hosts: Vec<String>,
}

impl RemoteRegistry {
    /// Host order: `app.registries` as configured, then the default host.
    pub fn new(client: SignedClient, config: &ConfigStore) -> Self {
        let mut hosts = config.get_str_list("app.registries");
        hosts.push(DEFAULT_REGISTRY.to_string());
        Self::with_hosts(client, hosts)
    }

    /// Explicit host list, in probe order.
    pub fn with_hosts(client: SignedClient, hosts: Vec<String>) -> Self {
        Self {
            client,
            hosts: hosts.iter().map(|h| normalize_host(h)).collect(),
        }
    }

    /// Install `name` at `version` from the first host that has it,
    /// extracting the archive into the plugins directory and registering
    /// the result. Nothing is written when every host misses.
    pub async fn install(
        &self,
        paths: &Paths,
        config: &mut ConfigStore,
        registry: &mut PluginRegistry,
        name: &str,
        version: &str,
    ) -> Result<()> {
        for host in &self.hosts {
            let url = format!("{host}/v1/plugins/{name}/versions/{version}");
            debug!(%url, "probing registry host");
            let response = match self.client.get(&url).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(host = %host, "registry host unreachable: {err}");
                    continue;
                }
            };
            if response.status() != StatusCode::OK {
                debug!(host = %host, status = %response.status(), "host has no match");
                continue;
            }

            let envelope: DownloadEnvelope = response.json().await?;
            let raw = base85::decode(&envelope.data.file)
                .map_err(|e| Error::Archive(format!("invalid archive encoding: {e}")))?;
            let plugins_dir = paths.plugins_dir();
            extract_archive(&raw, &plugins_dir)?;
            register_installed(&plugins_dir, config, registry, name)?;
            info!(plugin = name, version, host = %host, "installed plugin");
            return Ok(());
        }
        Err(Error::NotFound(format!(
            "no plugin {name} v{version} found in any registry"
        )))
    }

    /// Publish the registered plugin `name` to one registry host (the
    /// default when `host` is `None`).
    pub async fn publish(
        &self,
        registry: &PluginRegistry,
        name: &str,
        host: Option<&str>,
    ) -> Result<String> {
        let entry = registry.get(name).ok_or_else(|| {
            Error::NotFound(format!(
                "plugin '{name}' is not registered; run `quiver plugins update` first"
            ))
        })?;
        let host = normalize_host(host.unwrap_or(DEFAULT_REGISTRY));

        let list_url = format!("{host}/v1/plugins/{name}/versions");
        let response = self.client.get(&list_url).await?;
        let versions = match response.status() {
            StatusCode::OK => response.json::<VersionList>().await?.data,
            StatusCode::NOT_FOUND => {
                // First release: create the plugin record before uploading.
                info!(plugin = name, "initial release, creating plugin on registry");
                let created = self
                    .client
                    .post_json(&format!("{host}/v1/plugins"), &CreatePlugin { name }, true)
                    .await?;
                if !created.status().is_success() {
                    return Err(remote_error(created).await);
                }
                Vec::new()
            }
            _ => return Err(remote_error(response).await),
        };

        if versions.iter().any(|v| v.version == entry.version) {
            return Err(Error::Conflict(format!(
                "plugin {name} version {} already exists",
                entry.version
            )));
        }

        let data = match load_ignore(&entry.path) {
            Some(matcher) => {
                let predicate =
                    |member: &Path| is_ignored(&matcher, &entry.path, member);
                make_archive(&entry.path, Some(&predicate))?
            }
            None => make_archive(&entry.path, None)?,
        };
        let part = reqwest::multipart::Part::bytes(data)
            .file_name(format!("{}.tar.gz", entry.version))
            .mime_str("application/tar+gzip")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let upload_url = format!("{host}/v1/plugins/{name}/versions/{}", entry.version);
        let response = self.client.post_multipart(&upload_url, form, true).await?;
        if !response.status().is_success() {
            return Err(remote_error(response).await);
        }
        info!(plugin = name, version = %entry.version, "published plugin");
        Ok(entry.version.clone())
    }
}

/// Register the freshly extracted source matching `name`.
fn register_installed(
    plugins_dir: &Path,
    config: &mut ConfigStore,
    registry: &mut PluginRegistry,
    name: &str,
) -> Result<()> {
    for dir_entry in std::fs::read_dir(plugins_dir)? {
        let path = dir_entry?.path();
        let stem = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.split('.').next().unwrap_or(n));
        if stem == Some(name) {
            registry.register_path(&path, config)?;
            registry.persist()?;
            return Ok(());
        }
    }
    warn!(plugin = name, "installed archive did not contain a matching entry");
    Ok(())
}

/// Whether an archive member (rooted at the plugin's base name) matches the
/// plugin's ignore rules. Parent directories are consulted so directory
/// patterns like `cache/` exclude their contents.
fn is_ignored(matcher: &ignore::gitignore::Gitignore, source: &Path, member: &Path) -> bool {
    let rel: PathBuf = member.iter().skip(1).collect();
    let is_dir = source.join(&rel).is_dir();
    matcher.matched_path_or_any_parents(&rel, is_dir).is_ignore()
}

/// Ignore matcher from the plugin's `.qvignore`, when present.
fn load_ignore(source: &Path) -> Option<ignore::gitignore::Gitignore> {
    let file = source.join(IGNORE_FILE);
    if !file.exists() {
        return None;
    }
    let mut builder = ignore::gitignore::GitignoreBuilder::new(source);
    builder.add(&file);
    match builder.build() {
        Ok(matcher) => Some(matcher),
        Err(err) => {
            warn!(path = %file.display(), "ignoring unreadable ignore file: {err}");
            None
        }
    }
}

async fn remote_error(response: Response) -> Error {
    let status = response.status().as_u16();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => "registry returned an unexpected response".to_string(),
    };
    Error::Remote { status, message }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::ensure_keypair;
    use serde_json::json;
    use std::fs;

    struct Fixture {
        _temp: tempfile::TempDir,
        paths: Paths,
        config: ConfigStore,
        registry: PluginRegistry,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = Paths::with_root(temp.path());
        paths.ensure_layout().expect("ensure layout");
        ensure_keypair(&paths).expect("generate keypair");
        let mut config = ConfigStore::load(&paths.config_file()).expect("load config");
        config
            .set("app.email", json!("dev@example.com"))
            .expect("set email");
        let registry = PluginRegistry::load(&paths.registry_file()).expect("load registry");
        Fixture {
            _temp: temp,
            paths,
            config,
            registry,
        }
    }

    fn client(fx: &Fixture) -> SignedClient {
        SignedClient::new(&fx.paths, &fx.config).expect("construct client")
    }

    /// base85(gzip(tar)) payload for a one-file plugin named `name`.
    fn wire_archive(fx: &Fixture, name: &str) -> String {
        let staging = fx.paths.root().join("staging").join(name);
        fs::create_dir_all(&staging).expect("staging dir");
        fs::write(staging.join("main.sh"), "#!/bin/sh\necho hi\n").expect("write entry");
        let bytes = make_archive(&staging, None).expect("make archive");
        base85::encode(&bytes)
    }

    #[tokio::test]
    async fn install_falls_through_dead_hosts() {
        let mut fx = fixture();
        let mut server = mockito::Server::new_async().await;
        let body = json!({"data": {"file": wire_archive(&fx, "foo")}}).to_string();
        let mock = server
            .mock("GET", "/v1/plugins/foo/versions/latest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        // first host refuses connections, second is the live default
        let hosts = vec!["http://127.0.0.1:1".to_string(), server.url()];
        let remote = RemoteRegistry::with_hosts(client(&fx), hosts);
        remote
            .install(&fx.paths, &mut fx.config, &mut fx.registry, "foo", "latest")
            .await
            .expect("install");

        mock.assert_async().await;
        assert!(fx.paths.plugins_dir().join("foo/main.sh").is_file());
        assert!(fx.registry.contains("foo"));
        assert!(fx.registry.is_enabled("foo", &fx.config));
    }

    #[tokio::test]
    async fn install_exhausting_all_hosts_is_not_found() {
        let mut fx = fixture();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/plugins/foo/versions/latest")
            .with_status(404)
            .with_body(json!({"message": "no such plugin"}).to_string())
            .create_async()
            .await;

        let remote = RemoteRegistry::with_hosts(client(&fx), vec![server.url()]);
        let err = remote
            .install(&fx.paths, &mut fx.config, &mut fx.registry, "foo", "latest")
            .await
            .err()
            .expect("install must fail");

        mock.assert_async().await;
        assert!(matches!(err, Error::NotFound(_)), "unexpected error: {err}");
        assert!(!fx.registry.contains("foo"));
        assert!(!fx.paths.plugins_dir().join("foo").exists());
    }

    fn register_local_plugin(fx: &mut Fixture, name: &str) {
        let dir = fx.paths.plugins_dir().join(name);
        fs::create_dir_all(&dir).expect("plugin dir");
        fs::write(dir.join("main.sh"), "#!/bin/sh\n").expect("write entry");
        fx.registry
            .register_path(&dir, &mut fx.config)
            .expect("register")
            .expect("registered name");
    }

    #[tokio::test]
    async fn publish_duplicate_version_is_a_conflict_with_no_write() {
        let mut fx = fixture();
        register_local_plugin(&mut fx, "bar");

        let mut server = mockito::Server::new_async().await;
        let list = server
            .mock("GET", "/v1/plugins/bar/versions")
            .with_status(200)
            .with_body(json!({"data": [{"version": "1.0.0"}]}).to_string())
            .create_async()
            .await;
        let writes = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let remote = RemoteRegistry::with_hosts(client(&fx), vec![server.url()]);
        let err = remote
            .publish(&fx.registry, "bar", Some(&server.url()))
            .await
            .err()
            .expect("publish must fail");

        assert!(matches!(err, Error::Conflict(_)), "unexpected error: {err}");
        list.assert_async().await;
        writes.assert_async().await;
    }

    #[tokio::test]
    async fn publish_bootstraps_unknown_plugins_before_uploading() {
        let mut fx = fixture();
        register_local_plugin(&mut fx, "baz");

        let mut server = mockito::Server::new_async().await;
        let list = server
            .mock("GET", "/v1/plugins/baz/versions")
            .with_status(404)
            .with_body(json!({"message": "unknown plugin"}).to_string())
            .create_async()
            .await;
        let create = server
            .mock("POST", "/v1/plugins")
            .match_header("x-signature", mockito::Matcher::Any)
            .with_status(201)
            .with_body(json!({"name": "baz"}).to_string())
            .create_async()
            .await;
        let upload = server
            .mock("POST", "/v1/plugins/baz/versions/1.0.0")
            .match_header("x-signature", mockito::Matcher::Any)
            .with_status(201)
            .create_async()
            .await;

        let remote = RemoteRegistry::with_hosts(client(&fx), vec![server.url()]);
        let version = remote
            .publish(&fx.registry, "baz", Some(&server.url()))
            .await
            .expect("publish");

        assert_eq!(version, "1.0.0");
        list.assert_async().await;
        create.assert_async().await;
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn publish_unknown_local_plugin_is_not_found() {
        let fx = fixture();
        let remote = RemoteRegistry::with_hosts(client(&fx), vec![DEFAULT_REGISTRY.to_string()]);
        let err = remote
            .publish(&fx.registry, "ghost", None)
            .await
            .err()
            .expect("publish must fail");
        assert!(matches!(err, Error::NotFound(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn publish_surfaces_the_registry_message_on_server_errors() {
        let mut fx = fixture();
        register_local_plugin(&mut fx, "qux");

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/plugins/qux/versions")
            .with_status(500)
            .with_body(json!({"message": "registry on fire"}).to_string())
            .create_async()
            .await;

        let remote = RemoteRegistry::with_hosts(client(&fx), vec![server.url()]);
        let err = remote
            .publish(&fx.registry, "qux", Some(&server.url()))
            .await
            .err()
            .expect("publish must fail");
        match err {
            Error::Remote { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "registry on fire");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn qvignore_directory_patterns_exclude_their_contents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("demo");
        fs::create_dir_all(source.join("cache")).expect("create cache dir");
        fs::write(source.join("main.sh"), "#!/bin/sh\n").expect("write entry");
        fs::write(source.join("cache/blob.bin"), "stale").expect("write cached file");
        fs::write(source.join(IGNORE_FILE), "cache/\n").expect("write ignore file");

        let matcher = load_ignore(&source).expect("ignore matcher");
        let predicate = |member: &Path| is_ignored(&matcher, &source, member);
        let bytes = make_archive(&source, Some(&predicate)).expect("make archive");
        let dest = temp.path().join("out");
        extract_archive(&bytes, &dest).expect("extract archive");

        assert!(dest.join("demo/main.sh").is_file());
        assert!(!dest.join("demo/cache").exists());
    }

    #[test]
    fn hosts_are_normalized_to_https() {
        assert_eq!(normalize_host("r.example.com"), "https://r.example.com");
        assert_eq!(normalize_host("http://localhost:4000/"), "http://localhost:4000");
        assert_eq!(
            normalize_host(DEFAULT_REGISTRY),
            "https://registry.quiver.dev"
        );
    }
}
