//! Common test utilities for appbox integration tests
//!
//! [`MockGithub`] serves the parts of the GitHub REST API the resolver uses, plus asset
//! downloads, from a local `wiremock` server. [`TestEnv`] roots every appbox directory in a
//! temporary directory.

// Not every helper is used by every test module
#![allow(dead_code)]

use appbox_cli::catalog::{Catalog, JsonCatalog};
use appbox_cli::config::GlobalConfig;
use appbox_cli::github::{ReleaseResolver, RetryPolicy};
use appbox_cli::installer::Installer;
use appbox_cli::test_utils::{init_test_logging, sha256_hex, test_config};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Local stand-in for api.github.com and its download host.
pub struct MockGithub {
    pub server: MockServer,
}

impl MockGithub {
    pub async fn start() -> Self {
        init_test_logging(None);
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Asset payload served at `/dl/<owner>/<repo>/<tag>/<name>`; `digest` adds the API hash.
    pub fn asset(&self, owner: &str, repo: &str, tag: &str, name: &str, bytes: &[u8], digest: bool) -> Value {
        json!({
            "name": name,
            "size": bytes.len(),
            "digest": digest.then(|| format!("sha256:{}", sha256_hex(bytes))),
            "browser_download_url": format!("{}/dl/{owner}/{repo}/{tag}/{name}", self.uri()),
        })
    }

    /// Serve `bytes` for an asset created by [`asset`](Self::asset).
    pub async fn mount_download(&self, owner: &str, repo: &str, tag: &str, name: &str, bytes: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/dl/{owner}/{repo}/{tag}/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
            .mount(&self.server)
            .await;
    }

    /// `GET /repos/<owner>/<repo>/releases/latest`
    pub async fn mount_latest(&self, owner: &str, repo: &str, release: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/{owner}/{repo}/releases/latest")))
            .respond_with(ResponseTemplate::new(200).set_body_json(release))
            .mount(&self.server)
            .await;
    }

    /// `releases/latest` answering 404, as for repositories with only prereleases.
    pub async fn mount_no_stable(&self, owner: &str, repo: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/{owner}/{repo}/releases/latest")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&self.server)
            .await;
    }

    /// `GET /repos/<owner>/<repo>/releases`
    pub async fn mount_release_list(&self, owner: &str, repo: &str, releases: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/{owner}/{repo}/releases")))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(releases)))
            .mount(&self.server)
            .await;
    }

    /// Publish `tag` as the latest stable release with one bundle asset carrying a digest.
    ///
    /// Returns the asset name.
    pub async fn publish(&self, owner: &str, repo: &str, tag: &str, bytes: &[u8]) -> String {
        let name = format!("{repo}-{tag}-x86_64.AppImage");
        let asset = self.asset(owner, repo, tag, &name, bytes, true);
        self.mount_latest(owner, repo, release_json(tag, false, vec![asset])).await;
        self.mount_download(owner, repo, tag, &name, bytes).await;
        name
    }

    /// Drop every mock, e.g. before publishing a newer release.
    pub async fn reset(&self) {
        self.server.reset().await;
    }
}

/// Release payload as returned by the API.
pub fn release_json(tag: &str, prerelease: bool, assets: Vec<Value>) -> Value {
    json!({
        "tag_name": tag,
        "prerelease": prerelease,
        "draft": false,
        "assets": assets,
    })
}

/// Temporary appbox installation pointed at a mock API.
pub struct TestEnv {
    pub temp: TempDir,
    pub config: GlobalConfig,
}

impl TestEnv {
    pub fn new(api_base: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path(), api_base);
        Self {
            temp,
            config,
        }
    }

    /// Resolver with retries but no backoff delay.
    pub fn resolver(&self) -> ReleaseResolver {
        ReleaseResolver::from_config(&self.config.network)
            .unwrap()
            .with_retry_policy(
                RetryPolicy::new(self.config.network.retry_attempts)
                    .with_delays(Duration::ZERO, Duration::ZERO),
            )
    }

    pub fn installer(&self) -> Installer {
        self.installer_with_catalog(JsonCatalog::default())
    }

    pub fn installer_with_catalog(&self, catalog: impl Catalog + 'static) -> Installer {
        Installer::with_resolver(&self.config, Arc::new(catalog), self.resolver())
    }

    pub fn installed_path(&self, file_name: &str) -> PathBuf {
        self.config.directories.install.join(file_name)
    }

    /// Write the configuration as TOML and return its path.
    pub async fn write_config_file(&self) -> PathBuf {
        let path = self.temp.path().join("config.toml");
        self.config.save_to(&path).await.unwrap();
        path
    }
}
