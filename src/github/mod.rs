//! GitHub release resolution and downloads.
//!
//! [`ReleaseResolver`] is the only component that talks to the network. Every call it makes goes
//! through the same three gates, in order:
//!
//! 1. the shared [`RateLimitTracker`], which may sleep (interruptibly) until the quota resets
//! 2. a per-request timeout, whose expiry counts as a transient failure
//! 3. the [`RetryPolicy`], which retries transient failures with exponential backoff
//!
//! 404 responses and undecodable bodies are never retried.
//!
//! # Channels
//!
//! - [`ReleaseResolver::resolve`] with `prefer_prerelease = false` uses `/releases/latest`.
//! - With `prefer_prerelease = true` the stable endpoint is skipped and the newest non-draft
//!   prerelease from `/releases` is used.
//! - [`ReleaseResolver::resolve_for_url`] tries stable first and falls back to the newest
//!   prerelease when the repository has no stable release, marking the result with
//!   [`Release::prerelease_fallback`].

pub mod asset;
pub mod models;
pub mod rate_limit;
pub mod retry;

pub use asset::{default_arch_suffixes, is_bundle, require_asset, select_asset};
pub use models::{Asset, Release, tag_to_version};
pub use rate_limit::RateLimitTracker;
pub use retry::RetryPolicy;

use crate::config::NetworkConfig;
use crate::constants::{PRERELEASE_PAGE_SIZE, USER_AGENT};
use crate::core::AppboxError;
use crate::utils::progress::ProgressObserver;
use anyhow::{Context, Result};
use futures::StreamExt;
use models::{ReleasePayload, RepositoryPayload};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Fetches release metadata and assets from the GitHub REST API.
///
/// Cloning is cheap: the HTTP client, rate-limit tracker and cancellation token are shared.
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    client: reqwest::Client,
    api_base: String,
    retry: RetryPolicy,
    rate_limit: Arc<RateLimitTracker>,
    cancel: CancellationToken,
}

impl ReleaseResolver {
    /// Build a resolver from network configuration with a fresh tracker and token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        let tracker =
            Arc::new(RateLimitTracker::new(config.rate_limit_threshold, config.max_rate_limit_wait()));
        Self::new(config, tracker, CancellationToken::new())
    }

    /// Build a resolver sharing `rate_limit` and observing `cancel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the token is not a valid header.
    pub fn new(
        config: &NetworkConfig,
        rate_limit: Arc<RateLimitTracker>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        if let Some(token) = config.token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .context("GitHub token contains invalid characters")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(config.retry_attempts),
            rate_limit,
            cancel,
        })
    }

    /// Replace the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Token observed by rate-limit waits.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Shared quota tracker.
    #[must_use]
    pub const fn rate_limit(&self) -> &Arc<RateLimitTracker> {
        &self.rate_limit
    }

    /// Resolve the release to install for a catalog package.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::NotFound`] if the repository has no matching release, or a network
    /// error once retries are exhausted.
    pub async fn resolve(&self, owner: &str, repo: &str, prefer_prerelease: bool) -> Result<Release> {
        if prefer_prerelease {
            if let Some(release) = self.latest_prerelease(owner, repo, false).await? {
                return Ok(release);
            }
            debug!("{owner}/{repo} has no prerelease, using latest stable");
        }
        self.latest_stable(owner, repo).await
    }

    /// Resolve the release for an ad-hoc repository URL install.
    ///
    /// Tries the stable channel first; if the repository has no stable release the newest
    /// prerelease is used and flagged as a fallback.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::NotFound`] if the repository has no releases at all.
    pub async fn resolve_for_url(&self, owner: &str, repo: &str) -> Result<Release> {
        match self.latest_stable(owner, repo).await {
            Ok(release) => Ok(release),
            Err(e) if is_not_found(&e) => {
                info!("{owner}/{repo} has no stable release, looking for a prerelease");
                self.latest_prerelease(owner, repo, true).await?.ok_or_else(|| {
                    AppboxError::NotFound {
                        resource: format!("releases for {owner}/{repo}"),
                    }
                    .into()
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve a specific tag.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::NotFound`] if the tag does not exist.
    pub async fn resolve_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<Release> {
        let url = format!("{}/repos/{owner}/{repo}/releases/tags/{tag}", self.api_base);
        let payload: ReleasePayload = self
            .get_json(&url, "fetch release by tag")
            .await
            .with_context(|| format!("Failed to fetch {owner}/{repo} release {tag}"))?;
        Ok(Release::from_payload(owner, repo, payload, false))
    }

    /// Default branch of a repository.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::NotFound`] if the repository does not exist.
    pub async fn resolve_default_branch(&self, owner: &str, repo: &str) -> Result<String> {
        let url = format!("{}/repos/{owner}/{repo}", self.api_base);
        let payload: RepositoryPayload = self
            .get_json(&url, "fetch repository")
            .await
            .with_context(|| format!("Failed to fetch repository {owner}/{repo}"))?;
        Ok(payload.default_branch)
    }

    /// Fetch a small text resource such as a checksum file.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::NotFound`] on 404, or a network error once retries are exhausted.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let text = self
            .retry
            .run("fetch text", move || async move {
                let response = self.send(url, "fetch text").await?;
                response.text().await.map_err(|e| transient("fetch text", &e))
            })
            .await?;
        Ok(text)
    }

    /// Stream `asset` to `destination`.
    ///
    /// Bytes go to `<destination>.part`, which is renamed into place only after the body has
    /// been fully received. A failed or interrupted download never leaves a file at
    /// `destination`.
    ///
    /// # Errors
    ///
    /// Returns a network error once retries are exhausted, or an I/O error if the staging
    /// file cannot be written.
    pub async fn download(
        &self,
        asset: &Asset,
        destination: &Path,
        package: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<PathBuf> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let part = part_path(destination);

        let result = self
            .retry
            .run("download asset", || self.download_once(asset, &part, package, observer))
            .await;
        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(anyhow::Error::from(e))
                .with_context(|| format!("Failed to download {}", asset.name));
        }

        tokio::fs::rename(&part, destination).await.with_context(|| {
            format!("Failed to move download into place: {}", destination.display())
        })?;
        debug!("Downloaded {} to {}", asset.name, destination.display());
        Ok(destination.to_path_buf())
    }

    async fn download_once(
        &self,
        asset: &Asset,
        part: &Path,
        package: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<(), AppboxError> {
        const OPERATION: &str = "download asset";

        let response = self.send(&asset.download_url, OPERATION).await?;
        let total = response.content_length().or((asset.size > 0).then_some(asset.size));
        observer.download_started(package, total);

        let mut file = tokio::fs::File::create(part).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transient(OPERATION, &e))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            observer.download_progress(package, downloaded);
        }
        file.flush().await?;
        file.sync_all().await?;

        if let Some(expected) = total {
            if downloaded < expected {
                return Err(AppboxError::NetworkTransient {
                    operation: OPERATION.to_string(),
                    reason: format!("download incomplete: received {downloaded} of {expected} bytes"),
                });
            }
        }
        Ok(())
    }

    async fn latest_stable(&self, owner: &str, repo: &str) -> Result<Release> {
        let url = format!("{}/repos/{owner}/{repo}/releases/latest", self.api_base);
        let payload: ReleasePayload = self
            .get_json(&url, "fetch latest release")
            .await
            .with_context(|| format!("Failed to fetch latest release of {owner}/{repo}"))?;
        Ok(Release::from_payload(owner, repo, payload, false))
    }

    async fn latest_prerelease(
        &self,
        owner: &str,
        repo: &str,
        fallback: bool,
    ) -> Result<Option<Release>> {
        let url = format!(
            "{}/repos/{owner}/{repo}/releases?per_page={PRERELEASE_PAGE_SIZE}",
            self.api_base
        );
        let payloads: Vec<ReleasePayload> = self
            .get_json(&url, "list releases")
            .await
            .with_context(|| format!("Failed to list releases of {owner}/{repo}"))?;

        Ok(payloads
            .into_iter()
            .find(|payload| payload.prerelease && !payload.draft)
            .map(|payload| Release::from_payload(owner, repo, payload, fallback)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, operation: &str) -> Result<T> {
        let value = self
            .retry
            .run(operation, move || async move {
                let response = self.send(url, operation).await?;
                let body = response.text().await.map_err(|e| transient(operation, &e))?;
                serde_json::from_str::<T>(&body).map_err(|e| AppboxError::MalformedResponse {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            })
            .await?;
        Ok(value)
    }

    /// One request: rate-limit gate, send, record quota, classify status.
    async fn send(&self, url: &str, operation: &str) -> Result<reqwest::Response, AppboxError> {
        self.rate_limit.wait_if_needed(&self.cancel).await?;

        debug!("GET {url}");
        let response =
            self.client.get(url).send().await.map_err(|e| transient(operation, &e))?;
        self.rate_limit.update_from_headers(response.headers());

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(self.classify_status(status, url, operation))
    }

    fn classify_status(&self, status: StatusCode, url: &str, operation: &str) -> AppboxError {
        match status {
            StatusCode::NOT_FOUND => AppboxError::NotFound {
                resource: url.to_string(),
            },
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
                if self.rate_limit.remaining() == Some(0) =>
            {
                let reset_in_secs = self.rate_limit.reset_in_secs();
                if Duration::from_secs(reset_in_secs) > self.rate_limit.max_wait() {
                    AppboxError::RateLimited {
                        reset_in_secs,
                    }
                } else {
                    // The next attempt waits for the reset before sending
                    AppboxError::NetworkTransient {
                        operation: operation.to_string(),
                        reason: format!("rate limited ({status})"),
                    }
                }
            }
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
                AppboxError::NetworkTransient {
                    operation: operation.to_string(),
                    reason: format!("server returned {s}"),
                }
            }
            s => AppboxError::Other {
                message: format!("GitHub returned {s} for {url}"),
            },
        }
    }
}

fn transient(operation: &str, error: &reqwest::Error) -> AppboxError {
    let reason = if error.is_timeout() {
        format!("request timed out: {error}")
    } else {
        error.to_string()
    };
    AppboxError::NetworkTransient {
        operation: operation.to_string(),
        reason,
    }
}

/// `<destination>.part`
fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Whether an error chain bottoms out in a 404.
#[must_use]
pub fn is_not_found(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<AppboxError>(), Some(AppboxError::NotFound { .. }))
}
