//! Release and asset types, plus the GitHub wire formats they are decoded from.

use serde::{Deserialize, Serialize};

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// File name as published
    pub name: String,
    /// Declared size in bytes
    pub size: u64,
    /// Hash published by the API as `"<algorithm>:<hex>"`; `None` when the API has none
    pub digest: Option<String>,
    /// Direct download URL
    pub download_url: String,
}

impl Asset {
    /// Split the digest into `(algorithm, hex)`.
    ///
    /// Returns `None` if there is no digest or it lacks the `algorithm:` prefix.
    #[must_use]
    pub fn digest_parts(&self) -> Option<(&str, &str)> {
        let digest = self.digest.as_deref()?;
        let (algorithm, hex) = digest.split_once(':')?;
        if algorithm.is_empty() || hex.is_empty() {
            return None;
        }
        Some((algorithm, hex))
    }
}

/// A resolved release. Built fresh for every resolution and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Tag with any leading `v` removed
    pub version: String,
    /// Whether GitHub flags this release as a prerelease
    pub prerelease: bool,
    /// Tag exactly as published
    pub original_tag: String,
    /// Attached files
    pub assets: Vec<Asset>,
    /// Chosen because the repository has no stable release
    pub prerelease_fallback: bool,
}

impl Release {
    pub(crate) fn from_payload(
        owner: &str,
        repo: &str,
        payload: ReleasePayload,
        prerelease_fallback: bool,
    ) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            version: tag_to_version(&payload.tag_name),
            prerelease: payload.prerelease,
            original_tag: payload.tag_name,
            assets: payload.assets.into_iter().map(Asset::from).collect(),
            prerelease_fallback,
        }
    }

    /// Look up an asset by exact name.
    #[must_use]
    pub fn asset_named(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// Strip a single leading `v`/`V` from a tag.
#[must_use]
pub fn tag_to_version(tag: &str) -> String {
    let tag = tag.trim();
    tag.strip_prefix(['v', 'V']).unwrap_or(tag).to_string()
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReleasePayload {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<AssetPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssetPayload {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: Option<String>,
    pub browser_download_url: String,
}

impl From<AssetPayload> for Asset {
    fn from(payload: AssetPayload) -> Self {
        Self {
            name: payload.name,
            size: payload.size,
            digest: payload.digest.filter(|d| !d.trim().is_empty()),
            download_url: payload.browser_download_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryPayload {
    pub default_branch: String,
}
