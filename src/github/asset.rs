//! Choosing the installable file from a release.

use super::models::{Asset, Release};
use crate::core::AppboxError;

/// Whether `name` is a recognized bundle (`.AppImage`, any case).
#[must_use]
pub fn is_bundle(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".appimage")
}

/// Characteristic suffixes for the running architecture, most specific first.
#[must_use]
pub fn default_arch_suffixes() -> Vec<String> {
    let suffixes: &[&str] = match std::env::consts::ARCH {
        "x86_64" => &["x86_64", "amd64", "x64"],
        "aarch64" => &["aarch64", "arm64"],
        "arm" => &["armhf", "armv7"],
        "x86" => &["i686", "i386"],
        _ => &[],
    };
    suffixes.iter().map(|s| (*s).to_string()).collect()
}

/// Pick the asset to install.
///
/// Candidates are the recognized bundles in release order. The first candidate containing one of
/// `preferred_suffixes` wins, trying suffixes in order; failing that, the first candidate.
/// Matching is case-insensitive.
#[must_use]
pub fn select_asset<'a>(release: &'a Release, preferred_suffixes: &[String]) -> Option<&'a Asset> {
    let candidates: Vec<&Asset> =
        release.assets.iter().filter(|asset| is_bundle(&asset.name)).collect();

    for suffix in preferred_suffixes {
        let suffix = suffix.to_ascii_lowercase();
        if suffix.is_empty() {
            continue;
        }
        if let Some(asset) =
            candidates.iter().copied().find(|asset| asset.name.to_ascii_lowercase().contains(&suffix))
        {
            return Some(asset);
        }
    }

    candidates.first().copied()
}

/// [`select_asset`], failing with [`AppboxError::AssetNotFound`] when nothing matches.
///
/// # Errors
///
/// Returns [`AppboxError::AssetNotFound`] if the release has no bundle asset.
pub fn require_asset(release: &Release, preferred_suffixes: &[String]) -> Result<Asset, AppboxError> {
    select_asset(release, preferred_suffixes).cloned().ok_or_else(|| {
        AppboxError::AssetNotFound {
            owner: release.owner.clone(),
            repo: release.repo.clone(),
            version: release.version.clone(),
        }
    })
}
