//! Checksum file parsing and discovery.
//!
//! Four layouts are understood:
//!
//! - GNU coreutils: `<hex>  <name>` or `<hex> *<name>` (binary mode), one entry per line
//! - BSD: `SHA256 (<name>) = <hex>`
//! - Name first: `<name>: <hex>`
//! - Single hash: the file holds only a hex digest, optionally followed by a name
//!
//! Names are compared by their final path component, so `./dist/App.AppImage` matches
//! `App.AppImage`.

use super::hash::HashAlgorithm;
use crate::github::{Asset, Release};
use regex::Regex;
use std::sync::LazyLock;

static BSD_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?i)(SHA256|SHA512|SHA-256|SHA-512)\s*\((.+)\)\s*=\s*([0-9a-fA-F]+)$").ok()
});

/// One entry from a checksum file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    /// Hex digest as written in the file
    pub hex: String,
    /// Algorithm named by the line (BSD format only)
    pub algorithm: Option<HashAlgorithm>,
}

/// Find the entry for `asset_name` in a checksum file.
///
/// Returns `None` when the file has no entry for the asset. A file consisting of a single hash
/// is taken to describe the asset.
#[must_use]
pub fn find_entry(content: &str, asset_name: &str) -> Option<ChecksumEntry> {
    let lines: Vec<&str> =
        content.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')).collect();

    for line in &lines {
        if let Some(entry) = parse_bsd(line, asset_name) {
            return Some(entry);
        }
        if let Some(entry) = parse_gnu(line, asset_name) {
            return Some(entry);
        }
        if let Some(entry) = parse_colon(line, asset_name) {
            return Some(entry);
        }
    }

    if let [only] = lines.as_slice() {
        let mut parts = only.split_whitespace();
        let hex = parts.next()?;
        if is_hex(hex) && parts.next().is_none() {
            return Some(ChecksumEntry {
                hex: hex.to_string(),
                algorithm: None,
            });
        }
    }
    None
}

fn parse_bsd(line: &str, asset_name: &str) -> Option<ChecksumEntry> {
    let captures = BSD_LINE.as_ref()?.captures(line)?;
    if !same_file(captures.get(2)?.as_str(), asset_name) {
        return None;
    }
    Some(ChecksumEntry {
        hex: captures.get(3)?.as_str().to_string(),
        algorithm: captures.get(1)?.as_str().parse().ok(),
    })
}

fn parse_gnu(line: &str, asset_name: &str) -> Option<ChecksumEntry> {
    let (hex, rest) = line.split_once(char::is_whitespace)?;
    if !is_hex(hex) {
        return None;
    }
    let name = rest.trim_start().trim_start_matches('*');
    if !same_file(name, asset_name) {
        return None;
    }
    Some(ChecksumEntry {
        hex: hex.to_string(),
        algorithm: None,
    })
}

fn parse_colon(line: &str, asset_name: &str) -> Option<ChecksumEntry> {
    let (name, hex) = line.rsplit_once(':')?;
    let hex = hex.trim();
    if !is_hex(hex) || !same_file(name, asset_name) {
        return None;
    }
    Some(ChecksumEntry {
        hex: hex.to_string(),
        algorithm: None,
    })
}

fn same_file(listed: &str, asset_name: &str) -> bool {
    let listed = listed.trim();
    let base = listed.rsplit(['/', '\\']).next().unwrap_or(listed);
    base == asset_name
}

fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A checksum file chosen from the release assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredChecksum {
    /// Download URL of the checksum file
    pub url: String,
    /// Algorithm implied by the file name, if any
    pub algorithm: Option<HashAlgorithm>,
}

/// Pick the best checksum file for `asset` among the release's assets.
///
/// Ranking, best first: a per-asset file (`<asset>.sha256`, `<asset>.sha512`,
/// `<asset>.sha256sum`), a `SHA256SUMS`-style aggregate, then any name containing `checksum`.
/// Signature files are ignored. Ties keep release order.
#[must_use]
pub fn discover(release: &Release, asset: &Asset) -> Option<DiscoveredChecksum> {
    release
        .assets
        .iter()
        .filter(|candidate| candidate.name != asset.name)
        .filter_map(|candidate| rank(&candidate.name, &asset.name).map(|r| (r, candidate)))
        .min_by_key(|(r, _)| *r)
        .map(|(_, candidate)| DiscoveredChecksum {
            url: candidate.download_url.clone(),
            algorithm: algorithm_from_name(&candidate.name),
        })
}

fn rank(candidate: &str, asset_name: &str) -> Option<u8> {
    let lower = candidate.to_ascii_lowercase();
    if [".sig", ".asc", ".minisig", ".pem", ".zsync"].iter().any(|ext| lower.ends_with(ext)) {
        return None;
    }

    let asset_lower = asset_name.to_ascii_lowercase();
    for ext in [".sha256", ".sha512", ".sha256sum", ".sha512sum"] {
        if lower == format!("{asset_lower}{ext}") {
            return Some(0);
        }
    }
    if lower.contains("sha256sums") || lower.contains("sha512sums") {
        return Some(1);
    }
    if lower.contains("checksum") {
        return Some(2);
    }
    None
}

fn algorithm_from_name(name: &str) -> Option<HashAlgorithm> {
    let lower = name.to_ascii_lowercase();
    if lower.contains("sha512") {
        Some(HashAlgorithm::Sha512)
    } else if lower.contains("sha256") {
        Some(HashAlgorithm::Sha256)
    } else {
        None
    }
}
