//! Version ordering for backups and update checks.
//!
//! Versions are compared as semver after stripping a leading `v` and padding missing minor or
//! patch components (`1.2` becomes `1.2.0`). When any version in a list fails to parse, the whole
//! list is ordered lexicographically instead so the order stays total.

use semver::Version;
use std::cmp::{Ordering, Reverse};

/// Parse a loosely formatted version.
#[must_use]
pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);
    let parts = core.split('.').count();
    if core.is_empty() || parts >= 3 {
        return None;
    }
    let padded = match parts {
        1 => format!("{core}.0.0{suffix}"),
        _ => format!("{core}.0{suffix}"),
    };
    Version::parse(&padded).ok()
}

/// Sort `versions` newest first.
pub fn sort_newest_first(versions: &mut [String]) {
    if versions.iter().all(|v| parse_version(v).is_some()) {
        versions.sort_by_cached_key(|v| Reverse(parse_version(v)));
    } else {
        versions.sort_by(|a, b| b.cmp(a));
    }
}

/// Compare two versions, falling back to string comparison if either does not parse.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Whether `candidate` should replace `installed`.
///
/// Unparseable versions count as newer whenever they differ.
#[must_use]
pub fn is_newer(candidate: &str, installed: &str) -> bool {
    match (parse_version(candidate), parse_version(installed)) {
        (Some(c), Some(i)) => c > i,
        _ => candidate.trim() != installed.trim(),
    }
}
