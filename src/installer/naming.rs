//! Installed file naming.

use crate::constants::BUNDLE_EXTENSION;
use serde::{Deserialize, Serialize};

/// How the installed file is named and which asset suffixes identify the right build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingPolicy {
    /// Installed file name; the package name when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    /// Asset name fragments to prefer, in order; the architecture defaults when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub characteristic_suffixes: Vec<String>,
}

impl NamingPolicy {
    /// Final file name for `package_id`.
    #[must_use]
    pub fn file_name(&self, package_id: &str) -> String {
        clean_name(self.target_name.as_deref().unwrap_or(package_id))
    }

    /// Suffixes for asset selection, falling back to the running architecture.
    #[must_use]
    pub fn suffixes(&self) -> Vec<String> {
        if self.characteristic_suffixes.is_empty() {
            crate::github::default_arch_suffixes()
        } else {
            self.characteristic_suffixes.clone()
        }
    }
}

/// Strip any bundle extension (case-insensitive) and append the canonical one.
#[must_use]
pub fn clean_name(name: &str) -> String {
    let trimmed = name.trim();
    let extension_len = BUNDLE_EXTENSION.len();
    let stem = if trimmed.len() >= extension_len
        && trimmed.is_char_boundary(trimmed.len() - extension_len)
        && trimmed[trimmed.len() - extension_len..].eq_ignore_ascii_case(BUNDLE_EXTENSION)
    {
        &trimmed[..trimmed.len() - extension_len]
    } else {
        trimmed
    };
    format!("{stem}{BUNDLE_EXTENSION}")
}
