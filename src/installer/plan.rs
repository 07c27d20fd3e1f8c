//! Classification of requested install targets.
//!
//! A target is either a GitHub repository URL or a catalog name; one invocation may not mix
//! the two. Targets already installed are set aside before any network work starts.

use crate::catalog::Catalog;
use crate::core::AppboxError;
use crate::state::StateStore;
use anyhow::Result;
use std::collections::HashSet;

/// One parsed target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallTarget {
    /// `https://github.com/<owner>/<repo>`
    Url(UrlTarget),
    /// Catalog name
    Catalog(String),
}

/// A repository URL target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTarget {
    /// Input as given
    pub input: String,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
}

impl UrlTarget {
    /// Package identifier: the repository name, lowercased.
    #[must_use]
    pub fn package_id(&self) -> String {
        self.repo.to_ascii_lowercase()
    }
}

impl InstallTarget {
    /// Package identifier the target installs as.
    #[must_use]
    pub fn package_id(&self) -> String {
        match self {
            Self::Url(url) => url.package_id(),
            Self::Catalog(name) => name.to_ascii_lowercase(),
        }
    }
}

/// Parse a target string.
///
/// # Errors
///
/// Returns [`AppboxError::InvalidTarget`] if the input is neither a GitHub repository URL nor a
/// plausible catalog name.
pub fn parse_target(input: &str) -> Result<InstallTarget, AppboxError> {
    let trimmed = input.trim();
    let invalid = |reason: &str| AppboxError::InvalidTarget {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .or_else(|| trimmed.starts_with("github.com/").then_some(trimmed));

    if let Some(rest) = without_scheme {
        let rest = rest.strip_prefix("www.").unwrap_or(rest);
        let Some(path) = rest.strip_prefix("github.com/") else {
            return Err(invalid("only github.com repositories are supported"));
        };
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let (Some(owner), Some(repo)) = (segments.next(), segments.next()) else {
            return Err(invalid("expected https://github.com/<owner>/<repo>"));
        };
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if !is_valid_name(owner) || !is_valid_name(repo) {
            return Err(invalid("owner and repository may only contain [A-Za-z0-9._-]"));
        }
        return Ok(InstallTarget::Url(UrlTarget {
            input: trimmed.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        }));
    }

    if trimmed.contains("://") {
        return Err(invalid("only https://github.com URLs are supported"));
    }
    if trimmed.contains('/') {
        return Err(invalid("use the full https://github.com/<owner>/<repo> URL"));
    }
    if !is_valid_name(trimmed) {
        return Err(invalid("catalog names may only contain [A-Za-z0-9._-]"));
    }
    Ok(InstallTarget::Catalog(trimmed.to_string()))
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Targets split by the work they need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallPlan {
    /// URL targets to install
    pub urls_needing_work: Vec<UrlTarget>,
    /// Catalog names to install
    pub catalog_targets_needing_work: Vec<String>,
    /// Package ids that are already installed
    pub already_installed: Vec<String>,
    /// Rejected inputs with the reason
    pub invalid: Vec<(String, String)>,
}

impl InstallPlan {
    /// Whether any target needs installing.
    #[must_use]
    pub fn has_work(&self) -> bool {
        !self.urls_needing_work.is_empty() || !self.catalog_targets_needing_work.is_empty()
    }
}

/// Classify `targets`.
///
/// Duplicate targets (by package id) are planned once. With `force`, installed packages are
/// planned again instead of being reported as already installed.
///
/// # Errors
///
/// Returns [`AppboxError::MixedTargets`] if URLs and catalog names are mixed.
pub async fn plan_targets(
    targets: &[String],
    catalog: &dyn Catalog,
    store: &StateStore,
    force: bool,
) -> Result<InstallPlan> {
    let mut plan = InstallPlan::default();
    let mut parsed = Vec::new();
    for input in targets {
        match parse_target(input) {
            Ok(target) => parsed.push(target),
            Err(e) => plan.invalid.push((input.clone(), e.to_string())),
        }
    }

    let has_url = parsed.iter().any(|t| matches!(t, InstallTarget::Url(_)));
    let has_catalog = parsed.iter().any(|t| matches!(t, InstallTarget::Catalog(_)));
    if has_url && has_catalog {
        return Err(AppboxError::MixedTargets.into());
    }

    let mut seen = HashSet::new();
    for target in parsed {
        let package_id = target.package_id();
        if !seen.insert(package_id.clone()) {
            continue;
        }

        if let InstallTarget::Catalog(name) = &target {
            if catalog.get_entry(name).is_none() {
                let suggestions = catalog.suggestions(name);
                let reason = if suggestions.is_empty() {
                    AppboxError::PackageNotFound {
                        name: name.clone(),
                    }
                    .to_string()
                } else {
                    format!("not in catalog, did you mean {}?", suggestions.join(", "))
                };
                plan.invalid.push((name.clone(), reason));
                continue;
            }
        }

        if !force {
            match store.load(&package_id).await {
                Ok(Some(_)) => {
                    plan.already_installed.push(package_id);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    plan.invalid.push((package_id, format!("{e:#}")));
                    continue;
                }
            }
        }

        match target {
            InstallTarget::Url(url) => plan.urls_needing_work.push(url),
            InstallTarget::Catalog(name) => plan.catalog_targets_needing_work.push(name),
        }
    }
    Ok(plan)
}
