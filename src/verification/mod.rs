//! Integrity verification for downloaded bundles.
//!
//! [`Verifier::verify`] runs an ordered chain against a downloaded file and records every step
//! in a [`VerificationOutcome`]:
//!
//! 1. **Skip** - the policy disables verification. A single `skip` entry is recorded and the
//!    outcome does not pass.
//! 2. **Digest** - the API published `"<algorithm>:<hex>"` for the asset. The file is hashed with
//!    that algorithm and compared.
//! 3. **Checksum file** - when no digest passed and a checksum file is configured or discovered,
//!    it is fetched and the entry for the asset compared. At most one `checksum_file` entry is
//!    recorded.
//! 4. **Size** - the file size is compared with the declared asset size. A mismatch only adds a
//!    warning.
//!
//! The outcome passes iff at least one non-skip method passed. A missing digest, a missing
//! checksum file or a missing entry are all recorded as `skipped`; only unreadable files and
//! malformed expected hashes are errors.

pub mod checksum_file;
pub mod hash;

pub use hash::{HashAlgorithm, hash_file, sha256_file};

use crate::github::{Asset, Release, ReleaseResolver, is_not_found};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Which verification method produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodType {
    /// Hash published by the release API
    Digest,
    /// Entry in a checksum file
    ChecksumFile,
    /// Nothing was checked
    Skip,
}

/// Result of a single verification method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodStatus {
    /// Hashes matched
    Passed,
    /// Hashes differed
    Failed,
    /// Method could not run for lack of data
    Skipped,
}

/// One step of the verification chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodResult {
    /// Method kind
    #[serde(rename = "type")]
    pub method: MethodType,
    /// Outcome
    pub status: MethodStatus,
    /// Hash algorithm used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<HashAlgorithm>,
    /// Expected hex digest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Hex digest computed from the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed: Option<String>,
    /// Where the expected value came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl MethodResult {
    fn skip(source: impl Into<String>) -> Self {
        Self {
            method: MethodType::Skip,
            status: MethodStatus::Skipped,
            algorithm: None,
            expected: None,
            computed: None,
            source: Some(source.into()),
        }
    }

    fn compared(
        method: MethodType,
        algorithm: HashAlgorithm,
        expected: String,
        computed: String,
        source: String,
    ) -> Self {
        let status =
            if expected == computed { MethodStatus::Passed } else { MethodStatus::Failed };
        Self {
            method,
            status,
            algorithm: Some(algorithm),
            expected: Some(expected),
            computed: Some(computed),
            source: Some(source),
        }
    }

    fn unavailable(method: MethodType, source: String) -> Self {
        Self {
            method,
            status: MethodStatus::Skipped,
            algorithm: None,
            expected: None,
            computed: None,
            source: Some(source),
        }
    }

    /// Whether this method verified the file.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.method != MethodType::Skip && self.status == MethodStatus::Passed
    }
}

/// Structured result of verifying one file.
///
/// `methods` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// At least one non-skip method passed
    pub overall_passed: bool,
    /// Method that produced the passing result, or the last one attempted
    pub actual_method: MethodType,
    /// Non-fatal note for the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Every method attempted, in order
    pub methods: Vec<MethodResult>,
    /// Outcome of the size comparison, when a size was declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_matched: Option<bool>,
}

impl VerificationOutcome {
    /// Outcome with a single `skip` entry.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            overall_passed: false,
            actual_method: MethodType::Skip,
            warning: None,
            methods: vec![MethodResult::skip(reason)],
            size_matched: None,
        }
    }

    /// Build an outcome from the attempted methods.
    ///
    /// An empty list becomes a single `skip` entry.
    #[must_use]
    pub fn from_methods(methods: Vec<MethodResult>) -> Self {
        if methods.is_empty() {
            return Self::skipped("no verification data available");
        }
        let passing = methods.iter().find(|m| m.passed()).map(|m| m.method);
        let actual_method = passing
            .or_else(|| methods.last().map(|m| m.method))
            .unwrap_or(MethodType::Skip);
        Self {
            overall_passed: passing.is_some(),
            actual_method,
            warning: None,
            methods,
            size_matched: None,
        }
    }

    /// Outcome recorded when a file is restored from a checksummed backup.
    #[must_use]
    pub fn from_backup(sha256: &str) -> Self {
        Self::from_methods(vec![MethodResult::compared(
            MethodType::Digest,
            HashAlgorithm::Sha256,
            sha256.to_string(),
            sha256.to_string(),
            "backup ledger".to_string(),
        )])
    }

    /// Whether any method failed a comparison.
    #[must_use]
    pub fn any_failed(&self) -> bool {
        self.methods.iter().any(|m| m.status == MethodStatus::Failed)
    }

    fn add_warning(&mut self, warning: String) {
        self.warning = Some(match self.warning.take() {
            Some(existing) => format!("{existing}; {warning}"),
            None => warning,
        });
    }
}

fn default_true() -> bool {
    true
}

/// Per-package verification settings, as stored in the catalog or URL overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    /// Disable verification entirely
    #[serde(default)]
    pub skip: bool,
    /// Checksum file name, URL or template (`{version}`, `{tag}`, `{asset_name}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_file: Option<String>,
    /// Algorithm used for the checksum file
    #[serde(default)]
    pub algorithm: HashAlgorithm,
    /// Compare against the digest published by the API
    #[serde(default = "default_true")]
    pub use_digest: bool,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            skip: false,
            checksum_file: None,
            algorithm: HashAlgorithm::Sha256,
            use_digest: true,
        }
    }
}

/// A [`VerificationPolicy`] rendered for one release asset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerificationPlan {
    /// Record a single skip entry and stop
    pub skip: bool,
    /// Resolved checksum file URL
    pub checksum_url: Option<String>,
    /// Algorithm for the checksum file
    pub algorithm: HashAlgorithm,
    /// Try the API digest first
    pub use_digest: bool,
}

impl VerificationPolicy {
    /// Render the policy for `asset` of `release`.
    ///
    /// A configured template is expanded; a bare file name resolves next to the asset and an
    /// `http(s)://` template is used verbatim. Without a template, checksum files among the
    /// release assets are discovered.
    #[must_use]
    pub fn plan(&self, release: &Release, asset: &Asset) -> VerificationPlan {
        if self.skip {
            return VerificationPlan {
                skip: true,
                algorithm: self.algorithm,
                ..VerificationPlan::default()
            };
        }

        let (checksum_url, algorithm) = match self.checksum_file.as_deref() {
            Some(template) => (Some(render_checksum_url(template, release, asset)), self.algorithm),
            None => match checksum_file::discover(release, asset) {
                Some(found) => (Some(found.url), found.algorithm.unwrap_or(self.algorithm)),
                None => (None, self.algorithm),
            },
        };

        VerificationPlan {
            skip: false,
            checksum_url,
            algorithm,
            use_digest: self.use_digest,
        }
    }
}

fn render_checksum_url(template: &str, release: &Release, asset: &Asset) -> String {
    let rendered = template
        .replace("{version}", &release.version)
        .replace("{tag}", &release.original_tag)
        .replace("{asset_name}", &asset.name);

    if rendered.starts_with("http://") || rendered.starts_with("https://") {
        return rendered;
    }
    if let Some(published) = release.asset_named(&rendered) {
        return published.download_url.clone();
    }
    match asset.download_url.rsplit_once('/') {
        Some((base, _)) => format!("{base}/{rendered}"),
        None => rendered,
    }
}

/// Runs the verification chain.
#[derive(Debug, Clone)]
pub struct Verifier {
    resolver: ReleaseResolver,
}

impl Verifier {
    /// Create a verifier fetching checksum files through `resolver`.
    #[must_use]
    pub const fn new(resolver: ReleaseResolver) -> Self {
        Self {
            resolver,
        }
    }

    /// Verify `file` against `asset` following `plan`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, an expected hash is malformed, or the
    /// checksum file cannot be fetched for a reason other than 404.
    pub async fn verify(
        &self,
        file: &Path,
        asset: &Asset,
        plan: &VerificationPlan,
    ) -> Result<VerificationOutcome> {
        if plan.skip {
            debug!("Verification disabled for {}", asset.name);
            let mut outcome = VerificationOutcome::skipped("verification disabled");
            check_size(file, asset, &mut outcome).await?;
            return Ok(outcome);
        }

        let mut methods = Vec::new();

        if plan.use_digest {
            if let Some(result) = verify_digest(file, asset).await? {
                methods.push(result);
            }
        }

        if !methods.iter().any(MethodResult::passed) {
            if let Some(url) = plan.checksum_url.as_deref() {
                methods.push(self.verify_checksum_file(file, asset, url, plan.algorithm).await?);
            }
        }

        let mut outcome = VerificationOutcome::from_methods(methods);
        check_size(file, asset, &mut outcome).await?;

        if outcome.overall_passed {
            info!("Verified {} via {:?}", asset.name, outcome.actual_method);
        } else if outcome.any_failed() {
            warn!("Verification failed for {}", asset.name);
        } else {
            outcome.add_warning(format!("{} could not be verified", asset.name));
        }
        Ok(outcome)
    }

    async fn verify_checksum_file(
        &self,
        file: &Path,
        asset: &Asset,
        url: &str,
        algorithm: HashAlgorithm,
    ) -> Result<MethodResult> {
        let content = match self.resolver.fetch_text(url).await {
            Ok(content) => content,
            Err(e) if is_not_found(&e) => {
                debug!("Checksum file {url} not found");
                return Ok(MethodResult::unavailable(MethodType::ChecksumFile, url.to_string()));
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to fetch checksum file {url}")),
        };

        let Some(entry) = checksum_file::find_entry(&content, &asset.name) else {
            debug!("No entry for {} in {url}", asset.name);
            return Ok(MethodResult::unavailable(MethodType::ChecksumFile, url.to_string()));
        };

        let algorithm = entry
            .algorithm
            .or_else(|| HashAlgorithm::from_hex_len(&entry.hex))
            .unwrap_or(algorithm);
        let expected = hash::normalize_hex(&entry.hex, algorithm)?;
        let computed = hash_file(file, algorithm).await?;
        Ok(MethodResult::compared(
            MethodType::ChecksumFile,
            algorithm,
            expected,
            computed,
            url.to_string(),
        ))
    }
}

async fn verify_digest(file: &Path, asset: &Asset) -> Result<Option<MethodResult>> {
    let Some((algorithm, hex)) = asset.digest_parts() else {
        return Ok(None);
    };
    let Ok(algorithm) = algorithm.parse::<HashAlgorithm>() else {
        debug!("Unsupported digest algorithm '{algorithm}' for {}", asset.name);
        return Ok(Some(MethodResult::unavailable(
            MethodType::Digest,
            format!("unsupported algorithm {algorithm}"),
        )));
    };
    let expected = hash::normalize_hex(hex, algorithm)?;
    let computed = hash_file(file, algorithm).await?;
    Ok(Some(MethodResult::compared(
        MethodType::Digest,
        algorithm,
        expected,
        computed,
        "github api".to_string(),
    )))
}

async fn check_size(file: &Path, asset: &Asset, outcome: &mut VerificationOutcome) -> Result<()> {
    if asset.size == 0 {
        return Ok(());
    }
    let actual = tokio::fs::metadata(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?
        .len();
    let matched = actual == asset.size;
    outcome.size_matched = Some(matched);
    if !matched {
        outcome.add_warning(format!(
            "size mismatch for {}: expected {} bytes, got {actual}",
            asset.name, asset.size
        ));
    }
    Ok(())
}
