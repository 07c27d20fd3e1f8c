//! Install/update orchestration.
//!
//! The [`Installer`] composes the release resolver, the verifier, the backup manager and the
//! state store. Each requested target runs one pipeline; pipelines for a
//! batch run concurrently up to the configured limit.
//!
//! # Batches
//!
//! - Every scheduled target produces exactly one [`PipelineResult`]; one failure never stops
//!   the others.
//! - Once the cancellation token fires no new pipeline starts. Targets that had not started
//!   report `"cancelled"`; pipelines already moving files finish that step.
//! - Only programmer-class errors abort a whole batch: a concurrency limit of zero and mixed
//!   URL/catalog targets.
//!
//! # Example
//!
//! ```rust,no_run
//! use appbox_cli::catalog::JsonCatalog;
//! use appbox_cli::config::GlobalConfig;
//! use appbox_cli::installer::Installer;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GlobalConfig::load().await?;
//! let catalog = JsonCatalog::load_optional(config.directories.catalog.as_deref()).await?;
//! let installer = Installer::new(&config, Arc::new(catalog))?;
//!
//! let report = installer.install(&["https://github.com/owner/tool".to_string()], false).await?;
//! report.print_summary("installed");
//! # Ok(())
//! # }
//! ```

pub mod desktop;
pub mod naming;
mod pipeline;
pub mod plan;
pub mod report;

pub use desktop::{DesktopIntegration, IconPolicy, NoopDesktop};
pub use naming::{NamingPolicy, clean_name};
pub use plan::{InstallPlan, InstallTarget, UrlTarget, parse_target, plan_targets};
pub use report::{BatchReport, PipelineResult};

use crate::backup::{BackupManager, BackupVersionRecord};
use crate::catalog::Catalog;
use crate::config::GlobalConfig;
use crate::core::AppboxError;
use crate::github::ReleaseResolver;
use crate::state::{AppState, PackageSource, StateStore};
use crate::utils::fs::remove_file_if_exists;
use crate::utils::progress::{NoopObserver, ProgressObserver};
use crate::verification::{VerificationOutcome, VerificationPolicy, Verifier};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use pipeline::{JobSource, PipelineJob};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of comparing one installed package with its latest release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateCheck {
    /// Package identifier
    pub name: String,
    /// Installed version
    pub installed_version: String,
    /// Latest release version, when it could be resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    /// A newer release exists
    pub update_available: bool,
    /// Why the latest release could not be resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One installed package, as shown by `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPackage {
    /// Package identifier
    pub name: String,
    /// `catalog` or `url`
    pub source: String,
    /// Installed version
    pub version: String,
    /// Path of the installed bundle
    pub installed_path: PathBuf,
    /// When the version was installed
    pub installed_date: DateTime<Utc>,
    /// Verification passed at install time
    pub verified: bool,
    /// Retained backup versions, newest first
    pub backups: Vec<String>,
}

/// Outcome of removing one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveResult {
    /// Package identifier
    pub name: String,
    /// The package was installed and has been removed
    pub removed: bool,
    /// Summary or failure reason
    pub message: String,
}

/// Coordinates install, update, removal and restore of packages.
pub struct Installer {
    resolver: ReleaseResolver,
    verifier: Verifier,
    backups: BackupManager,
    state: StateStore,
    catalog: Arc<dyn Catalog>,
    desktop: Arc<dyn DesktopIntegration>,
    observer: Arc<dyn ProgressObserver>,
    install_dir: PathBuf,
    download_dir: PathBuf,
    max_backups: usize,
    concurrency: usize,
    cancel: CancellationToken,
}

impl Installer {
    /// Build an installer from global configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &GlobalConfig, catalog: Arc<dyn Catalog>) -> Result<Self> {
        let resolver = ReleaseResolver::from_config(&config.network)?;
        Ok(Self::with_resolver(config, catalog, resolver))
    }

    /// Build an installer around an existing resolver; its cancellation token becomes the
    /// batch token.
    #[must_use]
    pub fn with_resolver(
        config: &GlobalConfig,
        catalog: Arc<dyn Catalog>,
        resolver: ReleaseResolver,
    ) -> Self {
        let dirs = &config.directories;
        Self {
            verifier: Verifier::new(resolver.clone()),
            cancel: resolver.cancellation_token().clone(),
            resolver,
            backups: BackupManager::new(dirs.backup.clone()),
            state: StateStore::new(dirs.state.clone()),
            catalog,
            desktop: Arc::new(NoopDesktop),
            observer: Arc::new(NoopObserver),
            install_dir: dirs.install.clone(),
            download_dir: dirs.download.clone(),
            max_backups: config.install.max_backups,
            concurrency: config.install.max_concurrent_downloads,
        }
    }

    /// Use `observer` for progress events.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Use `desktop` for desktop entries and icons.
    #[must_use]
    pub fn with_desktop(mut self, desktop: Arc<dyn DesktopIntegration>) -> Self {
        self.desktop = desktop;
        self
    }

    /// Override the number of concurrent pipelines.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Token that cancels running batches.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Backup manager used by this installer.
    #[must_use]
    pub const fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// State store used by this installer.
    #[must_use]
    pub const fn state(&self) -> &StateStore {
        &self.state
    }

    /// Classify `targets` without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::MixedTargets`] if URLs and catalog names are mixed.
    pub async fn plan(&self, targets: &[String], force: bool) -> Result<InstallPlan> {
        plan_targets(targets, self.catalog.as_ref(), &self.state, force).await
    }

    /// Install `targets`.
    ///
    /// Already-installed packages are skipped unless `force` is set, in which case they are
    /// reinstalled at the latest release.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::MixedTargets`] or [`AppboxError::InvalidConcurrency`]; every
    /// other failure is reported per target in the [`BatchReport`].
    pub async fn install(&self, targets: &[String], force: bool) -> Result<BatchReport> {
        self.check_concurrency()?;
        let plan = self.plan(targets, force).await?;

        let mut jobs = Vec::new();
        let mut invalid = plan.invalid;
        for url in plan.urls_needing_work {
            let package_id = url.package_id();
            match self.previous_state(&package_id).await {
                Ok(previous) => jobs.push(url_job(package_id, url.owner, url.repo, previous)),
                Err(e) => invalid.push((url.input, format!("{e:#}"))),
            }
        }
        for name in plan.catalog_targets_needing_work {
            let package_id = name.to_ascii_lowercase();
            let previous = match self.previous_state(&package_id).await {
                Ok(previous) => previous,
                Err(e) => {
                    invalid.push((name, format!("{e:#}")));
                    continue;
                }
            };
            match self.catalog_job(&package_id, previous) {
                Ok(job) => jobs.push(job),
                Err(e) => invalid.push((name, e.to_string())),
            }
        }

        let results = self.run_batch(jobs).await?;
        Ok(BatchReport {
            results,
            already_installed: plan.already_installed,
            invalid,
        })
    }

    /// Compare installed packages with their latest releases. An empty `names` checks every
    /// installed package.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::InvalidConcurrency`] or an error if the state directory cannot be
    /// listed. Per-package failures are reported in [`UpdateCheck::error`].
    pub async fn check_updates(&self, names: &[String]) -> Result<Vec<UpdateCheck>> {
        let (checks, _, _) = self.collect_updates(names).await?;
        Ok(checks)
    }

    /// Update installed packages. An empty `names` updates everything.
    ///
    /// Packages already at the latest release are listed as up to date unless `force` is set,
    /// which reinstalls them.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::InvalidConcurrency`] or an error if the state directory cannot be
    /// listed.
    pub async fn update(&self, names: &[String], force: bool) -> Result<BatchReport> {
        let (checks, mut jobs, mut invalid) = self.collect_updates(names).await?;
        let mut up_to_date = Vec::new();

        for check in &checks {
            if let Some(error) = &check.error {
                invalid.push((check.name.clone(), error.clone()));
            }
        }
        jobs.retain(|job| {
            let available = checks
                .iter()
                .any(|c| c.name == job.package_id && c.update_available);
            if !available && !force {
                up_to_date.push(job.package_id.clone());
            }
            available || force
        });

        let results = self.run_batch(jobs).await?;
        Ok(BatchReport {
            results,
            already_installed: up_to_date,
            invalid,
        })
    }

    /// Resolve the latest release of each requested package concurrently. Returns the checks,
    /// a ready job (with its release attached) per resolvable package, and rejected names.
    async fn collect_updates(
        &self,
        names: &[String],
    ) -> Result<(Vec<UpdateCheck>, Vec<PipelineJob>, Vec<(String, String)>)> {
        self.check_concurrency()?;
        let ids = if names.is_empty() {
            self.state.list_ids().await?
        } else {
            dedup_lowercase(names)
        };

        let mut invalid = Vec::new();
        let mut jobs = Vec::new();
        for id in ids {
            match self.state.load(&id).await {
                Ok(Some(previous)) => match self.job_for_installed(&id, previous) {
                    Ok(job) => jobs.push(job),
                    Err(e) => invalid.push((id, e.to_string())),
                },
                Ok(None) => invalid.push((
                    id.clone(),
                    AppboxError::PackageNotFound {
                        name: id,
                    }
                    .to_string(),
                )),
                Err(e) => invalid.push((id, format!("{e:#}"))),
            }
        }

        let resolved: Vec<(UpdateCheck, PipelineJob)> = stream::iter(jobs)
            .map(|mut job| async move {
                let installed_version =
                    job.previous.as_ref().map(|p| p.state.version.clone()).unwrap_or_default();
                let check = match self.resolve_release(&job).await {
                    Ok(release) => {
                        let update_available = job
                            .previous
                            .as_ref()
                            .is_some_and(|previous| Self::needs_update(previous, &release));
                        let check = UpdateCheck {
                            name: job.package_id.clone(),
                            installed_version,
                            latest_version: Some(release.version.clone()),
                            update_available,
                            error: None,
                        };
                        job.release = Some(release);
                        check
                    }
                    Err(e) => UpdateCheck {
                        name: job.package_id.clone(),
                        installed_version,
                        latest_version: None,
                        update_available: false,
                        error: Some(format!("{e:#}")),
                    },
                };
                (check, job)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut checks = Vec::with_capacity(resolved.len());
        let mut ready = Vec::new();
        for (check, job) in resolved {
            if job.release.is_some() {
                ready.push(job);
            }
            checks.push(check);
        }
        checks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok((checks, ready, invalid))
    }

    /// Remove installed packages: the bundle, desktop integration and state record, plus all
    /// backups unless `keep_backups` is set.
    ///
    /// # Errors
    ///
    /// Per-package failures are reported in the results; this never fails as a whole.
    pub async fn remove(&self, names: &[String], keep_backups: bool) -> Result<Vec<RemoveResult>> {
        let mut results = Vec::new();
        for id in dedup_lowercase(names) {
            let result = match self.remove_one(&id, keep_backups).await {
                Ok(true) => RemoveResult {
                    name: id,
                    removed: true,
                    message: "removed".to_string(),
                },
                Ok(false) => RemoveResult {
                    message: AppboxError::PackageNotFound {
                        name: id.clone(),
                    }
                    .to_string(),
                    name: id,
                    removed: false,
                },
                Err(e) => RemoveResult {
                    name: id,
                    removed: false,
                    message: format!("{e:#}"),
                },
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn remove_one(&self, id: &str, keep_backups: bool) -> Result<bool> {
        let Some(state) = self.state.load(id).await? else {
            return Ok(false);
        };

        let path = state.state.installed_path.clone();
        let existed = tokio::task::spawn_blocking(move || remove_file_if_exists(&path))
            .await
            .context("Remove task panicked")??;
        if !existed {
            debug!("{id}: installed file was already gone");
        }
        if let Err(e) = self.desktop.remove(id) {
            warn!("{id}: failed to remove desktop integration: {e:#}");
        }
        if !keep_backups {
            self.backups.cleanup(id, 0).await?;
        }
        self.state.remove(id).await?;
        info!("Removed {id}");
        Ok(true)
    }

    /// Every installed package, sorted by name.
    ///
    /// Records that cannot be loaded are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be listed.
    pub async fn list_installed(&self) -> Result<Vec<InstalledPackage>> {
        let mut packages = Vec::new();
        for id in self.state.list_ids().await? {
            let state = match self.state.load(&id).await {
                Ok(Some(state)) => state,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping {id}: {e:#}");
                    continue;
                }
            };
            let backups = self.backups.list_versions(&id).await.unwrap_or_default();
            packages.push(InstalledPackage {
                source: state.source.kind().to_string(),
                version: state.state.version,
                installed_path: state.state.installed_path,
                installed_date: state.state.installed_date,
                verified: state.state.verification.overall_passed,
                backups,
                name: id,
            });
        }
        Ok(packages)
    }

    /// Restore `version` of an installed package from its backups.
    ///
    /// The current version is backed up first (when it differs), the backup is verified
    /// against its ledger checksum before the live file is touched, and the state record is
    /// updated to the restored version. Restoring the same version again gives the same result.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::PackageNotFound`] if the package is not installed, or
    /// [`AppboxError::BackupNotFound`]/[`AppboxError::BackupIntegrity`] from the backup.
    pub async fn restore(&self, name: &str, version: &str) -> Result<BackupVersionRecord> {
        let id = name.to_ascii_lowercase();
        let mut state = self.state.load(&id).await?.ok_or_else(|| AppboxError::PackageNotFound {
            name: name.to_string(),
        })?;

        self.backups.verify_backup(&id, version).await?;

        let installed = state.state.installed_path.clone();
        if state.state.version != version && installed.exists() {
            self.backups
                .create_backup(&installed, &id, &state.state.version)
                .await
                .context("Failed to back up the current version before restoring")?;
        }

        let (path, record) = self.backups.restore(&id, version, &installed).await?;
        state.state.version = record.version.clone();
        state.state.installed_path = path;
        state.state.installed_date = Utc::now();
        state.state.verification = VerificationOutcome::from_backup(&record.sha256);
        self.state.save(&id, &state).await?;

        if let Err(e) = self.backups.cleanup_keeping(&id, self.max_backups, Some(version)).await {
            warn!("{id}: backup retention failed: {e:#}");
        }
        info!("Restored {id} to {version}");
        Ok(record)
    }

    /// Run `jobs` with bounded concurrency and collect one result per job.
    async fn run_batch(&self, jobs: Vec<PipelineJob>) -> Result<Vec<PipelineResult>> {
        self.check_concurrency()?;
        let results = stream::iter(jobs)
            .map(|job| async move {
                if self.cancel.is_cancelled() {
                    return PipelineResult::cancelled(job.package_id);
                }
                self.run_pipeline(job).await
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        Ok(results)
    }

    fn check_concurrency(&self) -> Result<(), AppboxError> {
        if self.concurrency == 0 {
            return Err(AppboxError::InvalidConcurrency {
                value: self.concurrency,
            });
        }
        Ok(())
    }

    async fn previous_state(&self, package_id: &str) -> Result<Option<AppState>> {
        self.state.load(package_id).await
    }

    fn catalog_job(&self, package_id: &str, previous: Option<AppState>) -> Result<PipelineJob, AppboxError> {
        let entry = self.catalog.get_entry(package_id).ok_or_else(|| {
            AppboxError::PackageNotFound {
                name: package_id.to_string(),
            }
        })?;
        Ok(PipelineJob {
            package_id: package_id.to_string(),
            owner: entry.owner,
            repo: entry.repo,
            source: JobSource::Catalog {
                catalog_ref: entry.name,
            },
            prefer_prerelease: entry.prerelease,
            verification: entry.verification,
            naming: entry.naming,
            icon: entry.icon,
            previous,
            release: None,
        })
    }

    fn job_for_installed(&self, package_id: &str, previous: AppState) -> Result<PipelineJob, AppboxError> {
        match &previous.source {
            PackageSource::Catalog {
                catalog_ref,
            } => {
                let catalog_ref = catalog_ref.clone();
                let mut job = self.catalog_job(&catalog_ref, Some(previous))?;
                job.package_id = package_id.to_string();
                Ok(job)
            }
            PackageSource::Url {
                overrides,
            } => {
                let mut job = url_job(
                    package_id.to_string(),
                    overrides.owner.clone(),
                    overrides.repo.clone(),
                    None,
                );
                job.verification = overrides.verification.clone();
                job.naming = overrides.naming.clone();
                job.previous = Some(previous);
                Ok(job)
            }
        }
    }
}

fn url_job(package_id: String, owner: String, repo: String, previous: Option<AppState>) -> PipelineJob {
    PipelineJob {
        package_id,
        owner,
        repo,
        source: JobSource::Url,
        prefer_prerelease: false,
        verification: VerificationPolicy::default(),
        naming: NamingPolicy::default(),
        icon: IconPolicy::default(),
        previous,
        release: None,
    }
}

fn dedup_lowercase(names: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .map(|n| n.trim().to_ascii_lowercase())
        .filter(|n| !n.is_empty() && seen.insert(n.clone()))
        .collect()
}
