//! The per-target install pipeline.
//!
//! ```text
//! Resolved -> Downloaded -> Verified -> PreviousBackedUp -> Installed -> StatePersisted
//! ```
//!
//! Steps run strictly in order and any failure ends the pipeline. The live file is only
//! replaced after the download has been verified and the previous version backed up, so a
//! failed pipeline leaves the existing install as it was.

use super::Installer;
use super::desktop::IconPolicy;
use super::naming::NamingPolicy;
use super::report::PipelineResult;
use crate::backup::is_newer;
use crate::core::AppboxError;
use crate::github::{Release, require_asset};
use crate::state::{AppState, IconState, InstalledState, PackageSource, UrlOverrides};
use crate::utils::fs::{move_file, remove_file_if_exists, set_executable};
use crate::utils::progress::Stage;
use crate::verification::{VerificationOutcome, VerificationPolicy};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use tracing::{debug, info, warn};

/// Where a job's coordinates came from; becomes the persisted [`PackageSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobSource {
    Catalog {
        catalog_ref: String,
    },
    Url,
}

/// Everything one pipeline needs, fixed before it starts.
#[derive(Debug, Clone)]
pub(crate) struct PipelineJob {
    pub package_id: String,
    pub owner: String,
    pub repo: String,
    pub source: JobSource,
    pub prefer_prerelease: bool,
    pub verification: VerificationPolicy,
    pub naming: NamingPolicy,
    pub icon: IconPolicy,
    /// State of the currently installed version, if any
    pub previous: Option<AppState>,
    /// Release resolved earlier (update checks); resolved in the pipeline when `None`
    pub release: Option<Release>,
}

impl Installer {
    /// Run one pipeline. Never returns an error; failures become the target's result.
    pub(crate) async fn run_pipeline(&self, job: PipelineJob) -> PipelineResult {
        let package_id = job.package_id.clone();
        let mut verification = None;

        let result = match self.execute(job, &mut verification).await {
            Ok(result) => result,
            Err(e) => {
                let message = match e.downcast_ref::<AppboxError>() {
                    Some(AppboxError::Cancelled) => "cancelled".to_string(),
                    _ => format!("{e:#}"),
                };
                warn!("{package_id}: {message}");
                PipelineResult::failure(&package_id, message, verification)
            }
        };
        self.observer.finished(&package_id, result.success, &result.message);
        result
    }

    async fn execute(
        &self,
        job: PipelineJob,
        verification: &mut Option<VerificationOutcome>,
    ) -> Result<PipelineResult> {
        let id = job.package_id.as_str();

        // Resolved
        let release = match job.release.clone() {
            Some(release) => release,
            None => {
                self.observer.stage(id, Stage::Resolving);
                self.resolve_release(&job).await?
            }
        };
        if release.prerelease_fallback {
            info!("{id}: no stable release of {}/{}, using prerelease {}", job.owner, job.repo, release.version);
        }
        let asset = require_asset(&release, &job.naming.suffixes())?;
        debug!("{id}: selected asset {} from {}", asset.name, release.original_tag);

        if self.cancel.is_cancelled() {
            return Err(AppboxError::Cancelled.into());
        }

        // Downloaded
        self.observer.stage(id, Stage::Downloading);
        let staging = self.download_dir.join(id).join(&asset.name);
        let downloaded =
            self.resolver.download(&asset, &staging, id, self.observer.as_ref()).await?;

        // Verified
        self.observer.stage(id, Stage::Verifying);
        let plan = job.verification.plan(&release, &asset);
        let outcome = match self.verifier.verify(&downloaded, &asset, &plan).await {
            Ok(outcome) => outcome,
            Err(e) => {
                discard(&downloaded).await;
                return Err(e);
            }
        };
        *verification = Some(outcome.clone());
        if !outcome.overall_passed && outcome.any_failed() {
            discard(&downloaded).await;
            return Err(AppboxError::VerificationFailed {
                name: asset.name.clone(),
                method: method_label(&outcome),
            }
            .into());
        }

        // PreviousBackedUp
        if let Some(previous) = &job.previous {
            let installed = &previous.state.installed_path;
            if installed.exists() {
                self.observer.stage(id, Stage::BackingUp);
                if let Err(e) =
                    self.backups.create_backup(installed, id, &previous.state.version).await
                {
                    discard(&downloaded).await;
                    return Err(e).context("Failed to back up the installed version");
                }
                if let Err(e) = self.backups.cleanup(id, self.max_backups).await {
                    warn!("{id}: backup retention failed: {e:#}");
                }
            }
        }

        // Installed
        self.observer.stage(id, Stage::Installing);
        let target = self.install_dir.join(job.naming.file_name(id));
        let stale = job
            .previous
            .as_ref()
            .map(|p| p.state.installed_path.clone())
            .filter(|path| *path != target);
        let moved_target = target.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            move_file(&downloaded, &moved_target)?;
            set_executable(&moved_target)?;
            if let Some(stale) = stale {
                remove_file_if_exists(&stale)?;
            }
            Ok(())
        })
        .await
        .context("Install task panicked")??;
        let _ = tokio::fs::remove_dir(self.download_dir.join(id)).await;

        let icon = match self.desktop.integrate(id, &target, &job.icon) {
            Ok(icon) => icon,
            Err(e) => {
                warn!("{id}: desktop integration failed: {e:#}");
                IconState::default()
            }
        };

        // StatePersisted
        self.observer.stage(id, Stage::Saving);
        let source = match &job.source {
            JobSource::Catalog {
                catalog_ref,
            } => PackageSource::Catalog {
                catalog_ref: catalog_ref.clone(),
            },
            JobSource::Url => PackageSource::Url {
                overrides: UrlOverrides {
                    owner: job.owner.clone(),
                    repo: job.repo.clone(),
                    prerelease: release.prerelease,
                    verification: job.verification.clone(),
                    naming: job.naming.clone(),
                },
            },
        };
        let state = AppState::new(
            source,
            InstalledState {
                version: release.version.clone(),
                installed_date: Utc::now(),
                installed_path: target,
                verification: outcome.clone(),
                icon,
            },
        );
        self.state.save(id, &state).await?;

        let message = match &job.previous {
            Some(previous) if previous.state.version != release.version => {
                format!("updated {} -> {}", previous.state.version, release.version)
            }
            Some(_) => format!("reinstalled {}", release.version),
            None => format!("installed {}", release.version),
        };
        info!("{id}: {message}");
        Ok(PipelineResult::success(id, &release.version, message, Some(outcome)))
    }

    /// Catalog packages follow their configured channel; URL packages take the latest stable
    /// release and fall back to the newest prerelease.
    pub(crate) async fn resolve_release(&self, job: &PipelineJob) -> Result<Release> {
        match job.source {
            JobSource::Catalog {
                ..
            } => self.resolver.resolve(&job.owner, &job.repo, job.prefer_prerelease).await,
            JobSource::Url => self.resolver.resolve_for_url(&job.owner, &job.repo).await,
        }
    }

    /// Whether `release` should replace the installed version.
    pub(crate) fn needs_update(previous: &AppState, release: &Release) -> bool {
        is_newer(&release.version, &previous.state.version)
    }
}

fn method_label(outcome: &VerificationOutcome) -> String {
    let method = outcome
        .methods
        .iter()
        .find(|m| m.status == crate::verification::MethodStatus::Failed)
        .map_or(outcome.actual_method, |m| m.method);
    serde_json::to_value(method)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{method:?}"))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!("Failed to remove {}: {e}", path.display());
    }
}
