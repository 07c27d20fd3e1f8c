//! Progress reporting for install and update batches.
//!
//! Pipelines report through the [`ProgressObserver`] trait, a side channel that never affects
//! control flow. The CLI plugs in [`BatchProgress`], which renders one `indicatif` line per
//! package inside a shared [`MultiProgress`]; library callers and tests use [`NoopObserver`].
//!
//! Progress output is suppressed when `--no-progress`/`--quiet` is passed or the
//! `APPBOX_NO_PROGRESS` environment variable is set.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Pipeline stage reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Querying the release API
    Resolving,
    /// Streaming the asset to the staging directory
    Downloading,
    /// Running the integrity chain
    Verifying,
    /// Backing up the currently installed file
    BackingUp,
    /// Moving the new file into place
    Installing,
    /// Writing the package state record
    Saving,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Resolving => "resolving",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::BackingUp => "backing up",
            Self::Installing => "installing",
            Self::Saving => "saving state",
        };
        f.write_str(label)
    }
}

/// Receives stage transitions and download progress from running pipelines.
///
/// Implementations must be cheap; they are called from inside the download loop.
pub trait ProgressObserver: Send + Sync {
    /// A pipeline entered `stage`.
    fn stage(&self, package: &str, stage: Stage);

    /// A download started; `total` is the expected size when known.
    fn download_started(&self, _package: &str, _total: Option<u64>) {}

    /// `downloaded` bytes have been written so far.
    fn download_progress(&self, _package: &str, _downloaded: u64) {}

    /// The pipeline finished, successfully or not.
    fn finished(&self, _package: &str, _success: bool, _message: &str) {}
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn stage(&self, _package: &str, _stage: Stage) {}
}

/// Checks whether progress output is disabled through the environment.
#[must_use]
pub fn is_progress_disabled() -> bool {
    std::env::var_os("APPBOX_NO_PROGRESS").is_some()
}

/// `indicatif` renderer with one line per package.
pub struct BatchProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl BatchProgress {
    /// Create a renderer; `enabled = false` draws nothing.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        let multi = if enabled && !is_progress_disabled() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn with_bar(&self, package: &str, f: impl FnOnce(&ProgressBar)) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        let bar = bars.entry(package.to_string()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new_spinner());
            bar.set_style(spinner_style());
            bar.set_prefix(package.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(100));
            bar
        });
        f(bar);
    }
}

impl ProgressObserver for BatchProgress {
    fn stage(&self, package: &str, stage: Stage) {
        self.with_bar(package, |bar| {
            if stage != Stage::Downloading {
                bar.set_style(spinner_style());
            }
            bar.set_message(stage.to_string());
        });
    }

    fn download_started(&self, package: &str, total: Option<u64>) {
        self.with_bar(package, |bar| {
            if let Some(total) = total {
                bar.set_length(total);
                bar.set_position(0);
                bar.set_style(download_style());
            }
        });
    }

    fn download_progress(&self, package: &str, downloaded: u64) {
        self.with_bar(package, |bar| bar.set_position(downloaded));
    }

    fn finished(&self, package: &str, success: bool, message: &str) {
        self.with_bar(package, |bar| {
            bar.set_style(spinner_style());
            let mark = if success { "✓" } else { "✗" };
            bar.finish_with_message(format!("{mark} {message}"));
        });
    }
}

fn download_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━╸━")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(Stage::BackingUp.to_string(), "backing up");
        assert_eq!(Stage::Saving.to_string(), "saving state");
    }

    #[test]
    fn test_hidden_progress_accepts_events() {
        let progress = BatchProgress::new(false);
        progress.stage("app", Stage::Resolving);
        progress.download_started("app", Some(100));
        progress.download_progress("app", 50);
        progress.finished("app", true, "installed 1.0.0");
        assert_eq!(progress.bars.lock().unwrap().len(), 1);
    }
}
