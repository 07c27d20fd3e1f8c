//! Per-target results and batch summaries.

use crate::verification::VerificationOutcome;
use colored::Colorize;
use serde::Serialize;

/// Outcome of one install or update pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    /// The pipeline reached the persisted state
    pub success: bool,
    /// Package identifier
    pub name: String,
    /// Human-readable summary or failure reason
    pub message: String,
    /// Verification outcome, when the pipeline got that far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationOutcome>,
    /// Installed version on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PipelineResult {
    /// Successful result.
    #[must_use]
    pub fn success(
        name: impl Into<String>,
        version: impl Into<String>,
        message: impl Into<String>,
        verification: Option<VerificationOutcome>,
    ) -> Self {
        Self {
            success: true,
            name: name.into(),
            message: message.into(),
            verification,
            version: Some(version.into()),
        }
    }

    /// Failed result.
    #[must_use]
    pub fn failure(
        name: impl Into<String>,
        message: impl Into<String>,
        verification: Option<VerificationOutcome>,
    ) -> Self {
        Self {
            success: false,
            name: name.into(),
            message: message.into(),
            verification,
            version: None,
        }
    }

    /// Result for a target that never started because the batch was cancelled.
    #[must_use]
    pub fn cancelled(name: impl Into<String>) -> Self {
        Self::failure(name, "cancelled", None)
    }

    /// Whether this target was cancelled before running.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        !self.success && self.message == "cancelled"
    }
}

/// Aggregated result of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// One entry per pipeline that was scheduled
    pub results: Vec<PipelineResult>,
    /// Targets skipped because they are already installed or up to date
    pub already_installed: Vec<String>,
    /// Rejected inputs with the reason
    pub invalid: Vec<(String, String)>,
}

impl BatchReport {
    /// Number of successful pipelines.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Number of failed pipelines, cancellations included.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Whether nothing failed and no input was rejected.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0 && self.invalid.is_empty()
    }

    /// Result for `name`, if a pipeline ran for it.
    #[must_use]
    pub fn result_for(&self, name: &str) -> Option<&PipelineResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Print the summary to stdout.
    pub fn print_summary(&self, verb: &str) {
        let mut results = self.results.clone();
        results.sort_by(|a, b| a.name.cmp(&b.name));

        for result in &results {
            if result.success {
                println!("  {} {} {}", "✓".green(), result.name.bold(), result.message);
                if let Some(warning) =
                    result.verification.as_ref().and_then(|v| v.warning.as_deref())
                {
                    println!("    {} {}", "warning:".yellow(), warning);
                }
            } else {
                println!("  {} {} {}", "✗".red(), result.name.bold(), result.message.red());
            }
        }
        for name in &self.already_installed {
            println!("  {} {} already up to date", "-".dimmed(), name.bold());
        }
        for (input, reason) in &self.invalid {
            println!("  {} {} {}", "!".yellow(), input.bold(), reason);
        }

        let summary = format!("{} {verb}, {} failed", self.succeeded(), self.failed());
        if self.all_succeeded() {
            println!("{}", summary.green());
        } else {
            println!("{}", summary.yellow());
        }
    }
}
