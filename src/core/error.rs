//! Error handling for appbox
//!
//! This module provides the error taxonomy and user-friendly error reporting for appbox.
//! The error system follows two rules:
//! 1. **Strongly-typed errors** for the failure modes callers branch on (retry decisions,
//!    integrity aborts, schema mismatches)
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`AppboxError`] - Enumerated error types for all failure cases
//! - [`ErrorContext`] - Wrapper that adds user-friendly details and suggestions
//!
//! Most functions return [`anyhow::Result`] and attach context with `.context(...)`. Typed
//! variants are raised with `anyhow::Error::from(AppboxError::...)` wherever a caller needs to
//! recover the variant via `downcast_ref`.
//!
//! # Expected absence is not an error
//!
//! A release asset without a published digest, a release without a checksum file, or a
//! verification that simply does not match are all *normal* outcomes recorded in a
//! [`VerificationOutcome`](crate::verification::VerificationOutcome). Only unreadable files and
//! malformed expected hashes surface as [`AppboxError::Verification`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use appbox_cli::core::{AppboxError, user_friendly_error};
//!
//! let error = AppboxError::ConfigVersion {
//!     package: "firefox".to_string(),
//!     found: 1,
//!     expected: 2,
//! };
//! let context = user_friendly_error(anyhow::Error::from(error));
//! context.display(); // Shows colored error with a "migrate" suggestion
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for appbox operations.
///
/// # Error Categories
///
/// ## Network
/// - [`NetworkTransient`] - Timeouts, connection resets, 5xx responses (retried)
/// - [`NotFound`] - Definitive 404 from the hosting API (never retried)
/// - [`MalformedResponse`] - Response body could not be decoded (never retried)
/// - [`RateLimited`] - API quota exhausted and the reset lies beyond the wait cap
///
/// ## Release content
/// - [`AssetNotFound`] - Release contains no installable bundle
///
/// ## Integrity
/// - [`Verification`] - Hash input malformed or file unreadable
/// - [`VerificationFailed`] - Downloaded file failed every applicable check
/// - [`BackupIntegrity`] - Backup bytes no longer match the ledger
/// - [`BackupNotFound`] - Requested backup version is not retained
///
/// ## State and input
/// - [`ConfigVersion`] - Persisted state uses an older schema
/// - [`PackageNotFound`] - Package is neither installed nor in the catalog
/// - [`InvalidTarget`] - Target string is neither a catalog name nor a GitHub URL
/// - [`MixedTargets`] - One invocation mixed URLs and catalog names
/// - [`InvalidConcurrency`] - Worker pool size of zero
/// - [`Cancelled`] - Batch was interrupted before this target started
///
/// [`NetworkTransient`]: AppboxError::NetworkTransient
/// [`NotFound`]: AppboxError::NotFound
/// [`MalformedResponse`]: AppboxError::MalformedResponse
/// [`RateLimited`]: AppboxError::RateLimited
/// [`AssetNotFound`]: AppboxError::AssetNotFound
/// [`Verification`]: AppboxError::Verification
/// [`VerificationFailed`]: AppboxError::VerificationFailed
/// [`BackupIntegrity`]: AppboxError::BackupIntegrity
/// [`BackupNotFound`]: AppboxError::BackupNotFound
/// [`ConfigVersion`]: AppboxError::ConfigVersion
/// [`PackageNotFound`]: AppboxError::PackageNotFound
/// [`InvalidTarget`]: AppboxError::InvalidTarget
/// [`MixedTargets`]: AppboxError::MixedTargets
/// [`InvalidConcurrency`]: AppboxError::InvalidConcurrency
/// [`Cancelled`]: AppboxError::Cancelled
#[derive(Error, Debug)]
pub enum AppboxError {
    /// Transient network failure (timeout, connection error, server error).
    ///
    /// Retried by the resolver's retry policy; surfaced only once all attempts are spent.
    #[error("Network error during {operation}: {reason}")]
    NetworkTransient {
        /// The network operation that failed (e.g., "fetch latest release")
        operation: String,
        /// Reason for the network failure
        reason: String,
    },

    /// The hosting API answered 404 for the requested resource.
    #[error("Not found: {resource}")]
    NotFound {
        /// Description of the missing resource
        resource: String,
    },

    /// The hosting API returned a body that could not be decoded.
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse {
        /// URL that produced the response
        url: String,
        /// Decoder error
        reason: String,
    },

    /// The API quota is exhausted and resets too far in the future to wait for.
    #[error("GitHub API rate limit exceeded, resets in {reset_in_secs}s")]
    RateLimited {
        /// Seconds until the quota resets
        reset_in_secs: u64,
    },

    /// No recognized bundle asset in the release.
    #[error(
        "No installable asset found in {owner}/{repo} release {version} (the release may still be building)"
    )]
    AssetNotFound {
        /// Repository owner
        owner: String,
        /// Repository name
        repo: String,
        /// Release version that was inspected
        version: String,
    },

    /// Verification could not run: unreadable file or malformed expected hash.
    #[error("Verification error: {reason}")]
    Verification {
        /// What went wrong
        reason: String,
    },

    /// Every applicable integrity check failed for a downloaded file.
    #[error("Verification failed for '{name}' using {method}")]
    VerificationFailed {
        /// Asset file name
        name: String,
        /// Method that produced the failing result
        method: String,
    },

    /// Stored backup no longer matches the checksum recorded when it was created.
    #[error("Backup integrity check failed for {package} {version}: expected {expected}, got {actual}")]
    BackupIntegrity {
        /// Package identifier
        package: String,
        /// Backup version
        version: String,
        /// Checksum recorded in the ledger
        expected: String,
        /// Checksum computed from the file on disk
        actual: String,
    },

    /// Requested backup version is not in the ledger.
    #[error("No backup of {package} version {version}")]
    BackupNotFound {
        /// Package identifier
        package: String,
        /// Requested version
        version: String,
    },

    /// Persisted state was written by an incompatible schema version.
    #[error("State for '{package}' uses config version {found}, expected {expected}")]
    ConfigVersion {
        /// Package identifier
        package: String,
        /// Version found on disk
        found: u32,
        /// Version this build understands
        expected: u32,
    },

    /// Package is neither installed nor known to the catalog.
    #[error("Package '{name}' not found")]
    PackageNotFound {
        /// Requested package name
        name: String,
    },

    /// A target string could not be interpreted.
    #[error("Invalid target '{input}': {reason}")]
    InvalidTarget {
        /// Raw user input
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// URLs and catalog names were mixed in one invocation.
    #[error("Cannot mix repository URLs and catalog names in one command")]
    MixedTargets,

    /// Concurrency limit of zero.
    #[error("Invalid concurrency limit: {value}")]
    InvalidConcurrency {
        /// The rejected limit
        value: usize,
    },

    /// Batch cancelled before the target started.
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl AppboxError {
    /// Whether the retry policy should attempt the operation again.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkTransient { .. })
    }
}

/// Error wrapper carrying user-facing details and a suggestion.
///
/// # Examples
///
/// ```rust,no_run
/// use appbox_cli::core::{AppboxError, ErrorContext};
///
/// let context = ErrorContext::new(AppboxError::MixedTargets)
///     .with_suggestion("Run one command for URLs and another for catalog names");
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: AppboxError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context without suggestion or details.
    #[must_use]
    pub const fn new(error: AppboxError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details that explain the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr: error in red, details in yellow, suggestion in green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with actionable suggestions.
///
/// Recognizes [`AppboxError`] (directly or anywhere in the context chain) and
/// [`std::io::Error`]; everything else is wrapped as [`AppboxError::Other`] with the full
/// context chain as the message.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let chain = format!("{error:#}");

    let error = match error.downcast::<AppboxError>() {
        Ok(appbox_error) => {
            let bare = chain == appbox_error.to_string();
            let ctx = create_error_context(appbox_error);
            if bare {
                return ctx;
            }
            // Keep the suggestion but show the caller's context chain
            return ErrorContext {
                error: AppboxError::Other {
                    message: chain,
                },
                ..ctx
            };
        }
        Err(error) => error,
    };

    if let Some(io_error) = error.chain().find_map(|e| e.downcast_ref::<std::io::Error>()) {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(AppboxError::Other {
                    message: chain,
                })
                .with_suggestion(
                    "Check ownership of the install, backup and state directories in your config",
                );
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(AppboxError::Other {
                    message: chain,
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    ErrorContext::new(AppboxError::Other {
        message: chain,
    })
}

const MIGRATE_SUGGESTION: &str =
    "Remove and reinstall the package, or migrate the state file with the appbox release that wrote it";

fn create_error_context(error: AppboxError) -> ErrorContext {
    match &error {
        AppboxError::NetworkTransient { .. } => {
            ErrorContext::new(error).with_suggestion("Check your network connection and retry")
        }
        AppboxError::RateLimited { .. } => ErrorContext::new(error)
            .with_suggestion("Set GITHUB_TOKEN or network.github_token to raise the API limit"),
        AppboxError::AssetNotFound { .. } => ErrorContext::new(error)
            .with_details("The release exists but has no .AppImage asset yet")
            .with_suggestion("Retry in a few minutes once the release build has finished"),
        AppboxError::BackupIntegrity { .. } => ErrorContext::new(error)
            .with_details("The live installation was left untouched")
            .with_suggestion("Restore a different version or remove the corrupted backup"),
        AppboxError::ConfigVersion { .. } => {
            ErrorContext::new(error).with_suggestion(MIGRATE_SUGGESTION)
        }
        AppboxError::PackageNotFound { .. } => {
            ErrorContext::new(error).with_suggestion("Run 'appbox list' to see installed packages")
        }
        AppboxError::MixedTargets => ErrorContext::new(error)
            .with_suggestion("Install URLs and catalog names in separate commands"),
        AppboxError::InvalidConcurrency { .. } => ErrorContext::new(error)
            .with_suggestion("Set install.max_concurrent_downloads to at least 1"),
        _ => ErrorContext::new(error),
    }
}
