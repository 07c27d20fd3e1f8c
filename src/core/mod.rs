//! Core types for appbox
//!
//! This module holds the error taxonomy shared by every subsystem. Keeping it separate from the
//! pipeline modules lets the resolver, verifier, backup manager and orchestrator agree on one set
//! of failure variants without depending on each other.
//!
//! # Error Handling Pattern
//!
//! ```rust
//! use appbox_cli::core::{AppboxError, user_friendly_error};
//! use anyhow::Result;
//!
//! fn lookup(name: &str) -> Result<()> {
//!     Err(AppboxError::PackageNotFound { name: name.to_string() }.into())
//! }
//!
//! if let Err(e) = lookup("firefox") {
//!     user_friendly_error(e).display();
//! }
//! ```

pub mod error;

pub use error::{AppboxError, ErrorContext, user_friendly_error};
