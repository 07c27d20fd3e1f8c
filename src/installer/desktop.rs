//! Desktop integration seam.
//!
//! Generating `.desktop` entries and icons is outside appbox; the installer only calls
//! [`DesktopIntegration`] and records the returned [`IconState`]. Failures are logged as
//! warnings and never fail an install.

use crate::state::IconState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Icon settings from the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconPolicy {
    /// Remote icon to download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Extract the icon embedded in the bundle
    #[serde(default)]
    pub extract: bool,
}

/// Creates and removes desktop entries and icons.
pub trait DesktopIntegration: Send + Sync {
    /// Integrate an installed bundle.
    ///
    /// # Errors
    ///
    /// Any error is reported by the caller as a warning.
    fn integrate(&self, package_id: &str, app_path: &Path, icon: &IconPolicy) -> Result<IconState>;

    /// Remove the integration of a package.
    ///
    /// # Errors
    ///
    /// Any error is reported by the caller as a warning.
    fn remove(&self, package_id: &str) -> Result<()>;
}

/// Integration that does nothing and reports no icon.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDesktop;

impl DesktopIntegration for NoopDesktop {
    fn integrate(&self, _package_id: &str, _app_path: &Path, _icon: &IconPolicy) -> Result<IconState> {
        Ok(IconState::default())
    }

    fn remove(&self, _package_id: &str) -> Result<()> {
        Ok(())
    }
}
