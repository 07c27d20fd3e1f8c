//! Configuration for appbox.
//!
//! The only configuration file is the user's global TOML file, see [`GlobalConfig`]. Package
//! state and the catalog are separate stores and live in [`crate::state`] and
//! [`crate::catalog`].

mod global;

pub use global::{CONFIG_PATH_ENV, DirectoryConfig, GlobalConfig, InstallConfig, NetworkConfig};
