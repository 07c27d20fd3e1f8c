//! Shared helpers
//!
//! - [`fs`] - Atomic writes and copies, executable bits
//! - [`progress`] - Progress observer trait and the `indicatif` renderer

pub mod fs;
pub mod progress;

pub use fs::{atomic_copy, atomic_write, ensure_dir, set_executable};
pub use progress::{BatchProgress, NoopObserver, ProgressObserver, Stage};
