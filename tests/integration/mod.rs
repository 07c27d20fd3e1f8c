//! Integration tests for appbox
//!
//! Every test runs against a local mock of the GitHub releases API and a temporary directory
//! tree, so nothing touches the network or the user's real installation.
//!
//! - `resolver` - release resolution, retries, rate limits and downloads
//! - `verification` - digest and checksum-file verification against served assets
//! - `orchestrator` - install, update, check, restore and batch behavior end to end
//! - `cli` - the `appbox` binary

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod orchestrator;
mod resolver;
mod verification;
