use crate::common::{MockGithub, TestEnv};
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn appbox(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("appbox").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("APPBOX_CONFIG_PATH")
        .arg("--quiet")
        .arg("--no-progress")
        .arg("--config")
        .arg(config);
    cmd
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("appbox").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("remove"))
        .stdout(predicate::str::contains("backup"));
}

#[test]
fn test_verbose_conflicts_with_quiet() {
    let mut cmd = Command::cargo_bin("appbox").unwrap();
    cmd.args(["--verbose", "--quiet", "list"]).assert().failure();
}

#[tokio::test]
async fn test_list_empty() {
    let github = MockGithub::start().await;
    let env = TestEnv::new(&github.uri());
    let config = env.write_config_file().await;

    appbox(&config)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No packages installed"));
}

#[tokio::test]
async fn test_list_json_empty() {
    let github = MockGithub::start().await;
    let env = TestEnv::new(&github.uri());
    let config = env.write_config_file().await;

    appbox(&config).args(["list", "--json"]).assert().success().stdout(predicate::str::contains("[]"));
}

#[tokio::test]
async fn test_mixed_install_fails() {
    let github = MockGithub::start().await;
    let env = TestEnv::new(&github.uri());
    let config = env.write_config_file().await;

    appbox(&config)
        .args(["install", "https://github.com/o/tool", "firefox"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot mix"));
}

#[tokio::test]
async fn test_backup_list_empty() {
    let github = MockGithub::start().await;
    let env = TestEnv::new(&github.uri());
    let config = env.write_config_file().await;

    appbox(&config)
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups"));
}

#[tokio::test]
async fn test_restore_unknown_package_fails() {
    let github = MockGithub::start().await;
    let env = TestEnv::new(&github.uri());
    let config = env.write_config_file().await;

    appbox(&config)
        .args(["backup", "restore", "ghost", "1.0.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}
