use crate::common::{MockGithub, TestEnv, release_json};
use appbox_cli::catalog::{CatalogEntry, JsonCatalog};
use appbox_cli::installer::NamingPolicy;
use appbox_cli::state::PackageSource;
use appbox_cli::test_utils::bundle_bytes;
use appbox_cli::verification::{MethodType, VerificationPolicy};
use std::os::unix::fs::PermissionsExt;

fn targets(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

#[tokio::test]
async fn test_url_install_end_to_end() {
    let github = MockGithub::start().await;
    let bytes = bundle_bytes("tool 1.0.0");
    github.publish("o", "Tool", "v1.0.0", &bytes).await;

    let env = TestEnv::new(&github.uri());
    let installer = env.installer();
    let report = installer.install(&targets(&["https://github.com/o/Tool"]), false).await.unwrap();

    assert!(report.all_succeeded(), "{:?}", report.results);
    let result = report.result_for("tool").unwrap();
    assert_eq!(result.version.as_deref(), Some("1.0.0"));
    assert_eq!(result.verification.as_ref().unwrap().actual_method, MethodType::Digest);

    let installed = env.installed_path("tool.AppImage");
    assert_eq!(std::fs::read(&installed).unwrap(), bytes);
    let mode = std::fs::metadata(&installed).unwrap().permissions().mode();
    assert_eq!(mode & 0o111, 0o111);

    let state = installer.state().load("tool").await.unwrap().unwrap();
    assert_eq!(state.state.version, "1.0.0");
    assert_eq!(state.state.installed_path, installed);
    assert!(state.state.verification.overall_passed);
    match state.source {
        PackageSource::Url {
            overrides,
        } => {
            assert_eq!(overrides.owner, "o");
            assert_eq!(overrides.repo, "Tool");
            assert!(!overrides.prerelease);
        }
        other => panic!("expected a URL source, got {other:?}"),
    }

    // Staging area is cleaned up
    assert!(!env.config.directories.download.join("tool").exists());
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let github = MockGithub::start().await;
    github.publish("o", "alpha", "v1.0.0", &bundle_bytes("alpha")).await;
    github.publish("o", "beta", "v2.0.0", &bundle_bytes("beta")).await;

    let env = TestEnv::new(&github.uri());
    let installer = env.installer().with_concurrency(2);
    let report = installer
        .install(
            &targets(&[
                "https://github.com/o/alpha",
                "https://github.com/o/missing",
                "https://github.com/o/beta",
            ]),
            false,
        )
        .await
        .unwrap();

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    let missing = report.result_for("missing").unwrap();
    assert!(!missing.success);
    assert!(missing.message.to_lowercase().contains("not found"), "{}", missing.message);
    assert!(env.installed_path("alpha.AppImage").exists());
    assert!(env.installed_path("beta.AppImage").exists());
}

#[tokio::test]
async fn test_verification_failure_leaves_nothing_installed() {
    let github = MockGithub::start().await;
    let served = bundle_bytes("tampered");
    let asset = github.asset("o", "tool", "v1.0.0", "tool-x86_64.AppImage", &bundle_bytes("genuine"), true);
    github.mount_latest("o", "tool", release_json("v1.0.0", false, vec![asset])).await;
    github.mount_download("o", "tool", "v1.0.0", "tool-x86_64.AppImage", &served).await;

    let env = TestEnv::new(&github.uri());
    let installer = env.installer();
    let report = installer.install(&targets(&["https://github.com/o/tool"]), false).await.unwrap();

    let result = report.result_for("tool").unwrap();
    assert!(!result.success);
    assert!(result.message.contains("Verification failed"), "{}", result.message);
    assert!(result.verification.as_ref().unwrap().any_failed());
    assert!(!env.installed_path("tool.AppImage").exists());
    assert!(installer.state().load("tool").await.unwrap().is_none());
    assert!(
        !env.config.directories.download.join("tool").join("tool-x86_64.AppImage").exists()
    );
}

#[tokio::test]
async fn test_already_installed_is_skipped_unless_forced() {
    let github = MockGithub::start().await;
    github.publish("o", "tool", "v1.0.0", &bundle_bytes("tool")).await;

    let env = TestEnv::new(&github.uri());
    let installer = env.installer();
    let url = targets(&["https://github.com/o/tool"]);
    installer.install(&url, false).await.unwrap();

    let again = installer.install(&url, false).await.unwrap();
    assert!(again.results.is_empty());
    assert_eq!(again.already_installed, vec!["tool".to_string()]);

    let forced = installer.install(&url, true).await.unwrap();
    assert!(forced.all_succeeded());
    assert_eq!(forced.results[0].message, "reinstalled 1.0.0");
}

#[tokio::test]
async fn test_mixed_targets_rejected() {
    let github = MockGithub::start().await;
    let env = TestEnv::new(&github.uri());
    let err = env
        .installer()
        .install(&targets(&["https://github.com/o/tool", "firefox"]), false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Cannot mix"), "{err}");
}

#[tokio::test]
async fn test_update_backs_up_previous_version() {
    let github = MockGithub::start().await;
    let old = bundle_bytes("tool 1.0.0");
    github.publish("o", "tool", "v1.0.0", &old).await;

    let env = TestEnv::new(&github.uri());
    let installer = env.installer();
    installer.install(&targets(&["https://github.com/o/tool"]), false).await.unwrap();

    github.reset().await;
    let new = bundle_bytes("tool 1.1.0");
    github.publish("o", "tool", "v1.1.0", &new).await;

    let report = installer.update(&[], false).await.unwrap();
    assert!(report.all_succeeded(), "{:?}", report.results);
    assert_eq!(report.results[0].message, "updated 1.0.0 -> 1.1.0");
    assert_eq!(std::fs::read(env.installed_path("tool.AppImage")).unwrap(), new);
    assert_eq!(installer.backups().list_versions("tool").await.unwrap(), vec!["1.0.0"]);

    let records = installer.backups().records("tool").await.unwrap();
    assert_eq!(records[0].size_bytes, old.len() as u64);

    // Nothing newer: reported as up to date
    let again = installer.update(&targets(&["tool"]), false).await.unwrap();
    assert!(again.results.is_empty());
    assert_eq!(again.already_installed, vec!["tool".to_string()]);
}

#[tokio::test]
async fn test_update_unknown_package_is_invalid() {
    let github = MockGithub::start().await;
    let env = TestEnv::new(&github.uri());
    let report = env.installer().update(&targets(&["ghost"]), false).await.unwrap();
    assert!(report.results.is_empty());
    assert_eq!(report.invalid.len(), 1);
    assert_eq!(report.invalid[0].0, "ghost");
}

#[tokio::test]
async fn test_check_updates_reports_newer_release() {
    let github = MockGithub::start().await;
    github.publish("o", "tool", "v1.0.0", &bundle_bytes("tool")).await;

    let env = TestEnv::new(&github.uri());
    let installer = env.installer();
    installer.install(&targets(&["https://github.com/o/tool"]), false).await.unwrap();

    github.reset().await;
    github.publish("o", "tool", "v1.1.0", &bundle_bytes("tool 1.1.0")).await;

    let checks = installer.check_updates(&[]).await.unwrap();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].installed_version, "1.0.0");
    assert_eq!(checks[0].latest_version.as_deref(), Some("1.1.0"));
    assert!(checks[0].update_available);
    assert!(checks[0].error.is_none());

    // Checking never installs
    let state = installer.state().load("tool").await.unwrap().unwrap();
    assert_eq!(state.state.version, "1.0.0");
}

#[tokio::test]
async fn test_restore_previous_version() {
    let github = MockGithub::start().await;
    let mut env = TestEnv::new(&github.uri());
    env.config.install.max_backups = 3;
    let installer = env.installer();
    let url = targets(&["https://github.com/o/tool"]);

    for version in ["1.2.1", "1.2.2", "1.2.3"] {
        github.reset().await;
        github.publish("o", "tool", &format!("v{version}"), &bundle_bytes(version)).await;
        if version == "1.2.1" {
            installer.install(&url, false).await.unwrap();
        } else {
            let report = installer.update(&[], false).await.unwrap();
            assert!(report.all_succeeded(), "{:?}", report.results);
        }
    }
    assert_eq!(installer.backups().list_versions("tool").await.unwrap(), vec!["1.2.2", "1.2.1"]);

    let record = installer.restore("tool", "1.2.1").await.unwrap();
    assert_eq!(record.version, "1.2.1");

    let installed = env.installed_path("tool.AppImage");
    assert_eq!(std::fs::read(&installed).unwrap(), bundle_bytes("1.2.1"));
    let state = installer.state().load("tool").await.unwrap().unwrap();
    assert_eq!(state.state.version, "1.2.1");
    assert!(state.state.verification.overall_passed);

    // The version that was live is now restorable too
    let versions = installer.backups().list_versions("tool").await.unwrap();
    assert!(versions.contains(&"1.2.3".to_string()), "{versions:?}");

    // Restoring again is a no-op with the same outcome
    installer.restore("tool", "1.2.1").await.unwrap();
    assert_eq!(std::fs::read(&installed).unwrap(), bundle_bytes("1.2.1"));
    let state = installer.state().load("tool").await.unwrap().unwrap();
    assert_eq!(state.state.version, "1.2.1");
}

#[tokio::test]
async fn test_catalog_install_uses_entry_policies() {
    let github = MockGithub::start().await;
    let bytes = bundle_bytes("editor");
    github.publish("acme", "editor-releases", "v3.1.0", &bytes).await;

    let catalog = JsonCatalog::from_entries([CatalogEntry {
        name: "editor".to_string(),
        owner: "acme".to_string(),
        repo: "editor-releases".to_string(),
        prerelease: false,
        verification: VerificationPolicy::default(),
        naming: NamingPolicy {
            target_name: Some("Editor".to_string()),
            characteristic_suffixes: Vec::new(),
        },
        icon: Default::default(),
    }]);

    let env = TestEnv::new(&github.uri());
    let installer = env.installer_with_catalog(catalog);

    let typo = installer.install(&targets(&["editr"]), false).await.unwrap();
    assert!(typo.results.is_empty());
    assert!(typo.invalid[0].1.contains("editor"), "{:?}", typo.invalid);

    let report = installer.install(&targets(&["Editor"]), false).await.unwrap();
    assert!(report.all_succeeded(), "{:?}", report.results);
    assert_eq!(std::fs::read(env.installed_path("Editor.AppImage")).unwrap(), bytes);

    let state = installer.state().load("editor").await.unwrap().unwrap();
    assert_eq!(
        state.source,
        PackageSource::Catalog {
            catalog_ref: "editor".to_string(),
        }
    );

    let listed = installer.list_installed().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "editor");
    assert_eq!(listed[0].version, "3.1.0");
    assert!(listed[0].verified);
}

#[tokio::test]
async fn test_failed_update_keeps_live_file_and_takes_no_backup() {
    let github = MockGithub::start().await;
    let old = bundle_bytes("tool 1.0.0");
    github.publish("o", "tool", "v1.0.0", &old).await;

    let env = TestEnv::new(&github.uri());
    let installer = env.installer();
    installer.install(&targets(&["https://github.com/o/tool"]), false).await.unwrap();

    github.reset().await;
    let name = "tool-v1.1.0-x86_64.AppImage";
    let asset = github.asset("o", "tool", "v1.1.0", name, &bundle_bytes("genuine 1.1.0"), true);
    github.mount_latest("o", "tool", release_json("v1.1.0", false, vec![asset])).await;
    github.mount_download("o", "tool", "v1.1.0", name, &bundle_bytes("tampered 1.1.0")).await;

    let report = installer.update(&[], false).await.unwrap();
    assert_eq!(report.failed(), 1);
    assert_eq!(std::fs::read(env.installed_path("tool.AppImage")).unwrap(), old);
    assert!(installer.backups().list_versions("tool").await.unwrap().is_empty());
    let state = installer.state().load("tool").await.unwrap().unwrap();
    assert_eq!(state.state.version, "1.0.0");
}
