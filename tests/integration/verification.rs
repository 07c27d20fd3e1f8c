use crate::common::{MockGithub, TestEnv, release_json};
use appbox_cli::github::Release;
use appbox_cli::test_utils::sha256_hex;
use appbox_cli::utils::NoopObserver;
use appbox_cli::verification::{MethodStatus, MethodType, VerificationPolicy, Verifier};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const BUNDLE: &[u8] = b"\x7fELF tool 1.0.0";

/// Release with the bundle and, optionally, a `SHA256SUMS` asset holding `sums`.
async fn publish(github: &MockGithub, sums: Option<String>) -> Release {
    let mut assets =
        vec![github.asset("o", "tool", "v1.0.0", "tool-x86_64.AppImage", BUNDLE, false)];
    github.mount_download("o", "tool", "v1.0.0", "tool-x86_64.AppImage", BUNDLE).await;
    if let Some(sums) = sums {
        assets.push(github.asset("o", "tool", "v1.0.0", "SHA256SUMS", sums.as_bytes(), false));
        github.mount_download("o", "tool", "v1.0.0", "SHA256SUMS", sums.as_bytes()).await;
    }
    github.mount_latest("o", "tool", release_json("v1.0.0", false, assets)).await;

    let env = TestEnv::new(&github.uri());
    env.resolver().resolve("o", "tool", false).await.unwrap()
}

async fn download_and_verify(
    github: &MockGithub,
    release: &Release,
    policy: &VerificationPolicy,
) -> appbox_cli::verification::VerificationOutcome {
    let env = TestEnv::new(&github.uri());
    let resolver = env.resolver();
    let asset = release.asset_named("tool-x86_64.AppImage").unwrap().clone();
    let file = resolver
        .download(&asset, &env.temp.path().join(&asset.name), "tool", &NoopObserver)
        .await
        .unwrap();
    Verifier::new(resolver).verify(&file, &asset, &policy.plan(release, &asset)).await.unwrap()
}

#[tokio::test]
async fn test_discovered_checksum_file_passes() {
    let github = MockGithub::start().await;
    let sums = format!("{}  tool-x86_64.AppImage\n{}  other.AppImage\n", sha256_hex(BUNDLE), "0".repeat(64));
    let release = publish(&github, Some(sums)).await;

    let outcome = download_and_verify(&github, &release, &VerificationPolicy::default()).await;
    assert!(outcome.overall_passed);
    assert_eq!(outcome.actual_method, MethodType::ChecksumFile);
    assert_eq!(outcome.methods.len(), 1);
    assert_eq!(outcome.methods[0].computed.as_deref(), Some(sha256_hex(BUNDLE).as_str()));
    assert_eq!(outcome.size_matched, Some(true));
}

#[tokio::test]
async fn test_name_first_checksum_file_passes() {
    let github = MockGithub::start().await;
    let sums = format!(
        "tool-x86_64.AppImage: {}\nother.AppImage: {}\n",
        sha256_hex(BUNDLE),
        "c".repeat(64)
    );
    let release = publish(&github, Some(sums)).await;
    assert!(release.asset_named("tool-x86_64.AppImage").unwrap().digest.is_none());

    let outcome = download_and_verify(&github, &release, &VerificationPolicy::default()).await;
    assert!(outcome.overall_passed);
    assert_eq!(outcome.actual_method, MethodType::ChecksumFile);
    assert_eq!(outcome.methods.len(), 1);
    assert_eq!(outcome.methods[0].method, MethodType::ChecksumFile);
    assert_eq!(outcome.methods[0].status, MethodStatus::Passed);
}

#[tokio::test]
async fn test_checksum_mismatch_fails() {
    let github = MockGithub::start().await;
    let sums = format!("{}  tool-x86_64.AppImage\n", "a".repeat(64));
    let release = publish(&github, Some(sums)).await;

    let outcome = download_and_verify(&github, &release, &VerificationPolicy::default()).await;
    assert!(!outcome.overall_passed);
    assert!(outcome.any_failed());
    assert_eq!(outcome.methods[0].status, MethodStatus::Failed);
}

#[tokio::test]
async fn test_configured_checksum_file_missing_is_skipped() {
    let github = MockGithub::start().await;
    let release = publish(&github, None).await;
    Mock::given(method("GET"))
        .and(path("/dl/o/tool/v1.0.0/tool-x86_64.AppImage.sha256"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&github.server)
        .await;

    let policy = VerificationPolicy {
        checksum_file: Some("{asset_name}.sha256".to_string()),
        ..VerificationPolicy::default()
    };
    let outcome = download_and_verify(&github, &release, &policy).await;
    assert!(!outcome.overall_passed);
    assert!(!outcome.any_failed());
    assert_eq!(outcome.methods[0].method, MethodType::ChecksumFile);
    assert_eq!(outcome.methods[0].status, MethodStatus::Skipped);
    assert!(outcome.warning.is_some());
}

#[tokio::test]
async fn test_no_verification_data_records_skip() {
    let github = MockGithub::start().await;
    let release = publish(&github, None).await;

    let outcome = download_and_verify(&github, &release, &VerificationPolicy::default()).await;
    assert!(!outcome.overall_passed);
    assert_eq!(outcome.methods.len(), 1);
    assert_eq!(outcome.methods[0].method, MethodType::Skip);
}
