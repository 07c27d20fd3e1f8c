use crate::common::{MockGithub, TestEnv, release_json};
use appbox_cli::core::AppboxError;
use appbox_cli::github::Asset;
use appbox_cli::utils::NoopObserver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_resolves_latest_stable() {
    let github = MockGithub::start().await;
    let asset = github.asset("o", "tool", "v1.2.3", "tool-x86_64.AppImage", b"bytes", true);
    github.mount_latest("o", "tool", release_json("v1.2.3", false, vec![asset])).await;

    let env = TestEnv::new(&github.uri());
    let release = env.resolver().resolve("o", "tool", false).await.unwrap();
    assert_eq!(release.version, "1.2.3");
    assert_eq!(release.original_tag, "v1.2.3");
    assert!(!release.prerelease_fallback);
    assert_eq!(release.assets.len(), 1);
    assert!(release.assets[0].digest.as_deref().unwrap().starts_with("sha256:"));
}

#[tokio::test]
async fn test_url_install_falls_back_to_prerelease() {
    let github = MockGithub::start().await;
    github.mount_no_stable("o", "nightly").await;
    github
        .mount_release_list(
            "o",
            "nightly",
            vec![
                release_json("v0.3.0-beta", true, vec![]),
                release_json("v0.2.0-beta", true, vec![]),
            ],
        )
        .await;

    let env = TestEnv::new(&github.uri());
    let release = env.resolver().resolve_for_url("o", "nightly").await.unwrap();
    assert_eq!(release.version, "0.3.0-beta");
    assert!(release.prerelease);
    assert!(release.prerelease_fallback);
}

#[tokio::test]
async fn test_prerelease_channel_falls_back_to_stable() {
    let github = MockGithub::start().await;
    github.mount_release_list("o", "tool", vec![release_json("v2.0.0", false, vec![])]).await;
    github.mount_latest("o", "tool", release_json("v2.0.0", false, vec![])).await;

    let env = TestEnv::new(&github.uri());
    let release = env.resolver().resolve("o", "tool", true).await.unwrap();
    assert_eq!(release.version, "2.0.0");
    assert!(!release.prerelease);
}

#[tokio::test]
async fn test_resolves_specific_tag() {
    let github = MockGithub::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/tool/releases/tags/v0.9.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(release_json("v0.9.0", false, vec![])))
        .mount(&github.server)
        .await;

    let env = TestEnv::new(&github.uri());
    let release = env.resolver().resolve_tag("o", "tool", "v0.9.0").await.unwrap();
    assert_eq!(release.version, "0.9.0");
    assert_eq!(release.original_tag, "v0.9.0");
}

#[tokio::test]
async fn test_resolves_default_branch() {
    let github = MockGithub::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/tool"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"default_branch": "trunk"})),
        )
        .mount(&github.server)
        .await;

    let env = TestEnv::new(&github.uri());
    assert_eq!(env.resolver().resolve_default_branch("o", "tool").await.unwrap(), "trunk");
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let github = MockGithub::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/missing/releases/latest"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&github.server)
        .await;

    let env = TestEnv::new(&github.uri());
    let err = env.resolver().resolve("o", "missing", false).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<AppboxError>(), Some(AppboxError::NotFound { .. })));
    github.server.verify().await;
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let github = MockGithub::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/flaky/releases/latest"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&github.server)
        .await;
    github.mount_latest("o", "flaky", release_json("v1.0.0", false, vec![])).await;

    let env = TestEnv::new(&github.uri());
    let release = env.resolver().resolve("o", "flaky", false).await.unwrap();
    assert_eq!(release.version, "1.0.0");
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let github = MockGithub::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/down/releases/latest"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&github.server)
        .await;

    let env = TestEnv::new(&github.uri());
    let err = env.resolver().resolve("o", "down", false).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AppboxError>(),
        Some(AppboxError::NetworkTransient { .. })
    ));
    github.server.verify().await;
}

#[tokio::test]
async fn test_exhausted_quota_is_reported() {
    let github = MockGithub::start().await;
    let reset = chrono::Utc::now().timestamp() + 3600;
    Mock::given(method("GET"))
        .and(path("/repos/o/limited/releases/latest"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str()),
        )
        .mount(&github.server)
        .await;

    let env = TestEnv::new(&github.uri());
    let resolver = env.resolver();
    let err = resolver.resolve("o", "limited", false).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<AppboxError>(), Some(AppboxError::RateLimited { .. })));
    assert_eq!(resolver.rate_limit().remaining(), Some(0));
}

#[tokio::test]
async fn test_malformed_body() {
    let github = MockGithub::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/garbled/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&github.server)
        .await;

    let env = TestEnv::new(&github.uri());
    let err = env.resolver().resolve("o", "garbled", false).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AppboxError>(),
        Some(AppboxError::MalformedResponse { .. })
    ));
}

#[tokio::test]
async fn test_download_streams_to_destination() {
    let github = MockGithub::start().await;
    let bytes = vec![7u8; 64 * 1024];
    github.mount_download("o", "tool", "v1.0.0", "tool.AppImage", &bytes).await;
    let asset = Asset {
        name: "tool.AppImage".to_string(),
        size: bytes.len() as u64,
        digest: None,
        download_url: format!("{}/dl/o/tool/v1.0.0/tool.AppImage", github.uri()),
    };

    let env = TestEnv::new(&github.uri());
    let destination = env.temp.path().join("downloads").join("tool").join("tool.AppImage");
    let written =
        env.resolver().download(&asset, &destination, "tool", &NoopObserver).await.unwrap();

    assert_eq!(written, destination);
    assert_eq!(std::fs::read(&destination).unwrap(), bytes);
    assert!(!destination.with_extension("AppImage.part").exists());
}
