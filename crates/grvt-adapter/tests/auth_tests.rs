/*
[INPUT]:  Mock login endpoint responses
[OUTPUT]: Test results for the session authenticator
[POS]:    Integration tests - login, single-flight refresh, failure propagation
[UPDATE]: When login flow or credential lifecycle changes
*/

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{fast_auth_config, login_mock, setup_mock_server};
use futures_util::future::join_all;
use grvt_adapter::{AuthConfig, CredentialProvider, CredentialState, GrvtError, SessionAuthenticator};
use rstest::rstest;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

fn authenticator(uri: &str, config: AuthConfig) -> SessionAuthenticator {
    assert_ok!(SessionAuthenticator::new("test-api-key", uri, config))
}

#[tokio::test]
async fn test_login_reads_set_cookie() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/auth/api_key/login"))
        .and(body_json(serde_json::json!({"api_key": "test-api-key"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "gravity=abc123; Max-Age=3600; Path=/; HttpOnly"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let auth = authenticator(&server.uri(), fast_auth_config());
    assert_eq!(auth.state(), CredentialState::Absent);

    let credential = assert_ok!(auth.acquire().await);
    assert_eq!(credential.token(), "abc123");
    assert_eq!(credential.cookie_name(), "gravity");
    assert_eq!(credential.header_value(), "gravity=abc123");
    let lifetime = credential.expires_at() - credential.issued_at();
    assert_eq!(lifetime.num_seconds(), 3600);
    assert_eq!(auth.state(), CredentialState::Fresh);

    // cached
    let again = assert_ok!(auth.acquire().await);
    assert_eq!(again, credential);
    assert_eq!(auth.login_count(), 1);
}

#[tokio::test]
async fn test_login_falls_back_to_body_token() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/auth/api_key/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": {"token": "from-body"}
        })))
        .mount(&server)
        .await;

    let auth = authenticator(&server.uri(), fast_auth_config());
    let credential = assert_ok!(auth.acquire().await);
    assert_eq!(credential.token(), "from-body");
    assert_eq!(credential.cookie_name(), "gravity");
    let lifetime = credential.expires_at() - credential.issued_at();
    assert_eq!(lifetime.num_seconds(), 86_400);
}

#[tokio::test]
async fn test_concurrent_acquire_logs_in_once() {
    let server = setup_mock_server().await;
    login_mock("shared")
        .expect(1)
        .mount(&server)
        .await;

    let auth = Arc::new(authenticator(&server.uri(), fast_auth_config()));
    let results = join_all((0..16).map(|_| {
        let auth = auth.clone();
        async move { auth.acquire().await }
    }))
    .await;

    for result in results {
        let credential = assert_ok!(result);
        assert_eq!(credential.token(), "shared");
    }
    assert_eq!(auth.login_count(), 1);
}

#[tokio::test]
async fn test_concurrent_acquire_on_stale_credential_logs_in_once() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/auth/api_key/login"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "gravity=expiring; Max-Age=60"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    login_mock("renewed").expect(1).mount(&server).await;

    let auth = Arc::new(authenticator(&server.uri(), fast_auth_config()));
    assert_ok!(auth.acquire().await);
    assert_eq!(auth.state(), CredentialState::Stale);

    let results = join_all((0..16).map(|_| {
        let auth = auth.clone();
        async move { auth.acquire().await }
    }))
    .await;

    for result in results {
        assert_eq!(assert_ok!(result).token(), "renewed");
    }
    assert_eq!(auth.login_count(), 2);
    assert_eq!(auth.state(), CredentialState::Fresh);
}

#[tokio::test]
async fn test_short_lived_session_is_shared_by_one_flight() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/auth/api_key/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "gravity=short; Max-Age=60")
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let auth = Arc::new(authenticator(&server.uri(), fast_auth_config()));
    let results = join_all((0..8).map(|_| {
        let auth = auth.clone();
        async move { auth.acquire().await }
    }))
    .await;

    for result in results {
        let credential = assert_ok!(result);
        assert_eq!(credential.token(), "short");
        assert!(!credential.is_expired(Utc::now()));
    }
    assert_eq!(auth.login_count(), 1);
}

#[rstest]
#[case("gravity=tok; Max-Age=0")]
#[case("gravity=tok; Max-Age=-30")]
#[case("gravity=tok; Expires=Thu, 01 Jan 2015 00:00:00 GMT")]
#[tokio::test]
async fn test_already_expired_session_is_rejected(#[case] set_cookie: &str) {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/auth/api_key/login"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", set_cookie))
        .mount(&server)
        .await;

    let auth = authenticator(&server.uri(), fast_auth_config());
    let err = assert_err!(auth.acquire().await);
    assert!(err.is_auth_error(), "unexpected error: {err}");
    assert_eq!(auth.state(), CredentialState::Absent);
}

#[tokio::test]
async fn test_out_of_range_max_age_uses_session_ttl() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/auth/api_key/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "gravity=tok; Max-Age=9223372036854775807"),
        )
        .mount(&server)
        .await;

    let auth = authenticator(&server.uri(), fast_auth_config());
    let credential = assert_ok!(auth.acquire().await);
    assert_eq!(credential.token(), "tok");
    let lifetime = credential.expires_at() - credential.issued_at();
    assert_eq!(lifetime.num_seconds(), 86_400);
}

#[tokio::test]
async fn test_failed_refresh_reaches_every_waiter() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/auth/api_key/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    let auth = Arc::new(authenticator(&server.uri(), fast_auth_config()));
    let results = join_all((0..8).map(|_| {
        let auth = auth.clone();
        async move { auth.acquire().await }
    }))
    .await;

    for result in results {
        let err = assert_err!(result);
        assert!(err.is_auth_error(), "unexpected error: {err}");
    }
    assert_eq!(auth.login_count(), 1);
    assert_eq!(auth.state(), CredentialState::Absent);
}

#[tokio::test]
async fn test_failure_is_not_cached_for_later_callers() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/auth/api_key/login"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    login_mock("recovered").mount(&server).await;

    let auth = authenticator(&server.uri(), fast_auth_config());
    assert_err!(auth.acquire().await);
    let credential = assert_ok!(auth.acquire().await);
    assert_eq!(credential.token(), "recovered");
    assert_eq!(auth.login_count(), 2);
}

#[tokio::test]
async fn test_credential_inside_skew_window_is_refreshed() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/auth/api_key/login"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "gravity=short; Max-Age=60"),
        )
        .expect(2)
        .mount(&server)
        .await;

    // 60s lifetime is inside the default 300s renewal window
    let auth = authenticator(&server.uri(), fast_auth_config());
    assert_ok!(auth.acquire().await);
    assert_eq!(auth.state(), CredentialState::Stale);
    assert_ok!(auth.acquire().await);
    assert_eq!(auth.login_count(), 2);
}

#[tokio::test]
async fn test_invalidate_forces_new_login() {
    let server = setup_mock_server().await;
    login_mock("rotating").expect(2).mount(&server).await;

    let auth = authenticator(&server.uri(), fast_auth_config());
    let first = assert_ok!(auth.acquire().await);
    CredentialProvider::invalidate(&auth, &first);
    assert_eq!(auth.state(), CredentialState::Absent);

    assert_ok!(auth.acquire().await);
    assert_eq!(auth.login_count(), 2);
}

#[tokio::test]
async fn test_login_timeout() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/auth/api_key/login"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let config = AuthConfig {
        login_timeout_ms: 50,
        ..AuthConfig::default()
    };
    let auth = authenticator(&server.uri(), config);
    let err = assert_err!(auth.acquire().await);
    assert!(matches!(err, GrvtError::Timeout { .. }), "unexpected error: {err}");
}

#[test]
fn test_acquire_blocking_from_sync_code() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let server = runtime.block_on(async {
        let server = setup_mock_server().await;
        login_mock("blocking").mount(&server).await;
        server
    });

    let auth = authenticator(&server.uri(), fast_auth_config());
    let credential = assert_ok!(auth.acquire_blocking(runtime.handle()));
    assert_eq!(credential.token(), "blocking");
}

#[test]
fn test_rejects_empty_api_key() {
    let result = SessionAuthenticator::new("  ", "https://edge.testnet.grvt.io", AuthConfig::default());
    assert!(matches!(result, Err(GrvtError::Config(_))));
}
