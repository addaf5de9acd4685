//! Integration tests for the readiness poller against a real TLS endpoint.

mod support;

use std::time::{Duration, Instant};

use actix_web::http::StatusCode;
use kenv::cert::{self, CertificateBundle};
use kenv::error::ErrorKind;
use kenv::shutdown::create_shutdown_channel;
use kenv::webhook::{health_check_review, WebhookClient};
use kenv_config::shared::PollPolicy;
use kenv_telemetry::init_test_tracing;
use tempfile::TempDir;

use crate::support::WebhookTestServer;

fn issue_bundle() -> (TempDir, CertificateBundle) {
    let dir = tempfile::tempdir().unwrap();
    let bundle = cert::issue(
        dir.path(),
        Duration::from_secs(3600),
        &["localhost".to_string(), "127.0.0.1".to_string()],
    )
    .unwrap();
    (dir, bundle)
}

fn client_for(server: &WebhookTestServer, bundle: &CertificateBundle) -> WebhookClient {
    WebhookClient::new("127.0.0.1", server.port, bundle.ca_cert())
        .unwrap()
        .with_call_timeout(Duration::from_secs(2))
}

#[tokio::test(flavor = "multi_thread")]
async fn endpoint_becomes_healthy_after_server_errors() {
    init_test_tracing();
    let (_dir, bundle) = issue_bundle();
    let server = WebhookTestServer::spawn(&bundle, 3).await;
    let client = client_for(&server, &bundle);
    let (_tx, mut shutdown) = create_shutdown_channel();

    let policy = PollPolicy::new(50, 10_000);
    let started = Instant::now();
    client
        .wait_for_endpoints(
            &mut shutdown,
            &["https://host.docker.internal:9443/validate".to_string()],
            &policy,
        )
        .await
        .unwrap();

    // Three failing attempts, then success: at least four calls with a full
    // poll interval between each failure and the next attempt.
    assert!(server.hits() >= 4, "only {} calls were made", server.hits());
    assert!(started.elapsed() >= Duration::from_millis(150));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rejecting_webhook_counts_as_healthy() {
    init_test_tracing();
    let (_dir, bundle) = issue_bundle();
    let server =
        WebhookTestServer::spawn_with_ready_status(&bundle, 0, StatusCode::FORBIDDEN).await;
    let client = client_for(&server, &bundle);
    let (_tx, mut shutdown) = create_shutdown_channel();

    client
        .wait_for_endpoints(
            &mut shutdown,
            &["https://host.docker.internal:9443/validate".to_string()],
            &PollPolicy::new(50, 5_000),
        )
        .await
        .unwrap();

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn precancelled_wait_reports_cancellation_not_timeout() {
    init_test_tracing();
    let (_dir, bundle) = issue_bundle();
    let server = WebhookTestServer::spawn(&bundle, usize::MAX).await;
    let client = client_for(&server, &bundle);

    let (tx, mut shutdown) = create_shutdown_channel();
    tx.shutdown().unwrap();

    let policy = PollPolicy::new(200, 10_000);
    let started = Instant::now();
    let err = client
        .wait_for_endpoints(
            &mut shutdown,
            &["https://host.docker.internal:9443/validate".to_string()],
            &policy,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OperationCancelled);
    assert!(started.elapsed() < policy.interval());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn persistent_server_errors_exhaust_the_policy_deadline() {
    init_test_tracing();
    let (_dir, bundle) = issue_bundle();
    let server = WebhookTestServer::spawn(&bundle, usize::MAX).await;
    let client = client_for(&server, &bundle);
    let (_tx, mut shutdown) = create_shutdown_channel();

    let err = client
        .wait_for_endpoints(
            &mut shutdown,
            &["https://host.docker.internal:9443/validate".to_string()],
            &PollPolicy::new(50, 400),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ReadyTimeout);
    // The failing endpoint is named in the error.
    assert!(err.detail().unwrap().contains("/validate"));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn client_trusts_only_the_issued_ca() {
    init_test_tracing();
    let (_dir, server_bundle) = issue_bundle();
    let (_other_dir, other_bundle) = issue_bundle();
    let server = WebhookTestServer::spawn(&server_bundle, 0).await;

    // Built against a different CA: every TLS handshake must fail, so the
    // endpoint never turns healthy.
    let client = client_for(&server, &other_bundle);
    let (_tx, mut shutdown) = create_shutdown_channel();

    let err = client
        .wait_for_endpoints(
            &mut shutdown,
            &["https://host.docker.internal:9443/".to_string()],
            &PollPolicy::new(50, 400),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ReadyTimeout);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_endpoint_url_is_reported() {
    init_test_tracing();
    let (_dir, bundle) = issue_bundle();
    let server = WebhookTestServer::spawn(&bundle, 0).await;
    let client = client_for(&server, &bundle);
    let (_tx, mut shutdown) = create_shutdown_channel();

    let err = client
        .wait_for_endpoints(
            &mut shutdown,
            &["::not a url::".to_string()],
            &PollPolicy::new(50, 1_000),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidUrl);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn call_returns_the_admission_review_response() {
    init_test_tracing();
    let (_dir, bundle) = issue_bundle();
    let server = WebhookTestServer::spawn(&bundle, 0).await;
    let client = client_for(&server, &bundle);

    let response = client
        .call("/validate", &health_check_review())
        .await
        .unwrap();

    assert_eq!(response["kind"], "AdmissionReview");
    assert_eq!(response["response"]["allowed"], true);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn call_reports_server_errors_with_status() {
    init_test_tracing();
    let (_dir, bundle) = issue_bundle();
    let server = WebhookTestServer::spawn(&bundle, usize::MAX).await;
    let client = client_for(&server, &bundle);

    let err = client
        .call("/validate", &health_check_review())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::EndpointUnhealthy);
    assert!(err.detail().unwrap().contains("500"));

    server.stop().await;
}
