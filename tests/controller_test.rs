//! Lifecycle tests for the generation controller.

use imagen::{
    ControllerState, CredentialStore, GenerationController, GenerationRequest, ImagenConfig,
    ImagenError, MemoryBackend, TransportMode,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> ImagenConfig {
    ImagenConfig::default()
        .with_relay_endpoint(format!("{}/api/imagen4", server.uri()))
        .with_direct_endpoint(format!("{}/direct", server.uri()))
}

fn controller(server: &MockServer) -> GenerationController {
    GenerationController::new(config(server), CredentialStore::session_only()).unwrap()
}

async fn mount_relay(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/imagen4"))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_relay_success() {
    let server = MockServer::start().await;
    mount_relay(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"images": ["AAA", {"b64": "BBB"}]})),
    )
    .await;

    let ctrl = controller(&server);
    let outcome = ctrl
        .submit(&GenerationRequest::new("a cat").with_count(2), TransportMode::Relay)
        .await
        .unwrap();

    assert_eq!(outcome.mode, TransportMode::Relay);
    assert_eq!(outcome.sources.len(), 2);
    assert_eq!(outcome.sources[1].as_str(), "data:image/png;base64,BBB");
    assert!(outcome.elapsed_seconds() >= 0.0);
    assert_eq!(ctrl.state(), ControllerState::Idle);
    assert!(!ctrl.is_busy());
    assert!(ctrl.last_failure().is_none());
}

#[tokio::test]
async fn test_empty_result_is_success() {
    let server = MockServer::start().await;
    mount_relay(&server, ResponseTemplate::new(200).set_body_json(json!({}))).await;

    let ctrl = controller(&server);
    let outcome = ctrl
        .submit(&GenerationRequest::new("a cat"), TransportMode::Relay)
        .await
        .unwrap();

    assert!(outcome.is_empty());
    assert_eq!(outcome.summary().split(" · ").next(), Some("completed: 0 image(s)"));
}

#[tokio::test]
async fn test_direct_uses_stored_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/direct"))
        .and(header("Authorization", "Bearer sk-remembered"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "generated_images": [{"image": {"image_bytes": "BBB"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = CredentialStore::with_backend(MemoryBackend::with_value("sk-remembered"));
    let ctrl = GenerationController::new(config(&server), store).unwrap();
    let outcome = ctrl
        .submit(&GenerationRequest::new("a cat"), TransportMode::Direct)
        .await
        .unwrap();

    assert_eq!(outcome.mode, TransportMode::Direct);
    assert_eq!(outcome.sources[0].as_str(), "data:image/png;base64,BBB");
}

#[tokio::test]
async fn test_validation_happens_before_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"images": ["AAA"]})))
        .expect(0)
        .mount(&server)
        .await;

    let ctrl = controller(&server);

    let err = ctrl
        .submit(&GenerationRequest::new("  "), TransportMode::Relay)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = ctrl
        .submit(&GenerationRequest::new("a cat"), TransportMode::Direct)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    assert_eq!(ctrl.state(), ControllerState::Idle);
    assert!(!ctrl.is_busy());
}

#[tokio::test]
async fn test_transport_failure_is_reported_and_controller_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_relay(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"images": ["AAA"]})),
    )
    .await;

    let ctrl = controller(&server);
    let request = GenerationRequest::new("a cat");

    let err = ctrl.submit(&request, TransportMode::Relay).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(ctrl.state(), ControllerState::Idle);
    assert!(!ctrl.is_busy());
    let report = ctrl.last_failure().unwrap();
    assert!(report.message.contains("500"));
    assert!(report.message.contains("oops"));

    // Resubmission is the caller's call; it goes through once the relay recovers.
    let outcome = ctrl.submit(&request, TransportMode::Relay).await.unwrap();
    assert_eq!(outcome.sources.len(), 1);
    assert!(ctrl.last_failure().is_none());
}

#[tokio::test]
async fn test_concurrent_submit_is_rejected_while_busy() {
    let server = MockServer::start().await;
    mount_relay(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"images": ["AAA"]}))
            .set_delay(Duration::from_millis(300)),
    )
    .await;

    let ctrl = controller(&server);
    let request = GenerationRequest::new("a cat");

    let (first, (busy, state, second)) = tokio::join!(
        ctrl.submit(&request, TransportMode::Relay),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let busy = ctrl.is_busy();
            let state = ctrl.state();
            (busy, state, ctrl.submit(&request, TransportMode::Relay).await)
        }
    );

    assert!(busy);
    assert_eq!(state, ControllerState::Requesting);
    assert!(matches!(second, Err(ImagenError::Busy)));
    assert_eq!(first.unwrap().sources.len(), 1);

    assert_eq!(ctrl.state(), ControllerState::Idle);
    assert!(!ctrl.is_busy());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    // The guard is released: the next submission goes through.
    ctrl.submit(&request, TransportMode::Relay).await.unwrap();
}

#[tokio::test]
async fn test_busy_rejection_does_not_overwrite_failure_report() {
    let server = MockServer::start().await;
    mount_relay(
        &server,
        ResponseTemplate::new(502)
            .set_body_string("bad gateway")
            .set_delay(Duration::from_millis(200)),
    )
    .await;

    let ctrl = controller(&server);
    let request = GenerationRequest::new("a cat");

    let (first, second) = tokio::join!(ctrl.submit(&request, TransportMode::Relay), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctrl.submit(&request, TransportMode::Relay).await
    });

    assert!(matches!(second, Err(ImagenError::Busy)));
    assert_eq!(first.unwrap_err().status(), Some(502));
    assert!(ctrl.last_failure().unwrap().message.contains("bad gateway"));
    assert_eq!(ctrl.state(), ControllerState::Idle);
}

#[tokio::test]
async fn test_dropped_submission_releases_guard() {
    let server = MockServer::start().await;
    mount_relay(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"images": ["AAA"]}))
            .set_delay(Duration::from_secs(2)),
    )
    .await;

    let ctrl = controller(&server);
    let request = GenerationRequest::new("a cat");

    let timed_out = tokio::time::timeout(
        Duration::from_millis(100),
        ctrl.submit(&request, TransportMode::Relay),
    )
    .await;

    assert!(timed_out.is_err());
    assert!(!ctrl.is_busy());
    assert_eq!(ctrl.state(), ControllerState::Idle);
}

#[tokio::test]
async fn test_configured_timeout_fails_the_request() {
    let server = MockServer::start().await;
    mount_relay(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"images": ["AAA"]}))
            .set_delay(Duration::from_secs(2)),
    )
    .await;

    let ctrl = GenerationController::new(
        config(&server).with_timeout(Duration::from_millis(100)),
        CredentialStore::session_only(),
    )
    .unwrap();

    let err = ctrl
        .submit(&GenerationRequest::new("a cat"), TransportMode::Relay)
        .await
        .unwrap_err();

    assert!(matches!(err, ImagenError::Network(ref e) if e.is_timeout()));
    assert!(!ctrl.is_busy());
    assert!(ctrl.last_failure().is_some());
}

#[test]
fn test_exposes_config_and_key_store() {
    let config = ImagenConfig::default()
        .with_relay_endpoint("http://relay.local/api/imagen4")
        .with_timeout(Duration::from_secs(30));
    let store = CredentialStore::with_backend(MemoryBackend::with_value("sk-remembered"));
    let mut ctrl = GenerationController::new(config, store).unwrap();

    assert_eq!(ctrl.config().relay_endpoint, "http://relay.local/api/imagen4");
    assert_eq!(ctrl.config().timeout, Some(Duration::from_secs(30)));
    assert!(ctrl.credentials().has_key());
    assert!(ctrl.credentials().remembers());

    ctrl.credentials_mut().set_for_session("sk-oneoff");
    assert!(ctrl.credentials().has_key());
    assert_eq!(ctrl.credentials().status(), &imagen::PersistenceStatus::Persisted);
}
