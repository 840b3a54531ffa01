//! Generative-edit stage against a mock Gemini endpoint

use bgremove_batch::{
    BatchError, BatchSession, GeminiStageConfig, ImageSource, ManualClock, MemoryStore, NoOpObserver,
    QuickAction, QueuedItem, RateLimiter, RemovalStageConfig, RunOutcome, StatusKind,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/v1beta/models/gemini-test:generateContent";

fn session(server: &MockServer) -> BatchSession {
    let config = GeminiStageConfig::builder()
        .model("gemini-test")
        .base_url(server.uri())
        .inter_item_delay(Duration::ZERO)
        .build()
        .unwrap();
    let session =
        BatchSession::with_store(Arc::new(MemoryStore::new()), config, RemovalStageConfig::default())
            .unwrap();
    session.credentials().set("test-key").unwrap();
    session
}

fn items(names: &[&str]) -> Vec<QueuedItem> {
    names
        .iter()
        .map(|name| {
            QueuedItem::new(
                ImageSource::new(*name, "image/png", vec![0x89, b'P', b'N', b'G']),
                format!("file:///tmp/{}", name),
            )
        })
        .collect()
}

fn image_response() -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    {"text": "Here is the edited image"},
                    {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
                ]
            },
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn test_batch_success_and_handoff() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path(ENDPOINT))
        .and(matchers::header("x-goog-api-key", "test-key"))
        .and(matchers::body_partial_json(json!({
            "generationConfig": {"responseModalities": ["image", "text"]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(image_response()))
        .expect(2)
        .mount(&server)
        .await;

    let session = session(&server);
    let stage = session.gemini_stage(QuickAction::default()).unwrap();
    let report = stage
        .process(items(&["a.png", "b.png"]), &CancellationToken::new(), &NoOpObserver)
        .await
        .unwrap();

    assert_eq!(report.statuses(), vec![StatusKind::Completed; 2]);
    assert_eq!(
        report.items[0].result().unwrap().to_string(),
        "data:image/png;base64,iVBORw0KGgo="
    );
    assert_eq!(session.limiter().calls_in_window(), 2);

    assert_eq!(stage.send_to_removal(&report).unwrap(), 2);
    let pending = session.handoff().take_pending().unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].file.name, "a.png");
    assert_eq!(pending[0].preview, "file:///tmp/a.png");
}

#[tokio::test]
async fn test_api_error_fails_only_that_item() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(image_response()))
        .expect(1)
        .mount(&server)
        .await;

    let stage = session(&server).gemini_stage(QuickAction::default()).unwrap();
    let report = stage
        .process(items(&["a.png", "b.png"]), &CancellationToken::new(), &NoOpObserver)
        .await
        .unwrap();

    assert_eq!(report.statuses(), vec![StatusKind::Error, StatusKind::Completed]);
    let message = report.items[0].error_message().unwrap();
    assert!(message.contains("API error (400"), "{}", message);
    assert!(message.contains("API key not valid"), "{}", message);
}

#[tokio::test]
async fn test_text_only_response_is_extraction_failure() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "I cannot edit this image"}]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stage = session(&server).gemini_stage(QuickAction::default()).unwrap();
    let report = stage
        .process(items(&["a.png"]), &CancellationToken::new(), &NoOpObserver)
        .await
        .unwrap();

    assert_eq!(report.statuses(), vec![StatusKind::Error]);
    assert!(report.items[0]
        .error_message()
        .unwrap()
        .contains("No processed image found in response"));

    let err = stage.send_to_removal(&report).unwrap_err();
    assert!(matches!(err, BatchError::NoCompletedItems));
}

#[tokio::test]
async fn test_cancel_aborts_slow_request_and_stops_batch() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(image_response())
                .set_delay(Duration::from_secs(30)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let stage = session(&server).gemini_stage(QuickAction::default()).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let report = stage
        .process(items(&["a.png", "b.png", "c.png"]), &cancel, &NoOpObserver)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(
        report.statuses(),
        vec![StatusKind::Error, StatusKind::Queued, StatusKind::Queued]
    );
    assert_eq!(report.items[0].error_message(), Some("Processing cancelled"));
    assert!(!stage.runner().is_running());
}

#[tokio::test]
async fn test_cancel_during_only_request_reports_cancelled() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(image_response())
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let stage = session(&server).gemini_stage(QuickAction::default()).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let report = stage
        .process(items(&["a.png"]), &cancel, &NoOpObserver)
        .await
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.statuses(), vec![StatusKind::Error]);
}

#[tokio::test]
async fn test_rate_limited_item_is_not_sent() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(image_response()))
        .expect(0)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let limiter = Arc::new(RateLimiter::with_clock(10, Duration::from_secs(60), clock.clone()));
    for _ in 0..10 {
        limiter.record_call();
    }
    clock.advance(Duration::from_secs(5));

    let session = session(&server).with_limiter(limiter);
    let stage = session.gemini_stage(QuickAction::default()).unwrap();
    let report = stage
        .process(items(&["a.png"]), &CancellationToken::new(), &NoOpObserver)
        .await
        .unwrap();

    assert_eq!(report.statuses(), vec![StatusKind::Error]);
    assert_eq!(
        report.items[0].error_message(),
        Some("Rate limit reached. Please wait 55 seconds before trying again.")
    );
}

#[tokio::test]
async fn test_missing_credential_stops_batch() {
    let server = MockServer::start().await;
    Mock::given(matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let session = session(&server);
    session.credentials().clear().unwrap();
    let stage = session.gemini_stage(QuickAction::default()).unwrap();

    let err = stage
        .process(items(&["a.png"]), &CancellationToken::new(), &NoOpObserver)
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::Config(_)));
    assert!(!stage.runner().is_running());
}

#[tokio::test]
async fn test_oversized_batch_rejected() {
    let server = MockServer::start().await;
    let stage = session(&server).gemini_stage(QuickAction::default()).unwrap();

    let names: Vec<String> = (0..6).map(|i| format!("{}.png", i)).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let err = stage
        .process(items(&names), &CancellationToken::new(), &NoOpObserver)
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::InvalidInput(_)));
}
