// HTTP alert sink against a mock alerting backend

use crisis_guard::crisis::alert::{AlertError, AlertSink, CrisisAlert, HttpAlertSink};
use crisis_guard::crisis::{CrisisGuard, HeadlessPage, InputType};
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn sample_alert() -> CrisisAlert {
    CrisisAlert {
        user_id: "anonymous_test".to_string(),
        crisis_level: "HIGH".to_string(),
        detected_content: "I want to die and feel hopeless".to_string(),
        timestamp: "2026-03-01T12:00:00.000Z".to_string(),
        detected_keywords: vec!["want to die".to_string(), "hopeless".to_string()],
    }
}

#[tokio::test]
async fn test_detection_posts_alert() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/crisis-alert")
        .match_header("content-type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({
                "crisisLevel": "HIGH",
                "detectedContent": "I want to die and feel hopeless",
            })),
            Matcher::Regex("\"detectedKeywords\"".to_string()),
        ]))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let sink = HttpAlertSink::new(format!("{}/crisis-alert", server.url())).unwrap();
    let page = Arc::new(HeadlessPage::lesson_page());
    let guard = CrisisGuard::builder(page.clone())
        .alert_sink(Arc::new(sink))
        .build();

    guard.analyze("I want to die and feel hopeless", InputType::TextInput, Some("journal"));
    guard.flush().await;

    mock.assert_async().await;
    assert!(page.snapshot().is_locked());
}

#[tokio::test]
async fn test_clear_text_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/crisis-alert")
        .expect(0)
        .create_async()
        .await;

    let sink = HttpAlertSink::new(format!("{}/crisis-alert", server.url())).unwrap();
    let guard = CrisisGuard::builder(Arc::new(HeadlessPage::lesson_page()))
        .alert_sink(Arc::new(sink))
        .build();

    guard.analyze("I had a great day today", InputType::TextInput, None);
    guard.flush().await;

    mock.assert_async().await;
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/crisis-alert")
        .with_status(500)
        .create_async()
        .await;

    let sink = HttpAlertSink::new(format!("{}/crisis-alert", server.url())).unwrap();
    let err = sink.send_alert(&sample_alert()).await.unwrap_err();
    assert!(matches!(err, AlertError::Status(500)));
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let sink =
        HttpAlertSink::with_timeout("http://127.0.0.1:1/crisis-alert", Duration::from_secs(2))
            .unwrap();
    let err = sink.send_alert(&sample_alert()).await.unwrap_err();
    assert!(err.is_transport());

    // Same backend behind a guard: the local response is unaffected
    let page = Arc::new(HeadlessPage::lesson_page());
    let guard = CrisisGuard::builder(page.clone())
        .alert_sink(Arc::new(sink))
        .build();
    guard.analyze("I want to die and feel hopeless", InputType::TextInput, None);
    guard.flush().await;

    let snapshot = page.snapshot();
    assert!(snapshot.modal.open);
    assert!(snapshot.is_locked());
    assert_eq!(guard.events().len(), 1);
}

#[tokio::test]
async fn test_analysis_endpoint_receives_analyzed_text() {
    let mut server = mockito::Server::new_async().await;
    let analysis = server
        .mock("POST", "/analyze")
        .match_body(Matcher::PartialJson(json!({
            "content": "Today I walked around the lake",
            "inputType": "text_input",
            "fieldName": "journal",
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let alert = server
        .mock("POST", "/crisis-alert")
        .expect(0)
        .create_async()
        .await;

    let sink = HttpAlertSink::new(format!("{}/crisis-alert", server.url()))
        .unwrap()
        .with_analysis_url(format!("{}/analyze", server.url()));
    assert!(sink.analysis_enabled());

    let guard = CrisisGuard::builder(Arc::new(HeadlessPage::lesson_page()))
        .alert_sink(Arc::new(sink))
        .build();

    guard.analyze("Today I walked around the lake", InputType::TextInput, Some("journal"));
    // Too short to analyze, never leaves the page
    guard.analyze("hello", InputType::TextInput, Some("journal"));
    guard.flush().await;

    analysis.assert_async().await;
    alert.assert_async().await;
}
