//! Telephony-facing routes over real HTTP.

use crate::helpers::{TestApp, field, openai_reply};
use serde_json::json;
use wiremock::Mock;
use wiremock::matchers::{body_string_contains, method, path};

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::spawn().await;
    let body: serde_json::Value = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn incoming_call_connects_media_stream() {
    let app = TestApp::spawn().await;
    let profile = app.add_profile("+15555550100").await;

    let response = app
        .client
        .post(app.url("/incoming-call"))
        .header("host", "coach.example")
        .form(&[("From", profile.phone.as_str()), ("CallSid", "CA100")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "text/xml");
    let xml = response.text().await.unwrap();
    assert!(xml.contains(r#"<Stream url="wss://coach.example/media-stream"/>"#));

    let pending = app.services.gateway.calls.pending.take("CA100").unwrap();
    assert_eq!(pending.profile.map(|p| p.id), Some(profile.id));
}

#[tokio::test]
async fn voicemail_detection_ends_the_call() {
    let app = TestApp::spawn().await;
    app.add_profile("+15555550100").await;

    let response = app
        .client
        .post(app.url("/amd-status-callback?phone=%2B15555550100"))
        .form(&[("CallSid", "CA200"), ("AnsweredBy", "machine_start")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().contains("<Hangup/>"));

    let completions = app.twilio_forms("/Calls/CA200.json").await;
    assert_eq!(completions.len(), 1);
    assert_eq!(field(&completions[0], "Status"), Some("completed"));
}

#[tokio::test]
async fn hang_up_tool_needs_live_call() {
    let app = TestApp::spawn().await;

    let missing = app
        .client
        .post(app.url("/api/tools/hang-up"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 400);

    let unknown = app
        .client
        .post(app.url("/api/tools/hang-up"))
        .json(&json!({ "conversation_id": "conv_missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);
}

#[tokio::test]
async fn hang_up_tool_answers_json_for_bad_bodies() {
    let app = TestApp::spawn().await;
    for body in ["{\"conversation_id\":", "conversation_id=conv_1"] {
        let response = app
            .client
            .post(app.url("/api/tools/hang-up"))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let error: serde_json::Value = response.json().await.unwrap();
        assert!(error["error"].is_string());
    }
}

#[tokio::test]
async fn coaching_technique_cards_are_served() {
    let app = TestApp::spawn().await;
    let card: serde_json::Value = app
        .client
        .get(app.url("/api/tools/powerful-questions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(card["technique"], "Powerful Questions");
    assert_eq!(card["examples"].as_array().unwrap().len(), 10);

    let missing = app
        .client
        .get(app.url("/api/tools/unknown-technique"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn web_search_uses_the_search_model() {
    let app = TestApp::spawn().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("gpt-4o-mini-search-preview"))
        .respond_with(openai_reply("Open with the numbers, then the ask."))
        .mount(&app.openai)
        .await;

    let response = app
        .client
        .post(app.url("/api/tools/search-the-web"))
        .json(&json!({ "prompt": "How do I run a first board meeting?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let answer: String = response.json().await.unwrap();
    assert_eq!(answer, "Open with the numbers, then the ask.");
}

#[tokio::test]
async fn status_callbacks_are_acknowledged() {
    let app = TestApp::spawn().await;
    for route in ["/recording-callback", "/call-status-callback"] {
        let response = app
            .client
            .post(app.url(route))
            .form(&[("CallSid", "CA300")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("<Response></Response>"));
    }
}
