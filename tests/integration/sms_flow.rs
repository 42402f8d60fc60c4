//! Inbound SMS through the webhook, with LLM calls served by wiremock.

use crate::helpers::{TestApp, anthropic_reply, field, openai_reply};
use coachline::store::RecordStore as _;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::Mock;

#[tokio::test]
async fn unknown_number_is_sent_signup_link() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/sms"))
        .form(&[("From", "+15555550199"), ("Body", "who is this?")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let sent = app.twilio_forms("/Messages.json").await;
    assert_eq!(sent.len(), 1);
    assert_eq!(field(&sent[0], "To"), Some("+15555550199"));
    assert!(field(&sent[0], "Body").unwrap().contains("www.meetmaximo.com"));
    assert_eq!(field(&sent[0], "MessagingServiceSid"), Some("MG_test"));
}

#[tokio::test]
async fn missing_body_is_bad_request() {
    let app = TestApp::spawn().await;
    let response = app
        .client
        .post(app.url("/api/sms/webhook"))
        .form(&[("From", "+15555550199")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert!(response
        .text()
        .await
        .unwrap()
        .contains("Missing phone number or message body"));
    assert!(app.twilio_forms("/Messages.json").await.is_empty());
}

#[tokio::test]
async fn call_request_dials_client() {
    let app = TestApp::spawn().await;
    let profile = app.add_profile("+15555550100").await;

    // Reschedule detection goes to OpenAI first; the yes/no call check to Anthropic.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(openai_reply(r#"{"wantsToReschedule": false, "newCallTime": null}"#))
        .mount(&app.openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_string_contains("ONLY 'YES' or 'NO'"))
        .respond_with(anthropic_reply("YES"))
        .mount(&app.anthropic)
        .await;

    let response = app
        .client
        .post(app.url("/sms"))
        .form(&[("From", profile.phone.as_str()), ("Body", "Can you call me now?")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let calls = app.twilio_forms("/Calls.json").await;
    assert_eq!(calls.len(), 1);
    assert_eq!(field(&calls[0], "To"), Some("+15555550100"));
    assert_eq!(field(&calls[0], "From"), Some("+15550009999"));
    assert!(field(&calls[0], "Url").unwrap().starts_with("https://coach.example/incoming-call"));

    let sent = app.twilio_forms("/Messages.json").await;
    assert_eq!(sent.len(), 1);
    assert!(field(&sent[0], "Body").unwrap().contains("call you right now"));

    let messages = app
        .services
        .gateway
        .calls
        .store
        .list_messages(&profile.id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "Can you call me now?");
}

#[tokio::test]
async fn provider_outage_sends_apology() {
    let app = TestApp::spawn().await;
    let profile = app.add_profile("+15555550100").await;
    // No LLM mocks mounted: both providers answer 404.

    let response = app
        .client
        .post(app.url("/sms"))
        .form(&[("From", profile.phone.as_str()), ("Body", "How was my week?")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let sent = app.twilio_forms("/Messages.json").await;
    assert_eq!(sent.len(), 1);
    assert!(app.twilio_forms("/Calls.json").await.is_empty());
}
