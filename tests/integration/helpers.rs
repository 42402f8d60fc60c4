//! Shared helpers for integration tests.
//!
//! Every test gets its own gateway on an ephemeral port, backed by a SQLite
//! file in a temp dir, with Twilio and both LLM providers served by wiremock.

use chrono::Utc;
use coachline::store::{NewProfile, Profile, RecordStore as _};
use coachline::{CoachConfig, GatewayServer, Services};
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(crate) const ACCOUNT_SID: &str = "AC_test";

#[allow(dead_code)]
pub(crate) struct TestApp {
    pub services: Services,
    pub server: GatewayServer,
    pub twilio: MockServer,
    pub anthropic: MockServer,
    pub openai: MockServer,
    pub base_url: String,
    pub client: reqwest::Client,
    _dir: tempfile::TempDir,
}

impl TestApp {
    /// Start with Twilio accepting every message and call.
    pub(crate) async fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let twilio = MockServer::start().await;
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r"/Messages\.json$"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sid": "SM_test" })))
            .mount(&twilio)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/2010-04-01/Accounts/{ACCOUNT_SID}/Calls.json")))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sid": "CA_test" })))
            .mount(&twilio)
            .await;

        let mut config = CoachConfig::default();
        config.server.public_url = "https://coach.example".to_owned();
        config.telephony.account_sid = ACCOUNT_SID.to_owned();
        config.telephony.auth_token = "token".to_owned();
        config.telephony.messaging_service_sid = "MG_test".to_owned();
        config.telephony.phone_number = "+15550009999".to_owned();
        config.telephony.api_base_url = twilio.uri();
        config.llm.anthropic_api_key = "sk-ant-test".to_owned();
        config.llm.anthropic_base_url = anthropic.uri();
        config.llm.openai_api_key = "sk-test".to_owned();
        config.llm.openai_base_url = openai.uri();
        config.store.database_path = Some(dir.path().join("coachline.db"));
        config.blob.root_dir = Some(dir.path().join("blobs"));
        config.sweeps.enabled = false;

        let services = Services::from_config(&config).expect("build services");
        let server = GatewayServer::start(services.gateway.clone(), "127.0.0.1", 0)
            .await
            .expect("start gateway");
        let base_url = format!("http://{}", server.addr());

        Self {
            services,
            server,
            twilio,
            anthropic,
            openai,
            base_url,
            client: reqwest::Client::new(),
            _dir: dir,
        }
    }

    pub(crate) fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base_url)
    }

    pub(crate) async fn add_profile(&self, phone: &str) -> Profile {
        self.services
            .gateway
            .calls
            .store
            .insert_profile(
                &NewProfile {
                    first_name: "Ada".into(),
                    last_name: "Lovelace".into(),
                    email: None,
                    phone: phone.into(),
                    timezone: "America/New_York".into(),
                },
                Utc::now(),
            )
            .await
            .expect("insert profile")
    }

    /// Form fields of every Twilio request whose path ends with `suffix`.
    pub(crate) async fn twilio_forms(&self, suffix: &str) -> Vec<Vec<(String, String)>> {
        self.twilio
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path().ends_with(suffix))
            .map(|r| {
                url::form_urlencoded::parse(&r.body)
                    .into_owned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

pub(crate) fn field<'a>(form: &'a [(String, String)], name: &str) -> Option<&'a str> {
    form.iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Anthropic messages response carrying `text`.
pub(crate) fn anthropic_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": text }],
        "stop_reason": "end_turn"
    }))
}

/// OpenAI chat completion carrying `content`.
pub(crate) fn openai_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    }))
}
