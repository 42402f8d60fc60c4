//! Twilio REST client.

use async_trait::async_trait;
use bytes::Bytes;

use super::{OutboundCallRequest, RecordingInfo, Telephony, TelephonyError};
use crate::config::TelephonyConfig;

/// Telephony client over the Twilio 2010-04-01 REST API.
pub struct TwilioClient {
    account_sid: String,
    auth_token: String,
    messaging_service_sid: String,
    base_url: String,
    client: reqwest::Client,
}

impl TwilioClient {
    pub fn new(config: &TelephonyConfig) -> Self {
        Self {
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            messaging_service_sid: config.messaging_service_sid.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
        }
    }

    fn account_url(&self, path: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/{path}",
            self.base_url, self.account_sid
        )
    }

    fn check_configured(&self) -> Result<(), TelephonyError> {
        if self.account_sid.trim().is_empty() || self.auth_token.trim().is_empty() {
            return Err(TelephonyError::Config(
                "account sid and auth token are required".to_owned(),
            ));
        }
        Ok(())
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<serde_json::Value, TelephonyError> {
        self.check_configured()?;
        let response = self
            .client
            .post(self.account_url(path))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        response
            .json()
            .await
            .map_err(|e| TelephonyError::Parse(e.to_string()))
    }
}

impl std::fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioClient")
            .field("account_sid", &self.account_sid)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TelephonyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TelephonyError::Status {
        status: status.as_u16(),
        body,
    })
}

fn sid_of(value: &serde_json::Value) -> Result<String, TelephonyError> {
    value
        .get("sid")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| TelephonyError::Parse("response has no sid".to_owned()))
}

#[async_trait]
impl Telephony for TwilioClient {
    async fn place_outbound_call(
        &self,
        request: &OutboundCallRequest,
    ) -> Result<String, TelephonyError> {
        let value = self
            .post_form(
                "Calls.json",
                &[
                    ("To", request.to.as_str()),
                    ("From", request.from.as_str()),
                    ("Url", request.url.as_str()),
                    ("StatusCallback", request.status_callback.as_str()),
                    ("Record", "true"),
                    ("MachineDetection", "Enable"),
                    ("Timeout", "30"),
                    ("AsyncAmd", "true"),
                    ("AsyncAmdStatusCallback", request.amd_callback.as_str()),
                ],
            )
            .await?;
        let sid = sid_of(&value)?;
        tracing::info!(call_sid = %sid, to = %request.to, "outbound call placed");
        Ok(sid)
    }

    async fn complete_call(&self, call_sid: &str) -> Result<(), TelephonyError> {
        self.post_form(&format!("Calls/{call_sid}.json"), &[("Status", "completed")])
            .await?;
        Ok(())
    }

    async fn start_recording(
        &self,
        call_sid: &str,
        callback_url: &str,
    ) -> Result<(), TelephonyError> {
        self.post_form(
            &format!("Calls/{call_sid}/Recordings.json"),
            &[
                ("RecordingChannels", "dual"),
                ("RecordingStatusCallback", callback_url),
            ],
        )
        .await?;
        Ok(())
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<String, TelephonyError> {
        let value = self
            .post_form(
                "Messages.json",
                &[
                    ("To", to),
                    ("MessagingServiceSid", self.messaging_service_sid.as_str()),
                    ("Body", body),
                ],
            )
            .await?;
        sid_of(&value)
    }

    async fn list_recordings(&self, call_sid: &str) -> Result<Vec<RecordingInfo>, TelephonyError> {
        self.check_configured()?;
        let response = self
            .client
            .get(self.account_url("Recordings.json"))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .query(&[("CallSid", call_sid)])
            .send()
            .await?;
        let value: serde_json::Value = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| TelephonyError::Parse(e.to_string()))?;

        let recordings = value
            .get("recordings")
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let sid = item.get("sid")?.as_str()?.to_owned();
                        let call_sid = item
                            .get("call_sid")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or(call_sid)
                            .to_owned();
                        Some(RecordingInfo { sid, call_sid })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(recordings)
    }

    async fn download_recording(&self, recording_sid: &str) -> Result<Bytes, TelephonyError> {
        self.check_configured()?;
        let response = self
            .client
            .get(self.account_url(&format!("Recordings/{recording_sid}.wav")))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;
        Ok(ensure_success(response).await?.bytes().await?)
    }

    async fn delete_recording(&self, recording_sid: &str) -> Result<(), TelephonyError> {
        self.check_configured()?;
        let response = self
            .client
            .delete(self.account_url(&format!("Recordings/{recording_sid}.json")))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
