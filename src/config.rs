//! Configuration types for the coaching service.
//!
//! Loaded from a TOML file (see [`crate::app_dirs::config_file`]) and then
//! overlaid with environment variables so deployments can keep credentials
//! out of the file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CoachError, Result};

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    /// HTTP gateway settings.
    pub server: ServerConfig,
    /// Telephony provider credentials and endpoints.
    pub telephony: TelephonyConfig,
    /// Conversational voice engine settings.
    pub voice: VoiceEngineConfig,
    /// LLM provider settings.
    pub llm: LlmConfig,
    /// Record store location.
    pub store: StoreConfig,
    /// Blob storage for call recordings.
    pub blob: BlobConfig,
    /// Transactional email delivery.
    pub mail: MailConfig,
    /// Persona names and public links used in prompts and messages.
    pub persona: PersonaConfig,
    /// Live call behaviour.
    pub call: CallConfig,
    /// Post-call pipeline timings and retry budgets.
    pub pipeline: PipelineConfig,
    /// Inbound SMS handling.
    pub sms: SmsConfig,
    /// Scheduling extraction behaviour.
    pub scheduling: SchedulingConfig,
    /// Background reminder / no-show sweeps.
    pub sweeps: SweepConfig,
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Public base URL the telephony provider reaches us on
    /// (e.g. `https://coach.example.com`). Used for callbacks.
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 5001,
            public_url: String::new(),
        }
    }
}

/// Telephony provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    /// Account SID.
    pub account_sid: String,
    /// Auth token (basic-auth password).
    pub auth_token: String,
    /// Messaging service used for outbound SMS.
    pub messaging_service_sid: String,
    /// Caller id for outbound calls.
    pub phone_number: String,
    /// REST API base URL.
    pub api_base_url: String,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            messaging_service_sid: String::new(),
            phone_number: String::new(),
            api_base_url: "https://api.twilio.com".to_owned(),
        }
    }
}

/// Voice engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceEngineConfig {
    /// API key sent as `xi-api-key`.
    pub api_key: String,
    /// Agent id of the coach persona (scheduled and discovery calls).
    pub coach_agent_id: String,
    /// Agent id of the assistant persona (unscheduled and unknown callers).
    pub assistant_agent_id: String,
    /// Conversation websocket URL (agent id is appended as a query param).
    pub ws_url: String,
    /// REST base URL for transcript retrieval.
    pub api_base_url: String,
}

impl Default for VoiceEngineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            coach_agent_id: String::new(),
            assistant_agent_id: String::new(),
            ws_url: "wss://api.elevenlabs.io/v1/convai/conversation".to_owned(),
            api_base_url: "https://api.elevenlabs.io".to_owned(),
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Anthropic API key.
    pub anthropic_api_key: String,
    /// Anthropic model id.
    pub anthropic_model: String,
    /// Anthropic API base URL.
    pub anthropic_base_url: String,
    /// OpenAI API key.
    pub openai_api_key: String,
    /// OpenAI model id.
    pub openai_model: String,
    /// Search-enabled OpenAI model behind the agent's web search tool.
    pub openai_search_model: String,
    /// OpenAI API base URL.
    pub openai_base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: String::new(),
            anthropic_model: "claude-3-5-sonnet-20241022".to_owned(),
            anthropic_base_url: "https://api.anthropic.com".to_owned(),
            openai_api_key: String::new(),
            openai_model: "gpt-4o-mini".to_owned(),
            openai_search_model: "gpt-4o-mini-search-preview".to_owned(),
            openai_base_url: "https://api.openai.com".to_owned(),
            request_timeout_secs: 60,
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path. `None` uses [`crate::app_dirs::database_file`].
    pub database_path: Option<PathBuf>,
}

/// Blob storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// Root directory for buckets. `None` uses [`crate::app_dirs::blob_dir`].
    pub root_dir: Option<PathBuf>,
    /// Public base URL signed links are issued under.
    pub public_base_url: String,
    /// Secret mixed into URL signatures.
    pub signing_secret: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            public_base_url: "http://localhost:5001/blobs".to_owned(),
            signing_secret: String::new(),
        }
    }
}

/// Transactional email API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Send endpoint. Empty disables email (invites are logged and skipped).
    pub api_url: String,
    /// Bearer token for the send endpoint.
    pub api_key: String,
    /// Sender address.
    pub from_address: String,
    /// Sender display name.
    pub from_name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            from_address: "team@meetmaximo.com".to_owned(),
            from_name: "Maximo AI Coach".to_owned(),
        }
    }
}

/// Names and links that show up in prompts and user-facing copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Full coach name.
    pub coach_name: String,
    /// Short name the coach introduces itself with.
    pub coach_short_name: String,
    /// Assistant persona name.
    pub assistant_name: String,
    /// Signup link sent to unknown numbers.
    pub signup_url: String,
    /// Contact-card link sent in the welcome sequence.
    pub save_contact_url: String,
    /// Support address.
    pub support_email: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            coach_name: "Maximo".to_owned(),
            coach_short_name: "Max".to_owned(),
            assistant_name: "Sarah".to_owned(),
            signup_url: "www.meetmaximo.com".to_owned(),
            save_contact_url: "https://meetmaximo.com/save-contact".to_owned(),
            support_email: "team@meetmaximo.com".to_owned(),
        }
    }
}

/// Live call configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Duration in milliseconds that caller audio is dropped after each
    /// agent response. `0` disables the window.
    pub non_interruptible_ms: u64,
    /// Elapsed-time offsets (seconds since call start) at which the coach
    /// prompt is regenerated and pushed to the voice engine.
    pub prompt_refresh_secs: Vec<u64>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            non_interruptible_ms: 1_500,
            prompt_refresh_secs: vec![720],
        }
    }
}

/// Post-call pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delay before listing recordings, letting the provider finish processing.
    pub recording_settle_secs: u64,
    /// Recording download attempts.
    pub download_attempts: u32,
    /// Fixed backoff between download attempts.
    pub download_backoff_secs: u64,
    /// Whole-pipeline attempts until a non-empty transcript is available.
    pub transcript_attempts: u32,
    /// Delay between whole-pipeline attempts.
    pub transcript_retry_ms: u64,
    /// Gap between the two post-call SMS parts.
    pub message_gap_ms: u64,
    /// Signed recording URL lifetime.
    pub signed_url_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recording_settle_secs: 5,
            download_attempts: 3,
            download_backoff_secs: 5,
            transcript_attempts: 10,
            transcript_retry_ms: 1_000,
            message_gap_ms: 2_000,
            signed_url_ttl_secs: 315_576_000,
        }
    }
}

/// Inbound SMS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    /// Inbound messages accepted per phone number per minute.
    pub rate_limit_per_minute: u32,
    /// SMS messages folded into one digest summary.
    pub summary_batch_size: usize,
    /// Delay before sending a scheduling confirmation SMS.
    pub confirmation_delay_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 10,
            summary_batch_size: 10,
            confirmation_delay_secs: 10,
        }
    }
}

/// Scheduling extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Resolve "this/next <weekday>", "today" and "tomorrow" locally and
    /// prefer that date over the provider's when they disagree.
    pub deterministic_dates: bool,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            deterministic_dates: true,
        }
    }
}

/// Background sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Whether the sweep loop runs at all.
    pub enabled: bool,
    /// Seconds between sweep ticks.
    pub tick_secs: u64,
    /// Local hour reminders and nudges are sent at.
    pub reminder_hour: u32,
    /// Minutes either side of the scheduled time treated as "call time".
    pub call_window_minutes: i64,
    /// Delay between the "I'm ready" SMS and the outbound call.
    pub outbound_call_delay_secs: u64,
    /// Minutes after the scheduled time before a call counts as missed.
    pub no_show_minutes: i64,
    /// Days after signup on which inactive users get a nudge.
    pub nudge_days: Vec<i64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: 60,
            reminder_hour: 8,
            call_window_minutes: 3,
            outbound_call_delay_secs: 30,
            no_show_minutes: 20,
            nudge_days: vec![1, 2, 3, 5, 8, 11],
        }
    }
}

impl CoachConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CoachError::Config(e.to_string()))
    }

    /// Load from `path` when it exists, otherwise start from defaults, then
    /// apply environment overrides.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overlay values from process environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary key lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = v;
        }
        if let Some(v) = get("PUBLIC_URL") {
            self.server.public_url = v;
        }
        if let Some(v) = get("TWILIO_ACCOUNT_SID") {
            self.telephony.account_sid = v;
        }
        if let Some(v) = get("TWILIO_AUTH_TOKEN") {
            self.telephony.auth_token = v;
        }
        if let Some(v) = get("TWILIO_MESSAGING_SERVICE_SID") {
            self.telephony.messaging_service_sid = v;
        }
        if let Some(v) = get("TWILIO_PHONE_NUMBER") {
            self.telephony.phone_number = v;
        }
        if let Some(v) = get("ELEVENLABS_API_KEY") {
            self.voice.api_key = v;
        }
        if let Some(v) = get("ELEVENLABS_COACH_AGENT_ID") {
            self.voice.coach_agent_id = v;
        }
        if let Some(v) = get("ELEVENLABS_ASSISTANT_AGENT_ID") {
            self.voice.assistant_agent_id = v;
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.llm.anthropic_api_key = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.llm.openai_api_key = v;
        }
        if let Some(v) = get("COACHLINE_DATABASE") {
            self.store.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("BLOB_SIGNING_SECRET") {
            self.blob.signing_secret = v;
        }
        if let Some(v) = get("MAIL_API_URL") {
            self.mail.api_url = v;
        }
        if let Some(v) = get("MAIL_API_KEY") {
            self.mail.api_key = v;
        }
    }

    /// Reject configurations missing credentials the service cannot run without.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Config`] listing every missing setting.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("telephony.account_sid", &self.telephony.account_sid),
            ("telephony.auth_token", &self.telephony.auth_token),
            (
                "telephony.messaging_service_sid",
                &self.telephony.messaging_service_sid,
            ),
            ("voice.api_key", &self.voice.api_key),
            ("llm.anthropic_api_key", &self.llm.anthropic_api_key),
            ("llm.openai_api_key", &self.llm.openai_api_key),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoachError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }

    /// Resolved SQLite database path.
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(crate::app_dirs::database_file)
    }

    /// Resolved blob root directory.
    pub fn blob_root(&self) -> PathBuf {
        self.blob
            .root_dir
            .clone()
            .unwrap_or_else(crate::app_dirs::blob_dir)
    }
}
