//! Service wiring: builds every collaborator from [`CoachConfig`] and hands
//! the gateway and sweeper their shared handles.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::analysis::PostCallPipeline;
use crate::blob::LocalBlobStore;
use crate::call::{AgentIds, CallServices, CallSettings, LiveCalls, PendingCalls};
use crate::config::CoachConfig;
use crate::error::Result;
use crate::gateway::{GatewayState, host_of};
use crate::llm::Providers;
use crate::notify::{HttpMailer, Mailer, Notifier, PhoneRateLimiter};
use crate::recording::RecordingPipeline;
use crate::scheduling::{SchedulingExtractor, SchedulingService};
use crate::sms::{RescheduleIntents, SmsHandler, WelcomeDelays, WelcomeSequence};
use crate::store::{RecordStore, SqliteRecordStore};
use crate::sweeps::Sweeper;
use crate::telephony::{OutboundDialer, Telephony, TwilioClient};
use crate::voice::{ConvaiEngine, ConvaiTranscripts, TranscriptSource, VoiceEngine};

/// External collaborators. Everything else is derived from these.
#[derive(Clone)]
pub struct Collaborators {
    pub providers: Providers,
    pub store: Arc<dyn RecordStore>,
    pub telephony: Arc<dyn Telephony>,
    pub engine: Arc<dyn VoiceEngine>,
    pub transcripts: Arc<dyn TranscriptSource>,
    pub mailer: Arc<dyn Mailer>,
    pub blobs: Arc<LocalBlobStore>,
}

impl Collaborators {
    /// Real clients: SQLite on disk, Twilio, the voice engine, the mail API
    /// and the configured LLM providers.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be opened.
    pub fn from_config(config: &CoachConfig) -> Result<Self> {
        let database = config.database_path();
        let store = SqliteRecordStore::open(&database)?;
        tracing::info!(path = %database.display(), "record store opened");

        Ok(Self {
            providers: Providers::from_config(&config.llm),
            store: Arc::new(store),
            telephony: Arc::new(TwilioClient::new(&config.telephony)),
            engine: Arc::new(ConvaiEngine::new(&config.voice)),
            transcripts: Arc::new(ConvaiTranscripts::new(&config.voice)),
            mailer: Arc::new(HttpMailer::new(&config.mail)),
            blobs: Arc::new(LocalBlobStore::new(
                config.blob_root(),
                &config.blob.public_base_url,
                &config.blob.signing_secret,
            )),
        })
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("blobs", &self.blobs)
            .finish_non_exhaustive()
    }
}

/// The running service graph.
#[derive(Debug)]
pub struct Services {
    pub gateway: GatewayState,
    pub sweeper: Arc<Sweeper>,
    pub shutdown: CancellationToken,
}

impl Services {
    /// Build from configuration with real clients.
    ///
    /// # Errors
    ///
    /// Fails when a collaborator cannot be created.
    pub fn from_config(config: &CoachConfig) -> Result<Self> {
        Ok(Self::assemble(config, Collaborators::from_config(config)?))
    }

    /// Wire the domain services on top of `parts`.
    pub fn assemble(config: &CoachConfig, parts: Collaborators) -> Self {
        let Collaborators {
            providers,
            store,
            telephony,
            engine,
            transcripts,
            mailer,
            blobs,
        } = parts;
        let shutdown = CancellationToken::new();
        let public_url = config.server.public_url.trim_end_matches('/').to_owned();

        let notifier = Arc::new(Notifier::new(
            telephony.clone(),
            store.clone(),
            mailer,
            config.persona.clone(),
            &config.mail.from_address,
        ));
        let dialer = OutboundDialer::new(
            telephony.clone(),
            &public_url,
            &config.telephony.phone_number,
        );

        let recordings = Arc::new(RecordingPipeline::new(
            telephony.clone(),
            blobs.clone(),
            transcripts,
            store.clone(),
            &config.pipeline,
        ));
        let scheduling = Arc::new(SchedulingService::new(
            store.clone(),
            notifier.clone(),
            SchedulingExtractor::new(
                providers.clone(),
                config.persona.clone(),
                &config.scheduling,
            ),
            Duration::from_secs(config.sms.confirmation_delay_secs),
        ));
        let post_call = Arc::new(PostCallPipeline::new(
            providers.clone(),
            store.clone(),
            notifier.clone(),
            recordings,
            scheduling.clone(),
            Duration::from_millis(config.pipeline.message_gap_ms),
        ));

        let calls = Arc::new(CallServices {
            store: store.clone(),
            telephony,
            engine,
            notifier: notifier.clone(),
            post_call,
            pending: Arc::new(PendingCalls::new()),
            live: Arc::new(LiveCalls::new()),
            agents: AgentIds {
                coach: config.voice.coach_agent_id.clone(),
                assistant: config.voice.assistant_agent_id.clone(),
            },
            settings: CallSettings::from_config(&config.call),
            recording_callback: format!("{public_url}/recording-callback"),
        });

        let sms_limits = Arc::new(PhoneRateLimiter::new(config.sms.rate_limit_per_minute));
        let sms = Arc::new(SmsHandler::new(
            providers.clone(),
            store.clone(),
            notifier.clone(),
            scheduling,
            dialer.clone(),
            sms_limits.clone(),
            RescheduleIntents::new(),
            config.sms.summary_batch_size,
        ));
        let welcome = Arc::new(WelcomeSequence::new(
            notifier.clone(),
            dialer.clone(),
            WelcomeDelays::default(),
        ));
        let sweeper = Arc::new(
            Sweeper::new(
                store,
                notifier,
                dialer,
                config.sweeps.clone(),
                shutdown.child_token(),
            )
            .with_sms_limits(sms_limits),
        );

        Self {
            gateway: GatewayState {
                calls,
                sms,
                welcome,
                blobs,
                providers,
                public_host: host_of(&public_url),
            },
            sweeper,
            shutdown,
        }
    }
}
