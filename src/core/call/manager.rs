//! Call session lifecycle and the per-call turn worker.
//!
//! The manager owns the [`SessionRegistry`] and the shared collaborators.
//! Transport handlers feed it connection events; each session gets its own
//! transcription stream and a turn worker that runs transcript -> reply ->
//! speech -> delivery strictly in arrival order.
//!
//! Teardown never waits for a turn in flight. Instead the worker re-checks
//! registry membership after every slow step and drops results that belong
//! to a session that has already ended.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::delivery::ReplyDelivery;
use super::lead::{LeadRecord, LeadSink};
use super::registry::SessionRegistry;
use super::session::{CallSession, SessionEvent, SessionId};
use super::state::ConversationHandle;
use super::transport::{TransportEvent, TransportRoute, TransportSender};
use crate::core::codec::decode_media_payload;
use crate::core::llm::ResponseGenerator;
use crate::core::stt::{STTConfig, STTConnector, STTError, STTResult};
use crate::core::tts::{AudioArtifactStore, SpeechSynthesizer, VoiceSettings};

/// Capacity of each session's event queue
const SESSION_EVENT_CAPACITY: usize = 64;

const CLOSE_SEND_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Transcription stream unavailable: {0}")]
    Transcription(#[from] STTError),
}

struct ManagerInner {
    registry: SessionRegistry,
    connector: Arc<dyn STTConnector>,
    stt_config: STTConfig,
    generator: ResponseGenerator,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    artifacts: Option<AudioArtifactStore>,
    delivery: ReplyDelivery,
    leads: Option<Arc<dyn LeadSink>>,
    voice: VoiceSettings,
}

/// Cloneable handle to the session manager.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

pub struct SessionManagerBuilder {
    connector: Arc<dyn STTConnector>,
    stt_config: STTConfig,
    generator: ResponseGenerator,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    artifacts: Option<AudioArtifactStore>,
    delivery: ReplyDelivery,
    leads: Option<Arc<dyn LeadSink>>,
    voice: VoiceSettings,
}

impl SessionManagerBuilder {
    pub fn artifacts(mut self, store: AudioArtifactStore) -> Self {
        self.artifacts = Some(store);
        self
    }

    pub fn delivery(mut self, delivery: ReplyDelivery) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn lead_sink(mut self, sink: Arc<dyn LeadSink>) -> Self {
        self.leads = Some(sink);
        self
    }

    pub fn voice(mut self, voice: VoiceSettings) -> Self {
        self.voice = voice;
        self
    }

    pub fn build(self) -> SessionManager {
        SessionManager {
            inner: Arc::new(ManagerInner {
                registry: SessionRegistry::new(),
                connector: self.connector,
                stt_config: self.stt_config,
                generator: self.generator,
                synthesizer: self.synthesizer,
                artifacts: self.artifacts,
                delivery: self.delivery,
                leads: self.leads,
                voice: self.voice,
            }),
        }
    }
}

impl SessionManager {
    pub fn builder(
        connector: Arc<dyn STTConnector>,
        stt_config: STTConfig,
        generator: ResponseGenerator,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder {
            connector,
            stt_config,
            generator,
            synthesizer,
            artifacts: None,
            delivery: ReplyDelivery::default(),
            leads: None,
            voice: VoiceSettings::default(),
        }
    }

    /// Open a session for a newly accepted transport connection.
    ///
    /// On error nothing is registered and the caller should close the
    /// connection.
    pub async fn on_connect(&self, transport: TransportSender) -> Result<SessionId, SessionError> {
        let id: SessionId = Uuid::new_v4().to_string();

        let mut stt = self
            .inner
            .connector
            .create(&self.inner.stt_config)
            .inspect_err(|e| error!(session_id = %id, "Failed to create transcription stream: {}", e))?;

        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(SESSION_EVENT_CAPACITY);

        let result_tx = event_tx.clone();
        stt.on_result(Arc::new(move |result: STTResult| {
            let tx = result_tx.clone();
            Box::pin(async move {
                if result.is_final && !result.transcript.trim().is_empty() {
                    let _ = tx.send(SessionEvent::FinalTranscript(result.transcript)).await;
                }
            })
        }))
        .await?;

        let error_tx = event_tx;
        stt.on_error(Arc::new(move |err: STTError| {
            let tx = error_tx.clone();
            Box::pin(async move {
                let _ = tx.send(SessionEvent::TranscriptionError(err)).await;
            })
        }))
        .await?;

        stt.connect()
            .await
            .inspect_err(|e| error!(session_id = %id, "Failed to connect transcription stream: {}", e))?;

        let conversation = ConversationHandle::new();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let session = CallSession::new(id.clone(), transport.clone(), stt, conversation.clone())
            .with_worker_shutdown(shutdown_tx);
        self.inner.registry.insert(Arc::new(session));

        tokio::spawn(self.clone().run_turn_worker(
            id.clone(),
            conversation,
            transport,
            event_rx,
            shutdown_rx,
        ));

        info!(
            session_id = %id,
            active_sessions = self.inner.registry.len(),
            "Call session started"
        );
        Ok(id)
    }

    pub async fn on_transport_event(&self, id: &str, event: TransportEvent) {
        let Some(session) = self.inner.registry.get(id) else {
            debug!(session_id = id, "Event for unknown session ignored");
            return;
        };

        match event {
            TransportEvent::Start(call) => {
                info!(
                    session_id = id,
                    call_sid = %call.call_sid,
                    stream_sid = %call.stream_sid,
                    "Media stream started"
                );
                session.conversation.set_call(call);
            }
            TransportEvent::Media(payload) => forward_media(&session, &payload).await,
            TransportEvent::Stop => {
                drop(session);
                self.teardown(id, "stop event").await;
            }
        }
    }

    pub async fn on_transport_close(&self, id: &str) {
        debug!(session_id = id, "Transport closed");
        self.teardown(id, "transport closed").await;
    }

    pub async fn on_transport_error(&self, id: &str, err: &(dyn std::error::Error + Send + Sync)) {
        warn!(session_id = id, "Transport error: {}", err);
        self.teardown(id, "transport error").await;
    }

    /// Release everything a session owns. Only the first caller for a given
    /// id does any work; every later call returns `false`.
    pub async fn teardown(&self, id: &str, reason: &str) -> bool {
        let Some(session) = self.inner.registry.remove(id) else {
            debug!(session_id = id, reason, "Session already torn down");
            return false;
        };

        session.stop_worker();

        if let Err(e) = session.stt.lock().await.disconnect().await {
            warn!(session_id = id, "Failed to close transcription stream: {}", e);
        }

        match tokio::time::timeout(CLOSE_SEND_TIMEOUT, session.transport.send(TransportRoute::Close))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(_)) => debug!(session_id = id, "Transport writer already gone"),
            Err(_) => warn!(session_id = id, "Timed out closing transport"),
        }

        self.hand_off_lead(&session).await;

        let stats = session.conversation.stats();
        info!(
            session_id = id,
            reason,
            turns_completed = stats.turns_completed,
            turns_failed = stats.turns_failed,
            history_len = stats.history_len,
            media_frames = session.media_frames(),
            dropped_frames = session.dropped_frames(),
            duration_ms = session.started_at.elapsed().as_millis() as u64,
            "Call session ended"
        );
        true
    }

    /// Tear down every live session.
    pub async fn shutdown_all(&self) {
        let ids = self.inner.registry.ids();
        if !ids.is_empty() {
            info!("Closing {} active call sessions", ids.len());
        }
        for id in ids {
            self.teardown(&id, "server shutdown").await;
        }
    }

    pub fn session_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.inner.registry.ids()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.inner.registry.contains(id)
    }

    pub fn conversation(&self, id: &str) -> Option<ConversationHandle> {
        self.inner
            .registry
            .get(id)
            .map(|session| session.conversation.clone())
    }

    async fn hand_off_lead(&self, session: &CallSession) {
        let Some(sink) = &self.inner.leads else {
            return;
        };

        let call = session.conversation.call();
        let lead = LeadRecord::from_call(call.as_ref(), &session.conversation.user_utterances());
        if !lead.is_actionable() {
            debug!(session_id = %session.id, "No actionable lead from call");
            return;
        }

        match sink.submit(&lead).await {
            Ok(()) => info!(session_id = %session.id, "Lead handed off"),
            Err(e) => warn!(session_id = %session.id, "Lead hand-off failed: {}", e),
        }
    }

    async fn run_turn_worker(
        self,
        id: SessionId,
        conversation: ConversationHandle,
        transport: TransportSender,
        mut events: mpsc::Receiver<SessionEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            let event = tokio::select! {
                _ = &mut shutdown => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            if !self.is_active(&id) {
                break;
            }

            match event {
                SessionEvent::FinalTranscript(text) => {
                    self.run_turn(&id, &conversation, &transport, &text).await
                }
                SessionEvent::TranscriptionError(err) => {
                    warn!(session_id = %id, "Transcription error: {}", err)
                }
            }
        }
        debug!(session_id = %id, "Turn worker stopped");
    }

    async fn run_turn(
        &self,
        id: &str,
        conversation: &ConversationHandle,
        transport: &TransportSender,
        transcript: &str,
    ) {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return;
        }

        let Some(_generating) = conversation.try_begin_generation() else {
            warn!(session_id = id, "Reply already in progress, transcript skipped");
            return;
        };

        info!(session_id = id, "Caller said: {}", transcript);

        let history = conversation.history();
        let reply = match self.inner.generator.generate(transcript, &history).await {
            Ok(reply) => reply,
            Err(e) => {
                conversation.record_failed_turn();
                error!(session_id = id, "Reply generation failed: {}", e);
                return;
            }
        };

        if !self.is_active(id) {
            info!(session_id = id, "Session ended during generation, reply discarded");
            return;
        }

        conversation.append_exchange(transcript, reply.clone());
        info!(session_id = id, "Replying: {}", reply);

        let settings = self
            .inner
            .voice
            .clone()
            .with_format(self.inner.delivery.mode().audio_format());
        let audio = match self.inner.synthesizer.synthesize(&reply, &settings).await {
            Ok(audio) => audio,
            Err(e) => {
                error!(session_id = id, "Speech synthesis failed: {}", e);
                return;
            }
        };

        if !self.is_active(id) {
            info!(session_id = id, "Session ended during synthesis, reply discarded");
            return;
        }

        if let Some(store) = &self.inner.artifacts {
            if let Err(e) = store.persist(id, &audio).await {
                warn!(session_id = id, "Failed to save reply audio: {}", e);
            }
        }

        let call = conversation.call();
        if let Err(e) = self
            .inner
            .delivery
            .deliver(call.as_ref(), transport, &reply, &audio)
            .await
        {
            warn!(session_id = id, "Reply delivery failed: {}", e);
        }
    }
}

async fn forward_media(session: &CallSession, payload: &str) {
    let audio = match decode_media_payload(payload) {
        Ok(audio) => audio,
        Err(e) => {
            session.count_dropped_frame();
            warn!(session_id = %session.id, "Dropping media frame: {}", e);
            return;
        }
    };

    session.count_media_frame();
    let mut stt = session.stt.lock().await;
    if let Err(e) = stt.send_audio(audio).await {
        if session.mark_stt_send_failed() {
            warn!(session_id = %session.id, "Failed to forward audio to transcription: {}", e);
        } else {
            debug!(session_id = %session.id, "Failed to forward audio to transcription: {}", e);
        }
    }
}
