//! Fake upstream services for session tests
//!
//! - `FakeSTTConnector`: hands out in-memory transcription streams and lets a
//!   test push finalized transcripts or errors into them
//! - `FakeChatModel`: scripted replies, optional gate to hold generations
//!   open, concurrency tracking
//! - `RecordingSynthesizer`: records every synthesis request, optionally gated
//! - `RecordingAnnouncer` / `RecordingLeadSink`: capture delivery and leads

// Not every test binary uses every fake
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};

use gusto_gateway::core::call::{
    Announcer, CallMetadata, DeliveryError, LeadError, LeadRecord, LeadSink, TransportRoute,
};
use gusto_gateway::core::llm::{
    ChatModel, ChatRequest, ChatRole, GeneratorSettings, LLMError, LLMResult, ResponseGenerator,
};
use gusto_gateway::core::stt::{
    BaseSTT, STTConfig, STTConnector, STTError, STTErrorCallback, STTResult, STTResultCallback,
};
use gusto_gateway::core::tts::{
    AudioData, AudioFormat, SpeechSynthesizer, TTSError, TTSResult, VoiceSettings,
};

/// Poll `condition` every 10 ms until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drain everything currently queued on a transport receiver.
pub fn drain_routes(rx: &mut mpsc::Receiver<TransportRoute>) -> Vec<TransportRoute> {
    let mut routes = Vec::new();
    while let Ok(route) = rx.try_recv() {
        routes.push(route);
    }
    routes
}

// =============================================================================
// Transcription
// =============================================================================

/// Test-side view of one fake transcription stream.
#[derive(Default)]
pub struct StreamProbe {
    result_callback: Mutex<Option<STTResultCallback>>,
    error_callback: Mutex<Option<STTErrorCallback>>,
    audio: Mutex<Vec<Bytes>>,
    connected: AtomicBool,
    disconnects: AtomicUsize,
}

impl StreamProbe {
    /// Deliver a finalized transcript as the provider would.
    pub async fn emit_final(&self, transcript: &str) {
        self.emit(STTResult::new(transcript.to_string(), true, true, 0.98))
            .await;
    }

    pub async fn emit(&self, result: STTResult) {
        let callback = self.result_callback.lock().clone();
        if let Some(callback) = callback {
            callback(result).await;
        }
    }

    pub async fn emit_error(&self, error: STTError) {
        let callback = self.error_callback.lock().clone();
        if let Some(callback) = callback {
            callback(error).await;
        }
    }

    pub fn audio_frames(&self) -> Vec<Bytes> {
        self.audio.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::Acquire)
    }
}

pub struct FakeSTT {
    config: STTConfig,
    probe: Arc<StreamProbe>,
    fail_connect: bool,
}

#[async_trait]
impl BaseSTT for FakeSTT {
    fn new(config: STTConfig) -> Result<Self, STTError> {
        Ok(Self {
            config,
            probe: Arc::new(StreamProbe::default()),
            fail_connect: false,
        })
    }

    async fn connect(&mut self) -> Result<(), STTError> {
        if self.fail_connect {
            return Err(STTError::ConnectionFailed("fake refused".to_string()));
        }
        self.probe.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), STTError> {
        self.probe.connected.store(false, Ordering::Release);
        self.probe.disconnects.fetch_add(1, Ordering::AcqRel);
        *self.probe.result_callback.lock() = None;
        *self.probe.error_callback.lock() = None;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.probe.is_connected()
    }

    async fn send_audio(&mut self, audio_data: Bytes) -> Result<(), STTError> {
        if !self.probe.is_connected() {
            return Err(STTError::ConnectionFailed("not connected".to_string()));
        }
        self.probe.audio.lock().push(audio_data);
        Ok(())
    }

    async fn on_result(&mut self, callback: STTResultCallback) -> Result<(), STTError> {
        *self.probe.result_callback.lock() = Some(callback);
        Ok(())
    }

    async fn on_error(&mut self, callback: STTErrorCallback) -> Result<(), STTError> {
        *self.probe.error_callback.lock() = Some(callback);
        Ok(())
    }

    fn get_config(&self) -> Option<&STTConfig> {
        Some(&self.config)
    }

    fn get_provider_info(&self) -> &'static str {
        "fake"
    }
}

#[derive(Default)]
pub struct FakeSTTConnector {
    streams: Mutex<Vec<Arc<StreamProbe>>>,
    fail_connect: AtomicBool,
}

impl FakeSTTConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Streams created from now on refuse to connect.
    pub fn refuse_connections(&self) {
        self.fail_connect.store(true, Ordering::Release);
    }

    pub fn streams(&self) -> Vec<Arc<StreamProbe>> {
        self.streams.lock().clone()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn latest(&self) -> Arc<StreamProbe> {
        self.streams
            .lock()
            .last()
            .cloned()
            .expect("no transcription stream created yet")
    }
}

impl STTConnector for FakeSTTConnector {
    fn create(&self, config: &STTConfig) -> Result<Box<dyn BaseSTT>, STTError> {
        let mut stt = FakeSTT::new(config.clone())?;
        stt.fail_connect = self.fail_connect.load(Ordering::Acquire);
        self.streams.lock().push(stt.probe.clone());
        Ok(Box::new(stt))
    }
}

// =============================================================================
// Chat model
// =============================================================================

/// Scripted chat model. Without a script it answers `Reply to: <text>`.
#[derive(Default)]
pub struct FakeChatModel {
    script: Mutex<VecDeque<LLMResult<Option<String>>>>,
    requests: Mutex<Vec<ChatRequest>>,
    gate: Option<Semaphore>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeChatModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Generations block until [`FakeChatModel::open_gate`] lets them through.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    pub fn open_gate(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn push_reply(&self, reply: LLMResult<Option<String>>) {
        self.script.lock().push_back(reply);
    }

    pub fn fail_next(&self) {
        self.push_reply(Err(LLMError::ApiError {
            status: 500,
            body: "upstream exploded".to_string(),
        }));
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Acquire)
    }

    pub fn generator(self: &Arc<Self>) -> ResponseGenerator {
        ResponseGenerator::new(self.clone(), GeneratorSettings::default())
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    async fn complete(&self, request: ChatRequest) -> LLMResult<Option<String>> {
        let transcript = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.requests.lock().push(request);

        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(now, Ordering::AcqRel);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(Some(format!("Reply to: {transcript}"))))
    }
}

// =============================================================================
// Speech synthesis
// =============================================================================

#[derive(Default)]
pub struct RecordingSynthesizer {
    calls: Mutex<Vec<(String, VoiceSettings)>>,
    fail: AtomicBool,
    gate: Option<Semaphore>,
}

impl RecordingSynthesizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Syntheses block until [`RecordingSynthesizer::open_gate`] lets them through.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    pub fn open_gate(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::Release);
    }

    pub fn calls(&self) -> Vec<(String, VoiceSettings)> {
        self.calls.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynthesizer {
    async fn synthesize(&self, text: &str, settings: &VoiceSettings) -> TTSResult<AudioData> {
        self.calls.lock().push((text.to_string(), settings.clone()));

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if self.fail.load(Ordering::Acquire) {
            return Err(TTSError::ProviderError("fake synthesis failure".to_string()));
        }

        let data = match settings.format {
            // 40 ms of 24 kHz silence, two outbound frames
            AudioFormat::Pcm => Bytes::from(vec![0u8; 960 * 2]),
            _ => Bytes::from_static(b"ID3fake-mp3"),
        };
        Ok(AudioData::new(data, settings.format))
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

// =============================================================================
// Delivery and leads
// =============================================================================

#[derive(Default)]
pub struct RecordingAnnouncer {
    announcements: Mutex<Vec<(Option<String>, String)>>,
}

impl RecordingAnnouncer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// (call sid, TwiML) pairs in delivery order.
    pub fn announcements(&self) -> Vec<(Option<String>, String)> {
        self.announcements.lock().clone()
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn announce(&self, call: Option<&CallMetadata>, twiml: &str) -> Result<(), DeliveryError> {
        self.announcements
            .lock()
            .push((call.map(|c| c.call_sid.clone()), twiml.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLeadSink {
    leads: Mutex<Vec<LeadRecord>>,
}

impl RecordingLeadSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn leads(&self) -> Vec<LeadRecord> {
        self.leads.lock().clone()
    }
}

#[async_trait]
impl LeadSink for RecordingLeadSink {
    async fn submit(&self, lead: &LeadRecord) -> Result<(), LeadError> {
        self.leads.lock().push(lead.clone());
        Ok(())
    }
}
