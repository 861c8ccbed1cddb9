//! Getting a reply back to the caller.
//!
//! Two strategies are supported. `AnnounceText` hands the reply text to
//! Twilio as a `<Say>` directive. `StreamAudio` converts the synthesized
//! PCM to 8 kHz mu-law and streams it over the call's media connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use zeroize::Zeroize;

use super::transport::{CallMetadata, TransportRoute};
use crate::core::codec::pcm_to_media_frames;
use crate::core::tts::{AudioData, AudioFormat};
use crate::core::twiml;

pub const TWILIO_API_BASE_URL: &str = "https://api.twilio.com";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Call metadata has no {0}; the start event was not received")]
    MissingCallInfo(&'static str),

    #[error("Streaming needs PCM audio, got {0}")]
    UnsupportedAudio(AudioFormat),

    #[error("Transport closed before the reply was sent")]
    TransportClosed,

    #[error("Twilio request failed: {0}")]
    Network(String),

    #[error("Twilio returned {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Replaces the call TwiML with `<Say>`. Twilio ends the media stream
    /// when it does, so only the first reply of a call is heard.
    AnnounceText,
    #[default]
    StreamAudio,
}

impl DeliveryMode {
    /// Audio format to request from the synthesizer for this mode.
    pub fn audio_format(&self) -> AudioFormat {
        match self {
            DeliveryMode::AnnounceText => AudioFormat::Mp3,
            DeliveryMode::StreamAudio => AudioFormat::Pcm,
        }
    }
}

impl std::str::FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "announce" | "announce_text" | "say" => Ok(DeliveryMode::AnnounceText),
            "stream" | "stream_audio" | "audio" => Ok(DeliveryMode::StreamAudio),
            other => Err(format!(
                "Unknown reply delivery mode: {other}. Expected announce or stream"
            )),
        }
    }
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMode::AnnounceText => f.write_str("announce"),
            DeliveryMode::StreamAudio => f.write_str("stream"),
        }
    }
}

/// Sends TwiML to a live call.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, call: Option<&CallMetadata>, twiml: &str) -> Result<(), DeliveryError>;
}

/// Logs the TwiML instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LoggingAnnouncer;

#[async_trait]
impl Announcer for LoggingAnnouncer {
    async fn announce(&self, call: Option<&CallMetadata>, twiml: &str) -> Result<(), DeliveryError> {
        info!(
            call_sid = call.map(|c| c.call_sid.as_str()).unwrap_or("unknown"),
            "TwiML response ready: {}", twiml
        );
        Ok(())
    }
}

/// Updates the live call through the Twilio REST API.
pub struct TwilioCallUpdater {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl TwilioCallUpdater {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        base_url: Option<&str>,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        Ok(Self {
            client,
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            base_url: base_url
                .unwrap_or(TWILIO_API_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn call_url(&self, call_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.base_url, self.account_sid, call_sid
        )
    }
}

impl Drop for TwilioCallUpdater {
    fn drop(&mut self) {
        self.auth_token.zeroize();
    }
}

#[async_trait]
impl Announcer for TwilioCallUpdater {
    async fn announce(&self, call: Option<&CallMetadata>, twiml: &str) -> Result<(), DeliveryError> {
        let call_sid = call
            .map(|c| c.call_sid.as_str())
            .filter(|sid| !sid.is_empty())
            .ok_or(DeliveryError::MissingCallInfo("call sid"))?;

        let response = self
            .client
            .post(self.call_url(call_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Twiml", twiml)])
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Api {
                status: status.as_u16(),
                body,
            });
        }

        info!(call_sid, "Reply announced via Twilio");
        Ok(())
    }
}

/// The configured delivery strategy.
#[derive(Clone)]
pub struct ReplyDelivery {
    mode: DeliveryMode,
    announcer: Arc<dyn Announcer>,
    announce_voice: String,
    pause_secs: u32,
}

impl Default for ReplyDelivery {
    fn default() -> Self {
        Self::stream()
    }
}

impl ReplyDelivery {
    pub fn announce(announcer: Arc<dyn Announcer>, voice: impl Into<String>) -> Self {
        Self {
            mode: DeliveryMode::AnnounceText,
            announcer,
            announce_voice: voice.into(),
            pause_secs: 30,
        }
    }

    pub fn stream() -> Self {
        Self {
            mode: DeliveryMode::StreamAudio,
            ..Self::announce(Arc::new(LoggingAnnouncer), "Polly.Joanna")
        }
    }

    pub fn with_pause(mut self, pause_secs: u32) -> Self {
        self.pause_secs = pause_secs;
        self
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub async fn deliver(
        &self,
        call: Option<&CallMetadata>,
        transport: &mpsc::Sender<TransportRoute>,
        text: &str,
        audio: &AudioData,
    ) -> Result<(), DeliveryError> {
        match self.mode {
            DeliveryMode::AnnounceText => {
                let markup = twiml::say(text, &self.announce_voice, self.pause_secs);
                self.announcer.announce(call, &markup).await
            }
            DeliveryMode::StreamAudio => stream_audio(call, transport, audio).await,
        }
    }
}

async fn stream_audio(
    call: Option<&CallMetadata>,
    transport: &mpsc::Sender<TransportRoute>,
    audio: &AudioData,
) -> Result<(), DeliveryError> {
    if audio.format != AudioFormat::Pcm {
        return Err(DeliveryError::UnsupportedAudio(audio.format));
    }

    let stream_sid = call
        .map(|c| c.stream_sid.clone())
        .filter(|sid| !sid.is_empty())
        .ok_or(DeliveryError::MissingCallInfo("stream sid"))?;

    let frames = pcm_to_media_frames(&audio.data, audio.sample_rate);
    let frame_count = frames.len();
    for payload in frames {
        transport
            .send(TransportRoute::Media {
                stream_sid: stream_sid.clone(),
                payload,
            })
            .await
            .map_err(|_| DeliveryError::TransportClosed)?;
    }

    transport
        .send(TransportRoute::Mark {
            stream_sid,
            name: format!("reply-{frame_count}"),
        })
        .await
        .map_err(|_| DeliveryError::TransportClosed)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingAnnouncer {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Announcer for RecordingAnnouncer {
        async fn announce(
            &self,
            _call: Option<&CallMetadata>,
            twiml: &str,
        ) -> Result<(), DeliveryError> {
            self.seen.lock().push(twiml.to_string());
            Ok(())
        }
    }

    fn call() -> CallMetadata {
        CallMetadata {
            call_sid: "CA1".to_string(),
            stream_sid: "MZ1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("announce".parse::<DeliveryMode>().unwrap(), DeliveryMode::AnnounceText);
        assert_eq!("STREAM".parse::<DeliveryMode>().unwrap(), DeliveryMode::StreamAudio);
        assert!("fax".parse::<DeliveryMode>().is_err());
        assert_eq!(DeliveryMode::StreamAudio.audio_format(), AudioFormat::Pcm);
        assert_eq!(DeliveryMode::default().to_string(), "stream");
        assert_eq!(ReplyDelivery::default().mode(), DeliveryMode::StreamAudio);
    }

    #[tokio::test]
    async fn test_announce_renders_say() {
        let announcer = Arc::new(RecordingAnnouncer::default());
        let delivery = ReplyDelivery::announce(announcer.clone(), "Polly.Joanna").with_pause(5);
        let (tx, _rx) = mpsc::channel(4);
        let audio = AudioData::new(Bytes::from_static(b"mp3"), AudioFormat::Mp3);

        delivery
            .deliver(Some(&call()), &tx, "Sure, I can help", &audio)
            .await
            .unwrap();

        let seen = announcer.seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains(r#"<Say voice="Polly.Joanna">Sure, I can help</Say>"#));
        assert!(seen[0].contains(r#"<Pause length="5"/>"#));
    }

    #[tokio::test]
    async fn test_stream_sends_frames_then_mark() {
        let delivery = ReplyDelivery::stream();
        let (tx, mut rx) = mpsc::channel(16);
        // 40 ms of 24 kHz PCM -> 320 mu-law bytes -> two frames
        let audio = AudioData::new(Bytes::from(vec![0u8; 960 * 2]), AudioFormat::Pcm);

        delivery.deliver(Some(&call()), &tx, "hi", &audio).await.unwrap();

        let mut routes = Vec::new();
        while let Ok(route) = rx.try_recv() {
            routes.push(route);
        }
        assert_eq!(routes.len(), 3);
        assert!(matches!(&routes[0], TransportRoute::Media { stream_sid, .. } if stream_sid == "MZ1"));
        assert!(matches!(&routes[1], TransportRoute::Media { .. }));
        assert!(matches!(&routes[2], TransportRoute::Mark { name, .. } if name == "reply-2"));
    }

    #[tokio::test]
    async fn test_stream_requires_pcm_and_stream_sid() {
        let delivery = ReplyDelivery::stream();
        let (tx, _rx) = mpsc::channel(16);

        let mp3 = AudioData::new(Bytes::from_static(b"mp3"), AudioFormat::Mp3);
        assert!(matches!(
            delivery.deliver(Some(&call()), &tx, "hi", &mp3).await,
            Err(DeliveryError::UnsupportedAudio(AudioFormat::Mp3))
        ));

        let pcm = AudioData::new(Bytes::from(vec![0u8; 480]), AudioFormat::Pcm);
        assert!(matches!(
            delivery.deliver(None, &tx, "hi", &pcm).await,
            Err(DeliveryError::MissingCallInfo(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_to_closed_transport() {
        let delivery = ReplyDelivery::stream();
        let (tx, rx) = mpsc::channel(16);
        drop(rx);

        let pcm = AudioData::new(Bytes::from(vec![0u8; 480]), AudioFormat::Pcm);
        assert!(matches!(
            delivery.deliver(Some(&call()), &tx, "hi", &pcm).await,
            Err(DeliveryError::TransportClosed)
        ));
    }

    #[test]
    fn test_twilio_call_url() {
        let updater = TwilioCallUpdater::new("AC123", "secret", Some("http://localhost:1/")).unwrap();
        assert_eq!(
            updater.call_url("CA9"),
            "http://localhost:1/2010-04-01/Accounts/AC123/Calls/CA9.json"
        );
    }

    #[tokio::test]
    async fn test_twilio_updater_needs_call_sid() {
        let updater = TwilioCallUpdater::new("AC123", "secret", Some("http://127.0.0.1:1")).unwrap();
        assert!(matches!(
            updater.announce(None, "<Response/>").await,
            Err(DeliveryError::MissingCallInfo("call sid"))
        ));
    }
}
