//! WebSocket message types for Deepgram live transcription.
//!
//! Audio goes out as binary frames. Control messages go out as JSON text
//! frames. Everything Deepgram sends back is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};

// =============================================================================
// Incoming Messages (Server to Client)
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

/// Transcription result for a span of audio.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsMessage {
    pub channel: Channel,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub speech_final: bool,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
}

impl ResultsMessage {
    /// Text and confidence of the top alternative, if any.
    pub fn best_alternative(&self) -> Option<&Alternative> {
        self.channel.alternatives.first()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataMessage {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UtteranceEndMessage {
    #[serde(default)]
    pub last_word_end: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechStartedMessage {
    #[serde(default)]
    pub timestamp: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
}

impl ErrorMessage {
    pub fn text(&self) -> String {
        self.description
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "unknown Deepgram error".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum DeepgramMessage {
    Results(ResultsMessage),
    Metadata(MetadataMessage),
    UtteranceEnd(UtteranceEndMessage),
    SpeechStarted(SpeechStartedMessage),
    Error(ErrorMessage),
    #[serde(other)]
    Unknown,
}

impl DeepgramMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// =============================================================================
// Outgoing Messages (Client to Server)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Keeps the stream open while no audio is flowing
    KeepAlive,
    /// Flush buffered audio into final results
    Finalize,
    /// Flush and close the stream
    CloseStream,
}

impl ControlMessage {
    pub fn to_json(self) -> String {
        match self {
            ControlMessage::KeepAlive => r#"{"type":"KeepAlive"}"#,
            ControlMessage::Finalize => r#"{"type":"Finalize"}"#,
            ControlMessage::CloseStream => r#"{"type":"CloseStream"}"#,
        }
        .to_string()
    }
}
