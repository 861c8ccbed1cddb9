//! Twilio Media Streams wire messages
//!
//! Inbound frames are JSON text messages discriminated by `event`. Outbound
//! frames carry base64 mu-law audio and marks for the same stream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::call::{CallMetadata, TransportEvent, TransportRoute};

// =============================================================================
// Incoming Messages (Twilio -> Server)
// =============================================================================

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioIncomingMessage {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        start: StartPayload,
    },
    Media {
        media: MediaPayload,
    },
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    Mark {
        mark: MarkPayload,
    },
    Dtmf {
        dtmf: DtmfPayload,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StartPayload {
    pub account_sid: Option<String>,
    pub call_sid: String,
    pub stream_sid: String,
    pub tracks: Vec<String>,
    pub custom_parameters: HashMap<String, String>,
    pub media_format: Option<MediaFormat>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DtmfPayload {
    #[serde(default)]
    pub track: Option<String>,
    pub digit: String,
}

impl TwilioIncomingMessage {
    /// The session manager's view of this frame, if it acts on it.
    pub fn into_transport_event(self) -> Option<TransportEvent> {
        match self {
            TwilioIncomingMessage::Start { stream_sid, start } => {
                let stream_sid = if start.stream_sid.is_empty() {
                    stream_sid.unwrap_or_default()
                } else {
                    start.stream_sid
                };
                Some(TransportEvent::Start(CallMetadata {
                    call_sid: start.call_sid,
                    stream_sid,
                    parameters: start.custom_parameters,
                }))
            }
            TwilioIncomingMessage::Media { media } => Some(TransportEvent::Media(media.payload)),
            TwilioIncomingMessage::Stop { .. } => Some(TransportEvent::Stop),
            TwilioIncomingMessage::Connected { .. }
            | TwilioIncomingMessage::Mark { .. }
            | TwilioIncomingMessage::Dtmf { .. }
            | TwilioIncomingMessage::Unknown => None,
        }
    }
}

// =============================================================================
// Outgoing Messages (Server -> Twilio)
// =============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioOutgoingMessage {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutgoingMedia,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: OutgoingMark,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutgoingMedia {
    pub payload: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutgoingMark {
    pub name: String,
}

impl TwilioOutgoingMessage {
    /// Wire form of an outbound route. `Close` has none.
    pub fn from_route(route: TransportRoute) -> Option<Self> {
        match route {
            TransportRoute::Media {
                stream_sid,
                payload,
            } => Some(TwilioOutgoingMessage::Media {
                stream_sid,
                media: OutgoingMedia { payload },
            }),
            TransportRoute::Mark { stream_sid, name } => Some(TwilioOutgoingMessage::Mark {
                stream_sid,
                mark: OutgoingMark { name },
            }),
            TransportRoute::Close => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connected() {
        let msg: TwilioIncomingMessage = serde_json::from_str(
            r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#,
        )
        .unwrap();
        assert!(matches!(msg, TwilioIncomingMessage::Connected { .. }));
        assert_eq!(msg.into_transport_event(), None);
    }

    #[test]
    fn test_parse_start_with_parameters() {
        let json = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "accountSid": "AC123",
                "streamSid": "MZ456",
                "callSid": "CA789",
                "tracks": ["inbound"],
                "customParameters": {"from": "+15551234567"},
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
            },
            "streamSid": "MZ456"
        }"#;
        let msg: TwilioIncomingMessage = serde_json::from_str(json).unwrap();

        let Some(TransportEvent::Start(call)) = msg.into_transport_event() else {
            panic!("expected start event");
        };
        assert_eq!(call.call_sid, "CA789");
        assert_eq!(call.stream_sid, "MZ456");
        assert_eq!(call.caller_number(), Some("+15551234567"));
    }

    #[test]
    fn test_parse_media_and_stop() {
        let media: TwilioIncomingMessage = serde_json::from_str(
            r#"{"event":"media","sequenceNumber":"3","media":{"track":"inbound","chunk":"1","timestamp":"5","payload":"//8="},"streamSid":"MZ1"}"#,
        )
        .unwrap();
        assert_eq!(
            media.into_transport_event(),
            Some(TransportEvent::Media("//8=".to_string()))
        );

        let stop: TwilioIncomingMessage = serde_json::from_str(
            r#"{"event":"stop","sequenceNumber":"5","stop":{"accountSid":"AC1","callSid":"CA1"},"streamSid":"MZ1"}"#,
        )
        .unwrap();
        assert_eq!(stop.into_transport_event(), Some(TransportEvent::Stop));
    }

    #[test]
    fn test_mark_dtmf_and_unknown_are_not_forwarded() {
        for json in [
            r#"{"event":"mark","streamSid":"MZ1","mark":{"name":"reply-3"}}"#,
            r#"{"event":"dtmf","streamSid":"MZ1","dtmf":{"track":"inbound_track","digit":"5"}}"#,
            r#"{"event":"something-new","streamSid":"MZ1"}"#,
        ] {
            let msg: TwilioIncomingMessage = serde_json::from_str(json).unwrap();
            assert_eq!(msg.into_transport_event(), None, "{json}");
        }
    }

    #[test]
    fn test_malformed_frames_fail_to_parse() {
        assert!(serde_json::from_str::<TwilioIncomingMessage>("not json").is_err());
        assert!(serde_json::from_str::<TwilioIncomingMessage>(r#"{"event":"media"}"#).is_err());
    }

    #[test]
    fn test_outgoing_wire_format() {
        let media = TwilioOutgoingMessage::from_route(TransportRoute::Media {
            stream_sid: "MZ1".to_string(),
            payload: "AAEC".to_string(),
        })
        .unwrap();
        assert_eq!(
            serde_json::to_value(&media).unwrap(),
            serde_json::json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "AAEC"}})
        );

        let mark = TwilioOutgoingMessage::from_route(TransportRoute::Mark {
            stream_sid: "MZ1".to_string(),
            name: "reply-1".to_string(),
        })
        .unwrap();
        assert_eq!(
            serde_json::to_value(&mark).unwrap(),
            serde_json::json!({"event": "mark", "streamSid": "MZ1", "mark": {"name": "reply-1"}})
        );

        assert!(TwilioOutgoingMessage::from_route(TransportRoute::Close).is_none());
    }
}
