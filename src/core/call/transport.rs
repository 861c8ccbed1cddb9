//! Provider-neutral view of one call's media connection.
//!
//! The WebSocket handler translates Twilio JSON into [`TransportEvent`]s for
//! the session manager and drains [`TransportRoute`]s back onto the socket.

use std::collections::HashMap;

use tokio::sync::mpsc;

/// Identifiers and custom parameters announced by the `start` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMetadata {
    pub call_sid: String,
    pub stream_sid: String,
    /// `<Parameter>` values from the `<Stream>` TwiML, e.g. the caller number
    pub parameters: HashMap<String, String>,
}

impl CallMetadata {
    /// Caller phone number passed by the voice webhook, if any.
    pub fn caller_number(&self) -> Option<&str> {
        ["from", "From", "caller"].iter().find_map(|key| {
            self.parameters
                .get(*key)
                .map(String::as_str)
                .filter(|number| !number.trim().is_empty())
        })
    }
}

/// Inbound events the session manager acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Start(CallMetadata),
    /// Base64 payload of one audio frame
    Media(String),
    Stop,
}

/// Outbound messages for the connection writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRoute {
    Media { stream_sid: String, payload: String },
    Mark { stream_sid: String, name: String },
    /// Close the connection and stop the writer
    Close,
}

pub type TransportSender = mpsc::Sender<TransportRoute>;
