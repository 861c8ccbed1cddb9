//! Twilio Media Streams WebSocket handler
//!
//! One connection carries one call. Inbound frames are handed to the
//! session manager in arrival order; outbound routes are drained by a
//! dedicated writer task.

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::core::call::{TransportEvent, TransportRoute};
use crate::middleware::connection_limit::ConnectionSlot;
use crate::state::AppState;

use super::messages::{TwilioIncomingMessage, TwilioOutgoingMessage};

/// Outbound buffer; a streamed reply is queued here frame by frame
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// How long the writer may take to flush after the reader is done
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Media stream WebSocket handler
///
/// Upgrades the HTTP connection for a Twilio `<Connect><Stream>` session.
pub async fn twilio_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    slot: Option<Extension<ConnectionSlot>>,
) -> Response {
    debug!("Media stream WebSocket upgrade requested");

    let slot = slot.map(|Extension(slot)| slot);
    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_stream(socket, state, slot))
}

async fn handle_media_stream(socket: WebSocket, state: Arc<AppState>, _slot: Option<ConnectionSlot>) {
    let (mut sender, mut receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<TransportRoute>(CHANNEL_BUFFER_SIZE);

    // Writer task for outgoing frames
    let sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let result = match TwilioOutgoingMessage::from_route(route) {
                Some(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing frame: {}", e);
                        continue;
                    }
                },
                None => {
                    debug!("Closing media stream WebSocket");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                warn!("Failed to send WebSocket frame: {}", e);
                break;
            }
        }
    });

    let session_id = match state.sessions.on_connect(route_tx.clone()).await {
        Ok(id) => id,
        Err(e) => {
            error!("Rejecting media stream: {}", e);
            let _ = route_tx.send(TransportRoute::Close).await;
            drop(route_tx);
            let _ = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, sender_task).await;
            return;
        }
    };
    // The session owns the outbound channel from here on
    drop(route_tx);

    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                let incoming = match serde_json::from_str::<TwilioIncomingMessage>(&text) {
                    Ok(incoming) => incoming,
                    Err(e) => {
                        warn!(session_id = %session_id, "Dropping unparseable frame: {}", e);
                        continue;
                    }
                };

                match &incoming {
                    TwilioIncomingMessage::Connected { protocol, .. } => {
                        info!(session_id = %session_id, protocol = ?protocol, "Media stream connected");
                    }
                    TwilioIncomingMessage::Mark { mark } => {
                        debug!(session_id = %session_id, "Playback reached mark {}", mark.name);
                    }
                    TwilioIncomingMessage::Dtmf { dtmf } => {
                        info!(session_id = %session_id, "Caller pressed {}", dtmf.digit);
                    }
                    TwilioIncomingMessage::Unknown => {
                        debug!(session_id = %session_id, "Ignoring unknown event");
                    }
                    _ => {}
                }

                if let Some(event) = incoming.into_transport_event() {
                    let is_stop = event == TransportEvent::Stop;
                    state.sessions.on_transport_event(&session_id, event).await;
                    if is_stop {
                        break;
                    }
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                state.sessions.on_transport_close(&session_id).await;
                break;
            }
            Some(Ok(Message::Binary(data))) => {
                debug!(session_id = %session_id, "Ignoring {} byte binary frame", data.len());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                state.sessions.on_transport_error(&session_id, &e).await;
                break;
            }
        }
    }

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, sender_task)
        .await
        .is_err()
    {
        debug!(session_id = %session_id, "Writer did not finish in time");
    }
    debug!(session_id = %session_id, "Media stream WebSocket terminated");
}
