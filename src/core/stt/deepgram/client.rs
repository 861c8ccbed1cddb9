//! Deepgram live transcription WebSocket client.
//!
//! ```text
//! send_audio() ──▶ audio mpsc ──▶ connection task ──▶ Deepgram
//!                                        │
//!                  result mpsc ◀─────────┘──▶ error mpsc
//!                       │                         │
//!              result forward task       error forward task
//!                       │                         │
//!                  on_result cb               on_error cb
//! ```

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{Instant, interval_at, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::config::DeepgramSTTConfig;
use super::messages::{ControlMessage, DeepgramMessage};
use crate::core::stt::base::{
    BaseSTT, STTConfig, STTConnector, STTError, STTErrorCallback, STTResult, STTResultCallback,
};

/// Largest audio chunk accepted by `send_audio`.
const MAX_AUDIO_CHUNK_SIZE: usize = 64 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `disconnect` waits for the connection task to flush and close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

pub struct DeepgramSTT {
    config: Option<DeepgramSTTConfig>,

    /// Audio queue drained by the connection task
    ws_sender: Option<mpsc::Sender<Bytes>>,

    shutdown_tx: Option<oneshot::Sender<()>>,

    connection_handle: Option<tokio::task::JoinHandle<()>>,
    result_forward_handle: Option<tokio::task::JoinHandle<()>>,
    error_forward_handle: Option<tokio::task::JoinHandle<()>>,

    result_callback: Arc<Mutex<Option<STTResultCallback>>>,
    error_callback: Arc<Mutex<Option<STTErrorCallback>>>,

    /// Shared with the connection task
    is_connected: Arc<AtomicBool>,
}

impl DeepgramSTT {
    /// Handle one message from Deepgram.
    ///
    /// Returns `Ok(false)` when the server closed the stream. Provider error
    /// messages are reported through `error_tx` and do not stop the stream.
    pub(crate) fn handle_websocket_message(
        message: Message,
        result_tx: &mpsc::Sender<STTResult>,
        error_tx: &mpsc::Sender<STTError>,
    ) -> bool {
        match message {
            Message::Text(text) => match DeepgramMessage::parse(&text) {
                Ok(DeepgramMessage::Results(results)) => {
                    let Some(best) = results.best_alternative() else {
                        return true;
                    };
                    if !results.is_final || best.transcript.trim().is_empty() {
                        return true;
                    }

                    let stt_result = STTResult::new(
                        best.transcript.clone(),
                        results.is_final,
                        results.speech_final,
                        (best.confidence as f32).clamp(0.0, 1.0),
                    );
                    if result_tx.try_send(stt_result).is_err() {
                        warn!("Failed to queue Deepgram result - channel full or closed");
                    }
                }
                Ok(DeepgramMessage::Metadata(meta)) => {
                    debug!(
                        "Deepgram metadata: request_id={} duration={:.2}s",
                        meta.request_id, meta.duration
                    );
                }
                Ok(DeepgramMessage::UtteranceEnd(end)) => {
                    debug!("Deepgram utterance end at {:.2}s", end.last_word_end);
                }
                Ok(DeepgramMessage::SpeechStarted(started)) => {
                    debug!("Deepgram speech started at {:.2}s", started.timestamp);
                }
                Ok(DeepgramMessage::Error(err)) => {
                    let stt_error = STTError::ProviderError(err.text());
                    error!("Deepgram STT error: {}", stt_error);
                    let _ = error_tx.try_send(stt_error);
                }
                Ok(DeepgramMessage::Unknown) => {
                    debug!("Received unknown Deepgram message: {}", text);
                }
                Err(e) => {
                    warn!("Failed to parse Deepgram message: {}", e);
                }
            },
            Message::Close(frame) => {
                info!("Deepgram WebSocket closed: {:?}", frame);
                return false;
            }
            Message::Ping(_) | Message::Pong(_) => {}
            other => {
                debug!("Ignoring unexpected Deepgram frame: {:?}", other);
            }
        }

        true
    }

    async fn start_connection(&mut self, config: DeepgramSTTConfig) -> Result<(), STTError> {
        let url = config.build_websocket_url()?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| STTError::ConnectionFailed(format!("Invalid Deepgram request: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Token {}", config.base.api_key))
            .map_err(|_| STTError::AuthenticationFailed("Malformed Deepgram API key".into()))?;
        request.headers_mut().insert("Authorization", auth);

        let (ws_stream, _response) = match timeout(CONNECT_TIMEOUT, connect_async(request)).await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return Err(STTError::ConnectionFailed(format!(
                    "Failed to connect to Deepgram: {e}"
                )));
            }
            Err(_) => {
                return Err(STTError::ConnectionFailed(
                    "Timed out connecting to Deepgram".to_string(),
                ));
            }
        };

        info!("Connected to Deepgram STT WebSocket");

        let (ws_tx, mut ws_rx) = mpsc::channel::<Bytes>(64);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (result_tx, mut result_rx) = mpsc::channel::<STTResult>(256);
        let (error_tx, mut error_rx) = mpsc::channel::<STTError>(64);

        self.ws_sender = Some(ws_tx);
        self.shutdown_tx = Some(shutdown_tx);

        let is_connected = self.is_connected.clone();
        is_connected.store(true, Ordering::Release);
        let keepalive_every = config.keepalive_interval;

        let connection_handle = tokio::spawn(async move {
            let (mut ws_sink, mut ws_stream) = ws_stream.split();
            let mut keepalive = interval_at(Instant::now() + keepalive_every, keepalive_every);
            let mut last_audio = Instant::now();

            loop {
                tokio::select! {
                    Some(audio_data) = ws_rx.recv() => {
                        let data_len = audio_data.len();
                        if let Err(e) = ws_sink.send(Message::Binary(audio_data)).await {
                            let stt_error = STTError::NetworkError(format!(
                                "Failed to send audio to Deepgram: {e}"
                            ));
                            error!("{}", stt_error);
                            let _ = error_tx.try_send(stt_error);
                            break;
                        }
                        last_audio = Instant::now();
                        debug!("Sent {} bytes of audio to Deepgram", data_len);
                    }

                    _ = keepalive.tick() => {
                        if last_audio.elapsed() >= keepalive_every {
                            let msg = Message::Text(ControlMessage::KeepAlive.to_json().into());
                            if let Err(e) = ws_sink.send(msg).await {
                                warn!("Failed to send Deepgram KeepAlive: {}", e);
                            }
                        }
                    }

                    message = ws_stream.next() => {
                        match message {
                            Some(Ok(msg)) => {
                                if !Self::handle_websocket_message(msg, &result_tx, &error_tx) {
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                let stt_error = STTError::NetworkError(format!(
                                    "Deepgram WebSocket error: {e}"
                                ));
                                error!("{}", stt_error);
                                let _ = error_tx.try_send(stt_error);
                                break;
                            }
                            None => {
                                info!("Deepgram WebSocket stream ended");
                                break;
                            }
                        }
                    }

                    _ = &mut shutdown_rx => {
                        debug!("Closing Deepgram stream");
                        let close = Message::Text(ControlMessage::CloseStream.to_json().into());
                        if ws_sink.send(close).await.is_ok() {
                            // Drain results flushed by CloseStream until the server closes
                            let drain = async {
                                while let Some(Ok(msg)) = ws_stream.next().await {
                                    if !Self::handle_websocket_message(msg, &result_tx, &error_tx) {
                                        break;
                                    }
                                }
                            };
                            let _ = timeout(CLOSE_TIMEOUT, drain).await;
                        }
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            is_connected.store(false, Ordering::Release);
            info!("Deepgram STT WebSocket connection closed");
        });
        self.connection_handle = Some(connection_handle);

        let callback_ref = self.result_callback.clone();
        self.result_forward_handle = Some(tokio::spawn(async move {
            while let Some(result) = result_rx.recv().await {
                let callback = callback_ref.lock().await.clone();
                if let Some(callback) = callback {
                    callback(result).await;
                } else {
                    debug!(
                        "Deepgram STT result (no callback): {} (confidence: {:.2})",
                        result.transcript, result.confidence
                    );
                }
            }
        }));

        let error_callback_ref = self.error_callback.clone();
        self.error_forward_handle = Some(tokio::spawn(async move {
            while let Some(error) = error_rx.recv().await {
                let callback = error_callback_ref.lock().await.clone();
                if let Some(callback) = callback {
                    callback(error).await;
                } else {
                    error!("Deepgram STT error (no callback registered): {}", error);
                }
            }
        }));

        Ok(())
    }
}

impl Drop for DeepgramSTT {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

#[async_trait::async_trait]
impl BaseSTT for DeepgramSTT {
    fn new(config: STTConfig) -> Result<Self, STTError> {
        if config.api_key.is_empty() {
            return Err(STTError::AuthenticationFailed(
                "API key is required for Deepgram STT".to_string(),
            ));
        }

        Ok(Self {
            config: Some(DeepgramSTTConfig::from_base(config)),
            ws_sender: None,
            shutdown_tx: None,
            connection_handle: None,
            result_forward_handle: None,
            error_forward_handle: None,
            result_callback: Arc::new(Mutex::new(None)),
            error_callback: Arc::new(Mutex::new(None)),
            is_connected: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn connect(&mut self) -> Result<(), STTError> {
        let config = self.config.clone().ok_or_else(|| {
            STTError::ConfigurationError("No configuration available".to_string())
        })?;

        if self.is_ready() {
            return Ok(());
        }

        self.start_connection(config).await
    }

    async fn disconnect(&mut self) -> Result<(), STTError> {
        self.ws_sender = None;

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.connection_handle.take() {
            let _ = timeout(CLOSE_TIMEOUT + Duration::from_secs(1), handle).await;
        }

        // Forward tasks end once the connection task drops its senders
        for handle in [
            self.result_forward_handle.take(),
            self.error_forward_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            if timeout(Duration::from_secs(1), handle).await.is_err() {
                debug!("Deepgram forward task did not finish in time");
            }
        }

        *self.result_callback.lock().await = None;
        *self.error_callback.lock().await = None;
        self.is_connected.store(false, Ordering::Release);

        info!("Disconnected from Deepgram STT");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.is_connected.load(Ordering::Acquire) && self.ws_sender.is_some()
    }

    async fn send_audio(&mut self, audio_data: Bytes) -> Result<(), STTError> {
        if !self.is_ready() {
            return Err(STTError::ConnectionFailed(
                "Not connected to Deepgram STT".to_string(),
            ));
        }

        if audio_data.len() > MAX_AUDIO_CHUNK_SIZE {
            return Err(STTError::InvalidAudioFormat(format!(
                "Audio chunk size {} bytes exceeds maximum {} bytes",
                audio_data.len(),
                MAX_AUDIO_CHUNK_SIZE
            )));
        }

        if let Some(ws_sender) = &self.ws_sender {
            ws_sender
                .send(audio_data)
                .await
                .map_err(|e| STTError::NetworkError(format!("Failed to send audio data: {e}")))?;
        }

        Ok(())
    }

    async fn on_result(&mut self, callback: STTResultCallback) -> Result<(), STTError> {
        *self.result_callback.lock().await = Some(callback);
        Ok(())
    }

    async fn on_error(&mut self, callback: STTErrorCallback) -> Result<(), STTError> {
        *self.error_callback.lock().await = Some(callback);
        Ok(())
    }

    fn get_config(&self) -> Option<&STTConfig> {
        self.config.as_ref().map(|c| &c.base)
    }

    fn get_provider_info(&self) -> &'static str {
        "Deepgram Live Streaming STT"
    }
}

/// Opens one [`DeepgramSTT`] stream per call.
#[derive(Debug, Clone, Default)]
pub struct DeepgramConnector;

impl STTConnector for DeepgramConnector {
    fn create(&self, config: &STTConfig) -> Result<Box<dyn BaseSTT>, STTError> {
        Ok(Box::new(DeepgramSTT::new(config.clone())?))
    }
}
