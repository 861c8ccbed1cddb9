use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::{Mutex, oneshot};

use super::state::ConversationHandle;
use super::transport::TransportSender;
use crate::core::stt::{BaseSTT, STTError};

pub type SessionId = String;

/// Events delivered to a session's turn worker, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    FinalTranscript(String),
    TranscriptionError(STTError),
}

/// One accepted transport connection and the resources it owns.
pub struct CallSession {
    pub id: SessionId,
    /// Outbound half of the transport connection
    pub transport: TransportSender,
    /// The session's only transcription stream
    pub stt: Mutex<Box<dyn BaseSTT>>,
    pub conversation: ConversationHandle,
    pub started_at: Instant,
    media_frames: AtomicU64,
    dropped_frames: AtomicU64,
    stt_send_failed: AtomicBool,
    worker_shutdown: parking_lot::Mutex<Option<oneshot::Sender<()>>>,
}

impl CallSession {
    pub fn new(
        id: SessionId,
        transport: TransportSender,
        stt: Box<dyn BaseSTT>,
        conversation: ConversationHandle,
    ) -> Self {
        Self {
            id,
            transport,
            stt: Mutex::new(stt),
            conversation,
            started_at: Instant::now(),
            media_frames: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            stt_send_failed: AtomicBool::new(false),
            worker_shutdown: parking_lot::Mutex::new(None),
        }
    }

    pub(crate) fn with_worker_shutdown(self, shutdown: oneshot::Sender<()>) -> Self {
        *self.worker_shutdown.lock() = Some(shutdown);
        self
    }

    /// Tell the turn worker to exit once its current turn finishes.
    pub(crate) fn stop_worker(&self) {
        if let Some(shutdown) = self.worker_shutdown.lock().take() {
            let _ = shutdown.send(());
        }
    }

    pub(crate) fn count_media_frame(&self) {
        self.media_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_dropped_frame(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns true only for the first failed audio send of the call.
    pub(crate) fn mark_stt_send_failed(&self) -> bool {
        !self.stt_send_failed.swap(true, Ordering::AcqRel)
    }

    pub fn media_frames(&self) -> u64 {
        self.media_frames.load(Ordering::Relaxed)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.id)
            .field("media_frames", &self.media_frames())
            .field("dropped_frames", &self.dropped_frames())
            .finish_non_exhaustive()
    }
}
