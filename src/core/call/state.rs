//! Per-call conversation state.

use std::sync::Arc;

use parking_lot::RwLock;

use super::transport::CallMetadata;
use crate::core::llm::{ChatMessage, ChatRole};

#[derive(Debug, Default)]
struct ConversationState {
    /// Replayed verbatim to the model; only ever appended to
    history: Vec<ChatMessage>,
    is_generating: bool,
    call: Option<CallMetadata>,
    turns_completed: u32,
    turns_failed: u32,
}

/// Counters reported when a call ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversationStats {
    pub turns_completed: u32,
    pub turns_failed: u32,
    pub history_len: usize,
}

/// Shared handle to one call's conversation.
///
/// Only the session's turn worker writes through it. Readers get copies, so
/// no lock is ever held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct ConversationHandle {
    inner: Arc<RwLock<ConversationState>>,
}

impl ConversationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.inner.read().history.clone()
    }

    pub fn history_len(&self) -> usize {
        self.inner.read().history.len()
    }

    pub fn is_generating(&self) -> bool {
        self.inner.read().is_generating
    }

    pub fn call(&self) -> Option<CallMetadata> {
        self.inner.read().call.clone()
    }

    pub fn set_call(&self, call: CallMetadata) {
        self.inner.write().call = Some(call);
    }

    /// Everything the caller said, in order.
    pub fn user_utterances(&self) -> Vec<String> {
        self.inner
            .read()
            .history
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .map(|m| m.content.clone())
            .collect()
    }

    /// Mark a generation as in flight. Returns `None` if one already is.
    pub fn try_begin_generation(&self) -> Option<GenerationGuard> {
        let mut state = self.inner.write();
        if state.is_generating {
            return None;
        }
        state.is_generating = true;
        Some(GenerationGuard {
            inner: self.inner.clone(),
        })
    }

    /// Append one completed exchange as a (user, assistant) pair.
    pub fn append_exchange(&self, transcript: impl Into<String>, reply: impl Into<String>) {
        let mut state = self.inner.write();
        state.history.push(ChatMessage::user(transcript));
        state.history.push(ChatMessage::assistant(reply));
        state.turns_completed += 1;
    }

    pub fn record_failed_turn(&self) {
        self.inner.write().turns_failed += 1;
    }

    pub fn stats(&self) -> ConversationStats {
        let state = self.inner.read();
        ConversationStats {
            turns_completed: state.turns_completed,
            turns_failed: state.turns_failed,
            history_len: state.history.len(),
        }
    }
}

/// Clears `is_generating` when dropped, on every exit path of a turn.
#[derive(Debug)]
pub struct GenerationGuard {
    inner: Arc<RwLock<ConversationState>>,
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.inner.write().is_generating = false;
    }
}
