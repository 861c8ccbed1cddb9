//! Concurrent map of live call sessions.

use std::sync::Arc;

use dashmap::DashMap;

use super::session::{CallSession, SessionId};

/// The only structure shared between calls.
///
/// Lookups hand out `Arc` clones so no map guard outlives the call that
/// took it.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<CallSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<CallSession>) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn get(&self, id: &str) -> Option<Arc<CallSession>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Remove a session. Exactly one caller receives it.
    pub fn remove(&self, id: &str) -> Option<Arc<CallSession>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }
}
