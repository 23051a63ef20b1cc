//! In-memory session registry.
//!
//! The registry is the single synchronization point for "is this client
//! relayed": insert-if-absent and remove-if-present happen under one lock,
//! and callers never hold a lock of their own around it.

mod session;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::RelayError;

pub use session::{RelaySession, SessionInput};

/// Thread-safe map from client session id to its relay session.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<RelaySession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `session` under `session_id` unless a live session already
    /// holds that id.
    pub async fn create(
        &self,
        session_id: &str,
        session: RelaySession,
    ) -> Result<Arc<RelaySession>, RelayError> {
        let mut sessions = self.sessions.write().await;
        match sessions.entry(session_id.to_string()) {
            Entry::Occupied(_) => Err(RelayError::SessionAlreadyExists {
                session_id: session_id.to_string(),
            }),
            Entry::Vacant(slot) => {
                let session = Arc::clone(slot.insert(Arc::new(session)));
                drop(sessions);
                info!(session_id, epoch = session.epoch(), "Relay session registered");
                Ok(session)
            }
        }
    }

    pub async fn lookup(&self, session_id: &str) -> Result<Arc<RelaySession>, RelayError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| RelayError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Remove the entry for `session_id`. Removing an absent id is a no-op.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<RelaySession>> {
        self.sessions.write().await.remove(session_id)
    }

    /// Close and remove the session for `session_id`.
    ///
    /// With `epoch` set, only that exact session instance is torn down, so a
    /// stale reader cannot remove a newer session reusing the id. The close
    /// signal fires before the entry disappears. Returns whether a session
    /// was torn down.
    pub async fn teardown(&self, session_id: &str, epoch: Option<u64>) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(session_id) {
                Some(session) if epoch.is_none_or(|e| session.epoch() == e) => {
                    session.close_signal().cancel();
                    sessions.remove(session_id)
                }
                _ => None,
            }
        };
        let Some(session) = removed else {
            debug!(session_id, ?epoch, "No matching relay session to tear down");
            return false;
        };

        session.close().await;
        info!(session_id, epoch = session.epoch(), "Relay session torn down");
        true
    }

    /// Close and remove every session.
    pub async fn teardown_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut sessions = self.sessions.write().await;
            for session in sessions.values() {
                session.close_signal().cancel();
            }
            sessions.drain().collect()
        };
        for (session_id, session) in &drained {
            session.close().await;
            debug!(session_id = %session_id, "Relay session closed on shutdown");
        }
        drained.len()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
