//! Explicit session plumbing.
//!
//! Grant and form state is reached only through a [`SessionHandle`]
//! capability passed into each operation — there is no ambient or
//! thread-local session. The handle's mutex is held for the duration of a
//! whole token operation, so a consume racing a keep-alive from a second
//! browser tab serializes and the single-use guarantee stays atomic.

use crate::csrf::store::TokenStore;
use crate::forms::registry::FormRegistry;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Session identifier errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The presented session id is not a valid UUID.
    #[error("invalid session id")]
    InvalidSessionId,
}

/// Unique session identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new session id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from a string, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidSessionId`] if the string is not a
    /// valid UUID.
    pub fn try_from_string(s: String) -> Result<Self, SessionError> {
        Uuid::parse_str(&s)
            .map(|_| Self(s))
            .map_err(|_| SessionError::InvalidSessionId)
    }

    /// Get the session id as a string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from_string(s.to_string())
    }
}

/// Mutable state belonging to one session, guarded by a single lock.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Live grants keyed by page name.
    pub grants: TokenStore,

    /// Registered form definitions, grouped by page name.
    pub forms: FormRegistry,
}

/// Cheap-to-clone capability handle to one session's state.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    state: Arc<Mutex<SessionState>>,
}

impl SessionHandle {
    /// Create a handle over fresh session state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the session state for the duration of one operation.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }
}

/// In-memory map of all live sessions.
///
/// Cloning shares the underlying map, so one store can back every request.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, SessionHandle>>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the handle for `id`, creating fresh state on first sight.
    #[must_use]
    pub fn handle(&self, id: &SessionId) -> SessionHandle {
        self.sessions
            .lock()
            .entry(id.clone())
            .or_default()
            .clone()
    }

    /// Drop a session and all of its state.
    pub fn remove(&self, id: &SessionId) {
        self.sessions.lock().remove(id);
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether the store holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_round_trips() {
        let id = SessionId::generate();
        let parsed = SessionId::try_from_string(id.as_str().to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn session_id_rejects_garbage() {
        assert_eq!(
            SessionId::try_from_string("not-a-uuid".to_string()),
            Err(SessionError::InvalidSessionId)
        );
    }

    #[test]
    fn store_returns_same_handle_for_same_id() {
        let store = SessionStore::new();
        let id = SessionId::generate();

        let first = store.handle(&id);
        first.lock().grants.put(
            "page",
            chrono::Utc::now(),
            chrono::Duration::seconds(60),
        );

        let second = store.handle(&id);
        assert!(second
            .lock()
            .grants
            .is_live("page", chrono::Utc::now()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_drops_state() {
        let store = SessionStore::new();
        let id = SessionId::generate();
        let _ = store.handle(&id);
        store.remove(&id);
        assert!(store.is_empty());
    }
}
