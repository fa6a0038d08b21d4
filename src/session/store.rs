//! In-memory session store.
//!
//! Each session lives behind its own `Mutex`, so concurrent requests
//! against the same session id serialize while requests against different
//! sessions proceed independently. The outer map lock is held only long
//! enough to clone the entry's `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::StoreError;
use crate::session::model::SessionState;

/// Shared handle to one session's state.
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Thread-safe in-memory store keyed by session id.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session, returning its id.
    pub async fn create(&self, session: SessionState) -> Uuid {
        let id = session.session_id;
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, Arc::new(Mutex::new(session)));
        id
    }

    /// Fetch the handle for a session id.
    pub async fn get(&self, id: Uuid) -> Result<SessionHandle, StoreError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .cloned()
            .ok_or(StoreError::SessionNotFound(id))
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::SessionProfile;

    fn make_session() -> SessionState {
        SessionState::new("need help with work authorization".into(), SessionProfile::default())
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = SessionStore::new();
        let id = store.create(make_session()).await;
        let handle = store.get(id).await.unwrap();
        let session = handle.lock().await;
        assert_eq!(session.session_id, id);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = SessionStore::new();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn same_session_updates_serialize() {
        let store = Arc::new(SessionStore::new());
        let id = store.create(make_session()).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let handle = store.get(id).await.unwrap();
                let mut session = handle.lock().await;
                let n = session.fields.len();
                session.fields.insert(format!("field_{n}"), "x".into());
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let handle = store.get(id).await.unwrap();
        let session = handle.lock().await;
        // Every task saw a distinct map size under the lock.
        assert_eq!(session.fields.len(), 8);
    }

    #[tokio::test]
    async fn distinct_sessions_are_independent() {
        let store = SessionStore::new();
        let a = store.create(make_session()).await;
        let b = store.create(make_session()).await;
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);

        // Holding one session's lock must not block access to the other.
        let handle_a = store.get(a).await.unwrap();
        let _guard_a = handle_a.lock().await;
        let handle_b = store.get(b).await.unwrap();
        let guard_b = handle_b.try_lock();
        assert!(guard_b.is_ok());
    }
}
