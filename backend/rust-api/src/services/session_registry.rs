use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

use super::quiz_session::QuizSession;
use crate::error::QuizError;

pub type SharedSession = Arc<AsyncMutex<QuizSession>>;

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, (String, SharedSession)>,
    active_by_user: HashMap<String, String>,
}

/// Live sessions by id. Each user has at most one; registering a new one
/// replaces the previous session.
///
/// Every session sits behind its own async mutex, so two requests for the
/// same session run one after the other.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn insert(&self, session: QuizSession) -> Result<SharedSession, QuizError> {
        let session_id = session.id().to_string();
        let user_id = session.user_id().to_string();
        let shared = Arc::new(AsyncMutex::new(session));

        let mut inner = self.lock()?;
        if let Some(previous) = inner.active_by_user.insert(user_id.clone(), session_id.clone()) {
            inner.sessions.remove(&previous);
            tracing::info!(
                "Replaced session {} with {} for user {}",
                previous,
                session_id,
                user_id
            );
        }
        inner.sessions.insert(session_id, (user_id, shared.clone()));
        Ok(shared)
    }

    /// Looks up a session owned by `user_id`.
    pub fn get(&self, session_id: &str, user_id: &str) -> Result<SharedSession, QuizError> {
        let inner = self.lock()?;
        match inner.sessions.get(session_id) {
            Some((owner, session)) if owner == user_id => Ok(session.clone()),
            Some(_) => Err(QuizError::Forbidden),
            None => Err(QuizError::SessionNotFound(session_id.to_string())),
        }
    }

    pub fn remove(&self, session_id: &str) -> Result<(), QuizError> {
        let mut inner = self.lock()?;
        if let Some((user_id, _)) = inner.sessions.remove(session_id) {
            if inner.active_by_user.get(&user_id).map(String::as_str) == Some(session_id) {
                inner.active_by_user.remove(&user_id);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.sessions.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, QuizError> {
        self.inner
            .lock()
            .map_err(|_| QuizError::Persistence("session registry lock poisoned".to_string()))
    }
}
