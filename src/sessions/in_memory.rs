//! In-memory session store implementation.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::traits::{Session, SessionStore};

/// An in-memory session store backed by a mutex-protected hash map.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, token: &str, wallet_address: &str) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            token: token.to_string(),
            wallet_address: wallet_address.to_string(),
            created_at: now,
            last_activity: now,
        };

        let mut sessions = self.sessions.lock();
        sessions.insert(token.to_string(), session.clone());
        Ok(session)
    }

    async fn get(&self, token: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.lock();
        Ok(sessions.get(token).cloned())
    }

    async fn touch(&self, token: &str) -> Result<()> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(token) {
            Some(session) => {
                session.last_activity = Utc::now();
                Ok(())
            }
            None => bail!("session not found: {}", crate::security::redact(token)),
        }
    }

    async fn delete(&self, token: &str) -> Result<bool> {
        let mut sessions = self.sessions.lock();
        Ok(sessions.remove(token).is_some())
    }

    async fn evict_idle(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let mut sessions = self.sessions.lock();
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.last_activity < cutoff)
            .map(|s| s.token.clone())
            .collect();
        for token in &expired {
            sessions.remove(token);
        }
        Ok(expired)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.sessions.lock().len())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
