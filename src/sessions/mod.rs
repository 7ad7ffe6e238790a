//! Session management: decides whether a request carries an accepted session.
//!
//! Two policies exist. By default any non-empty `authToken` cookie is accepted
//! without lookup. With `session.validate_tokens` enabled, the token must be
//! present in the [`SessionStore`] and not idle past the configured timeout.

pub mod in_memory;
pub mod traits;

pub use in_memory::InMemorySessionStore;
pub use traits::{Session, SessionStore};

use crate::config::SessionConfig;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Create a default in-memory session store.
pub fn create_session_store() -> Arc<dyn SessionStore> {
    Arc::new(InMemorySessionStore::new())
}

pub struct SessionGuard {
    store: Arc<dyn SessionStore>,
    validate_tokens: bool,
    idle_timeout: Duration,
}

impl SessionGuard {
    pub fn new(store: Arc<dyn SessionStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            validate_tokens: config.validate_tokens,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }

    pub fn validates_tokens(&self) -> bool {
        self.validate_tokens
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Register a freshly issued token. A no-op unless tokens are validated.
    pub async fn issue(&self, token: &str, wallet_address: &str) -> anyhow::Result<()> {
        if self.validate_tokens {
            self.store.create(token, wallet_address).await?;
        }
        Ok(())
    }

    /// Whether `token` (the raw cookie value, if any) is accepted.
    pub async fn check(&self, token: Option<&str>) -> bool {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return false;
        };
        if !self.validate_tokens {
            return true;
        }

        let session = match self.store.get(token).await {
            Ok(Some(session)) => session,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(store = self.store.name(), "Session lookup failed: {e:#}");
                return false;
            }
        };

        if session.last_activity < self.idle_cutoff() {
            if let Err(e) = self.store.delete(token).await {
                tracing::warn!(store = self.store.name(), "Failed to drop expired session: {e:#}");
            }
            tracing::debug!(
                token = %crate::security::redact(token),
                "Session expired on lookup"
            );
            return false;
        }

        self.store.touch(token).await.is_ok()
    }

    /// Revoke a token. Returns whether a session was removed.
    pub async fn revoke(&self, token: &str) -> anyhow::Result<bool> {
        self.store.delete(token).await
    }

    /// Drop every idle session, returning the evicted tokens.
    pub async fn sweep(&self) -> anyhow::Result<Vec<String>> {
        if !self.validate_tokens {
            return Ok(Vec::new());
        }
        self.store.evict_idle(self.idle_cutoff()).await
    }

    fn idle_cutoff(&self) -> chrono::DateTime<Utc> {
        let idle = chrono::Duration::from_std(self.idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        Utc::now() - idle
    }
}
