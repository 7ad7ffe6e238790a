//! Session storage traits and types for issued access tokens.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A server-side record of an issued session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    /// Checksummed address of the wallet that authenticated.
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Storage for issued session tokens.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record a freshly issued token.
    async fn create(&self, token: &str, wallet_address: &str) -> Result<Session>;

    /// Look up a token, if it exists.
    async fn get(&self, token: &str) -> Result<Option<Session>>;

    /// Update the last activity timestamp for a session.
    async fn touch(&self, token: &str) -> Result<()>;

    /// Delete a session. Returns whether it existed.
    async fn delete(&self, token: &str) -> Result<bool>;

    /// Remove sessions idle since before `cutoff`, returning their tokens.
    async fn evict_idle(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>>;

    /// Number of live sessions.
    async fn count(&self) -> Result<usize>;

    /// The name of this session store implementation.
    fn name(&self) -> &str;
}
