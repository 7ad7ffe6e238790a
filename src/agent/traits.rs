//! Agent interface consumed by the chat relay.

use crate::memory::Turn;
use anyhow::Result;
use async_trait::async_trait;

/// Produces a reply to a user message given the prior conversation.
#[async_trait]
pub trait Agent: Send + Sync {
    /// `history` holds the turns recorded before `input`, oldest first.
    async fn respond(&self, input: &str, history: &[Turn]) -> Result<String>;

    fn name(&self) -> &str;
}
