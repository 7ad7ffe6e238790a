//! Conversation memory: append-only logs of user/agent turns.
//!
//! In the `shared` scope every caller reads and writes one process-wide log.
//! In the `per_session` scope each session token owns its own log. Logs are
//! never truncated or persisted; a restart discards them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Agent => f.write_str("agent"),
        }
    }
}

/// A single recorded message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// How conversation logs are partitioned across callers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    /// One log for the whole process.
    #[default]
    Shared,
    /// One log per session token.
    PerSession,
}

impl fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("shared"),
            Self::PerSession => f.write_str("per_session"),
        }
    }
}

/// Key of one conversation log. Session keys live in their own variant, so a
/// cookie value can never name the shared or anonymous log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bucket {
    Shared,
    Anonymous,
    Session(String),
}

pub struct ConversationMemory {
    scope: MemoryScope,
    logs: Mutex<HashMap<Bucket, Vec<Turn>>>,
}

impl ConversationMemory {
    pub fn new(scope: MemoryScope) -> Self {
        Self {
            scope,
            logs: Mutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> MemoryScope {
        self.scope
    }

    /// Resolve which log a request writes to.
    pub fn bucket_for(&self, session_token: Option<&str>) -> Bucket {
        match self.scope {
            MemoryScope::Shared => Bucket::Shared,
            MemoryScope::PerSession => match session_token.filter(|t| !t.is_empty()) {
                Some(token) => Bucket::Session(token.to_string()),
                None => Bucket::Anonymous,
            },
        }
    }

    pub fn append(&self, bucket: &Bucket, speaker: Speaker, content: &str) {
        let turn = Turn {
            speaker,
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        self.logs
            .lock()
            .entry(bucket.clone())
            .or_default()
            .push(turn);
    }

    /// Copy of the log for `bucket`, oldest first.
    pub fn snapshot(&self, bucket: &Bucket) -> Vec<Turn> {
        self.logs.lock().get(bucket).cloned().unwrap_or_default()
    }

    pub fn len(&self, bucket: &Bucket) -> usize {
        self.logs.lock().get(bucket).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, bucket: &Bucket) -> bool {
        self.len(bucket) == 0
    }

    /// Discard a session's log. The shared log is never dropped.
    pub fn forget(&self, bucket: &Bucket) -> bool {
        if *bucket == Bucket::Shared {
            return false;
        }
        self.logs.lock().remove(bucket).is_some()
    }

    pub fn bucket_count(&self) -> usize {
        self.logs.lock().len()
    }
}
