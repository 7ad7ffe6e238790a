//! Token generation and log redaction helpers.
//!
//! Session tokens are 128 random bits from the OS CSPRNG rendered as 32
//! lowercase hex characters, the same shape as a simple-format UUIDv4.

use rand::RngCore;

/// Length in characters of a rendered session token.
pub const SESSION_TOKEN_LEN: usize = 32;

/// Generate a fresh opaque session token.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_LEN / 2];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Redact sensitive values for safe logging. Shows first 4 chars + "***" suffix.
pub fn redact(value: &str) -> String {
    match value.char_indices().nth(4) {
        Some((idx, _)) => format!("{}***", &value[..idx]),
        None => "***".to_string(),
    }
}
