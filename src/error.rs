//! HTTP-facing error taxonomy shared by the access gate and the chat relay.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Coarse failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    UpstreamUnavailable,
    Unauthorized,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Unauthorized => "unauthorized",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl GateError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Wrap an upstream failure, keeping the `anyhow` context chain with
    /// secret-like tokens (API keys in RPC URLs) scrubbed.
    pub fn upstream(err: &anyhow::Error) -> Self {
        Self::UpstreamUnavailable(crate::providers::sanitize_api_error(&format!("{err:#}")))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
        }
    }

    /// Plain-text rendering used by the page routes (`/auth`).
    pub fn into_text_response(self) -> Response {
        (self.kind().status(), self.to_string()).into_response()
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "kind": kind.as_str(),
        }));
        (kind.status(), body).into_response()
    }
}
