//! Route handlers: login page, access gate, chat page, chat relay.

use super::AppState;
use crate::auth::{AuthOutcome, DENIAL_MESSAGE};
use crate::error::GateError;
use crate::memory::{MemoryScope, Speaker};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, Html, IntoResponse, Json, Redirect, Response},
};
use serde::Deserialize;

/// Name of the session cookie set by `/auth`.
pub const SESSION_COOKIE: &str = "authToken";

// ── Cookies ─────────────────────────────────────────────────────

/// Extract the session cookie value, if present and non-empty.
pub(crate) fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

fn issue_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; Secure; SameSite=Strict; Path=/")
}

fn clear_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; Secure; SameSite=Strict; Path=/; Max-Age=0")
}

// ── Request types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    pub signature: Option<String>,
}

/// Pull the `user_input` string out of a raw `/api` body.
fn parse_user_input(body: &[u8]) -> Result<String, GateError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| GateError::invalid_input(format!("request body is not valid JSON: {e}")))?;
    match value.get("user_input") {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(GateError::invalid_input("'user_input' must be a string")),
        None => Err(GateError::invalid_input("missing 'user_input' field")),
    }
}

// ── Handlers ────────────────────────────────────────────────────

/// GET / - login page
pub async fn handle_index(State(state): State<AppState>) -> impl IntoResponse {
    Html(state.login_page.to_string())
}

/// GET /auth?signature=... - verify ownership and issue a session cookie
pub async fn handle_auth(
    State(state): State<AppState>,
    Query(query): Query<AuthQuery>,
) -> Response {
    let outcome = match state.gate.authenticate(query.signature.as_deref()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::debug!(kind = e.kind().as_str(), "Auth rejected: {e}");
            return e.into_text_response();
        }
    };

    match outcome {
        AuthOutcome::Granted { token, address } => {
            if let Err(e) = state.sessions.issue(&token, &address.to_checksum()).await {
                tracing::warn!(%address, "Failed to record session: {e:#}");
                return GateError::upstream(&e).into_text_response();
            }
            (
                AppendHeaders([(header::SET_COOKIE, issue_cookie(&token))]),
                Redirect::to("/gpt"),
            )
                .into_response()
        }
        AuthOutcome::Denied { .. } => (StatusCode::OK, DENIAL_MESSAGE).into_response(),
    }
}

/// GET /gpt - chat page for holders of a session cookie
pub async fn handle_chat_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.sessions.check(session_cookie(&headers)).await {
        Html(super::CHAT_PAGE).into_response()
    } else {
        Redirect::to("/").into_response()
    }
}

/// POST /api - relay one user message through the agent
pub async fn handle_relay(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = session_cookie(&headers);
    if state.sessions.validates_tokens() && !state.sessions.check(token).await {
        return GateError::Unauthorized("a valid session is required".into()).into_response();
    }

    tracing::debug!(body = %String::from_utf8_lossy(&body), "Relay request");

    let user_input = match parse_user_input(&body) {
        Ok(input) => input,
        Err(e) => {
            tracing::debug!("Relay rejected: {e}");
            return e.into_response();
        }
    };

    let bucket = state.memory.bucket_for(token);
    let history = state.memory.snapshot(&bucket);
    state.memory.append(&bucket, Speaker::User, &user_input);

    let reply = tokio::time::timeout(
        state.agent_timeout,
        state.agent.respond(&user_input, &history),
    )
    .await
    .unwrap_or_else(|_| {
        Err(anyhow::anyhow!(
            "agent did not answer within {}s",
            state.agent_timeout.as_secs()
        ))
    });

    match reply {
        Ok(output) => {
            state.memory.append(&bucket, Speaker::Agent, &output);
            Json(serde_json::json!({ "output": output })).into_response()
        }
        Err(e) => {
            tracing::warn!(agent = state.agent.name(), "Agent failed: {e:#}");
            GateError::upstream(&e).into_response()
        }
    }
}

/// POST /logout - drop the session and clear the cookie
pub async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_cookie(&headers) {
        if state.sessions.validates_tokens() {
            match state.sessions.revoke(token).await {
                Ok(true) => tracing::info!(token = %crate::security::redact(token), "Session revoked"),
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to revoke session: {e:#}"),
            }
        }
        if state.memory.scope() == MemoryScope::PerSession {
            state.memory.forget(&state.memory.bucket_for(Some(token)));
        }
    }

    (
        AppendHeaders([(header::SET_COOKIE, clear_cookie())]),
        Redirect::to("/"),
    )
        .into_response()
}

/// GET /health - liveness probe
pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
