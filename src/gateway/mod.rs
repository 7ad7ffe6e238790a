//! HTTP gateway: wires the access gate, session guard, conversation memory and
//! agent into an axum router and serves it.

pub mod api;

use crate::agent::Agent;
use crate::auth::{AccessGate, JsonRpcRegistry, OwnershipRegistry, WalletAddress};
use crate::config::Config;
use crate::memory::{Bucket, ConversationMemory, MemoryScope};
use crate::sessions::{create_session_store, SessionGuard};
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

const LOGIN_PAGE_TEMPLATE: &str = include_str!("../../web/auth.html");
pub(crate) const CHAT_PAGE: &str = include_str!("../../web/index.html");

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AccessGate>,
    pub sessions: Arc<SessionGuard>,
    pub memory: Arc<ConversationMemory>,
    pub agent: Arc<dyn Agent>,
    /// Limit on one `Agent::respond` call; kept below the router timeout.
    pub agent_timeout: Duration,
    pub(crate) login_page: Arc<str>,
}

const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(240);

/// Render the login page with the challenge text embedded as a JS string.
fn render_login_page(challenge: &str) -> String {
    let literal = serde_json::to_string(challenge)
        .unwrap_or_else(|_| "\"\"".into())
        .replace("</", "<\\/");
    LOGIN_PAGE_TEMPLATE.replace("{{CHALLENGE}}", &literal)
}

impl AppState {
    pub fn new(
        gate: AccessGate,
        sessions: SessionGuard,
        memory: ConversationMemory,
        agent: Arc<dyn Agent>,
    ) -> Self {
        let login_page = render_login_page(gate.challenge());
        Self {
            gate: Arc::new(gate),
            sessions: Arc::new(sessions),
            memory: Arc::new(memory),
            agent,
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
            login_page: Arc::from(login_page),
        }
    }

    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    /// Build every collaborator from config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let rpc_url = config.chain.resolved_rpc_url().context(
            "No blockchain RPC endpoint configured. Set ALCHEMY_API_KEY or chain.rpc_url in config.toml.",
        )?;
        let contract: WalletAddress = config
            .chain
            .contract_address
            .parse()
            .context("chain.contract_address is invalid")?;
        let registry: Arc<dyn OwnershipRegistry> = Arc::new(JsonRpcRegistry::new(
            &rpc_url,
            contract,
            Duration::from_secs(config.chain.rpc_timeout_secs.max(1)),
        ));

        let gate = AccessGate::new(config.chain.challenge.clone(), registry);
        let sessions = SessionGuard::new(create_session_store(), &config.session);
        let memory = ConversationMemory::new(config.memory.scope);
        let agent = crate::agent::build_agent(config)?;

        Ok(Self::new(gate, sessions, memory, agent)
            .with_agent_timeout(Duration::from_secs(config.agent.timeout_secs.max(1))))
    }
}

/// Build the router with all routes and request limits.
pub fn build_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/", get(api::handle_index))
        .route("/auth", get(api::handle_auth))
        .route("/gpt", get(api::handle_chat_page))
        .route("/api", post(api::handle_relay))
        .route("/logout", post(api::handle_logout))
        .route("/health", get(api::handle_health))
        .layer(RequestBodyLimitLayer::new(config.gateway.body_limit_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.gateway.request_timeout_secs.max(1),
        )))
        .with_state(state)
}

/// Periodically evict idle sessions and, in per-session scope, their logs.
fn spawn_session_sweeper(state: &AppState, interval_secs: u64) {
    if !state.sessions.validates_tokens() {
        return;
    }
    let sessions = state.sessions.clone();
    let memory = state.memory.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sessions.sweep().await {
                Ok(evicted) if !evicted.is_empty() => {
                    if memory.scope() == MemoryScope::PerSession {
                        for token in &evicted {
                            memory.forget(&Bucket::Session(token.clone()));
                        }
                    }
                    tracing::info!(count = evicted.len(), "Evicted idle sessions");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Session sweep failed: {e:#}"),
            }
        }
    });
}

/// Run the gateway until Ctrl-C.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;
    spawn_session_sweeper(&state, config.session.sweep_interval_secs);

    let app = build_router(state, &config);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(
        %addr,
        validate_tokens = config.session.validate_tokens,
        memory_scope = %config.memory.scope,
        "Gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Gateway shutting down");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::signature::test_support::{dev_signing_key, sign_personal};
    use crate::auth::test_support::FixedRegistry;
    use crate::config::SessionConfig;
    use crate::memory::{Speaker, Turn};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use parking_lot::Mutex;
    use tower::ServiceExt;

    const CHALLENGE: &str = "Access to chat bot";

    /// Agent that echoes the input and records the history it was given.
    #[derive(Default)]
    struct EchoAgent {
        fail: bool,
        delay: Option<Duration>,
        seen_history: Mutex<Vec<Vec<Turn>>>,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        async fn respond(&self, input: &str, history: &[Turn]) -> Result<String> {
            self.seen_history.lock().push(history.to_vec());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                anyhow::bail!("provider returned 503");
            }
            Ok(format!("echo: {input}"))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct Harness {
        app: Router,
        state: AppState,
        agent: Arc<EchoAgent>,
        registry: Arc<FixedRegistry>,
    }

    fn dev_address() -> WalletAddress {
        WalletAddress::from_verifying_key(dev_signing_key().verifying_key())
    }

    fn harness_with(
        balance: u64,
        session: SessionConfig,
        scope: MemoryScope,
        agent: EchoAgent,
    ) -> Harness {
        let registry = Arc::new(FixedRegistry::holding(dev_address(), balance));
        let agent = Arc::new(agent);
        let state = AppState::new(
            AccessGate::new(CHALLENGE, registry.clone()),
            SessionGuard::new(create_session_store(), &session),
            ConversationMemory::new(scope),
            agent.clone(),
        );
        let app = build_router(state.clone(), &Config::default());
        Harness {
            app,
            state,
            agent,
            registry,
        }
    }

    fn harness(balance: u64) -> Harness {
        harness_with(
            balance,
            SessionConfig::default(),
            MemoryScope::Shared,
            EchoAgent::default(),
        )
    }

    fn validated() -> SessionConfig {
        SessionConfig {
            validate_tokens: true,
            ..SessionConfig::default()
        }
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_api(body: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn auth_uri() -> String {
        format!(
            "/auth?signature={}",
            sign_personal(&dev_signing_key(), CHALLENGE)
        )
    }

    /// `authToken=<value>` pair from a Set-Cookie header.
    fn cookie_pair(response: &axum::response::Response) -> String {
        response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .unwrap()
            .to_string()
    }

    // ── Pages ────────────────────────────────────────────────

    #[tokio::test]
    async fn index_serves_login_page_with_challenge() {
        let h = harness(1);
        let response = h.app.oneshot(get("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("\"Access to chat bot\""));
        assert!(!html.contains("{{CHALLENGE}}"));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let h = harness(1);
        let response = h.app.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, r#"{"status":"ok"}"#);
    }

    // ── Access gate ──────────────────────────────────────────

    #[tokio::test]
    async fn holder_gets_cookie_and_redirect() {
        let h = harness(3);
        let response = h.app.oneshot(get(&auth_uri(), None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/gpt");
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(set_cookie.starts_with("authToken="));
        assert!(set_cookie.contains("HttpOnly"));
        assert_eq!(cookie_pair(&response).len(), "authToken=".len() + 32);
        assert_eq!(*h.registry.calls.lock(), 1);
    }

    #[tokio::test]
    async fn non_holder_gets_denial_text_and_no_cookie() {
        let h = harness(0);
        let response = h.app.oneshot(get(&auth_uri(), None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(body_string(response).await, "You don't have the required NFT!");
    }

    #[tokio::test]
    async fn malformed_signature_is_invalid_input() {
        let h = harness(1);
        let response = h
            .app
            .oneshot(get("/auth?signature=0xdeadbeef", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(*h.registry.calls.lock(), 0);

        let h = harness(1);
        let response = h.app.oneshot(get("/auth", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn registry_failure_is_upstream_unavailable() {
        let registry = Arc::new(FixedRegistry::failing());
        let state = AppState::new(
            AccessGate::new(CHALLENGE, registry),
            SessionGuard::new(create_session_store(), &SessionConfig::default()),
            ConversationMemory::new(MemoryScope::Shared),
            Arc::new(EchoAgent::default()),
        );
        let app = build_router(state, &Config::default());

        let response = app.oneshot(get(&auth_uri(), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    // ── Chat page ────────────────────────────────────────────

    #[tokio::test]
    async fn chat_page_without_cookie_redirects_home() {
        let h = harness(1);
        let response = h.app.oneshot(get("/gpt", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");

        let h = harness(1);
        let response = h.app.oneshot(get("/gpt", Some("authToken="))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn chat_page_accepts_any_non_empty_cookie_by_default() {
        for value in ["forged", "x", "00000000000000000000000000000000"] {
            let h = harness(1);
            let response = h
                .app
                .oneshot(get("/gpt", Some(format!("authToken={value}").as_str())))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "cookie value {value}");
            assert!(body_string(response).await.contains("/api"));
        }
    }

    #[tokio::test]
    async fn validated_mode_rejects_forged_cookie_and_accepts_issued_one() {
        let h = harness_with(1, validated(), MemoryScope::Shared, EchoAgent::default());

        let forged = h
            .app
            .clone()
            .oneshot(get("/gpt", Some("authToken=forged")))
            .await
            .unwrap();
        assert_eq!(forged.status(), StatusCode::SEE_OTHER);

        let login = h.app.clone().oneshot(get(&auth_uri(), None)).await.unwrap();
        let cookie = cookie_pair(&login);

        let page = h.app.clone().oneshot(get("/gpt", Some(cookie.as_str()))).await.unwrap();
        assert_eq!(page.status(), StatusCode::OK);

        let relay = h
            .app
            .clone()
            .oneshot(post_api(r#"{"user_input":"hi"}"#, Some("authToken=forged")))
            .await
            .unwrap();
        assert_eq!(relay.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(h.state.memory.len(&Bucket::Shared), 0);

        let logout = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/logout")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(logout.status(), StatusCode::SEE_OTHER);
        assert!(cookie_pair(&logout).ends_with('='));

        let after = h.app.oneshot(get("/gpt", Some(cookie.as_str()))).await.unwrap();
        assert_eq!(after.status(), StatusCode::SEE_OTHER);
    }

    // ── Chat relay ───────────────────────────────────────────

    #[tokio::test]
    async fn relay_appends_user_then_agent_turn() {
        let h = harness(1);
        let response = h
            .app
            .oneshot(post_api(r#"{"user_input":"hello"}"#, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, r#"{"output":"echo: hello"}"#);

        let log = h.state.memory.snapshot(&Bucket::Shared);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].speaker, Speaker::User);
        assert_eq!(log[0].content, "hello");
        assert_eq!(log[1].speaker, Speaker::Agent);
        assert_eq!(log[1].content, "echo: hello");
    }

    #[tokio::test]
    async fn relay_missing_field_is_invalid_input_without_mutation() {
        let h = harness(1);
        for body in [r#"{"message":"hello"}"#, r#"{"user_input":7}"#, "{not json"] {
            let response = h.app.clone().oneshot(post_api(body, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
            let json: serde_json::Value =
                serde_json::from_str(&body_string(response).await).unwrap();
            assert_eq!(json["kind"], "invalid_input");
        }
        assert!(h.state.memory.is_empty(&Bucket::Shared));
        assert!(h.agent.seen_history.lock().is_empty());
    }

    #[tokio::test]
    async fn sequential_calls_share_memory() {
        let h = harness(1);
        h.app
            .clone()
            .oneshot(post_api(r#"{"user_input":"first"}"#, Some("authToken=a")))
            .await
            .unwrap();
        h.app
            .clone()
            .oneshot(post_api(r#"{"user_input":"second"}"#, Some("authToken=b")))
            .await
            .unwrap();

        let seen = h.agent.seen_history.lock();
        assert!(seen[0].is_empty());
        let contents: Vec<&str> = seen[1].iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "echo: first"]);
        assert_eq!(h.state.memory.len(&Bucket::Shared), 4);
    }

    #[tokio::test]
    async fn per_session_scope_isolates_logs() {
        let h = harness_with(1, validated(), MemoryScope::PerSession, EchoAgent::default());
        let owner = dev_address().to_checksum();
        h.state.sessions.issue("a", &owner).await.unwrap();
        h.state.sessions.issue("b", &owner).await.unwrap();
        h.app
            .clone()
            .oneshot(post_api(r#"{"user_input":"from a"}"#, Some("authToken=a")))
            .await
            .unwrap();
        h.app
            .clone()
            .oneshot(post_api(r#"{"user_input":"from b"}"#, Some("authToken=b")))
            .await
            .unwrap();

        assert!(h.agent.seen_history.lock()[1].is_empty());
        assert_eq!(h.state.memory.snapshot(&Bucket::Session("a".into()))[0].content, "from a");
        assert_eq!(h.state.memory.snapshot(&Bucket::Session("b".into()))[0].content, "from b");
    }

    #[tokio::test]
    async fn agent_failure_is_upstream_and_keeps_user_turn() {
        let h = harness_with(
            1,
            SessionConfig::default(),
            MemoryScope::Shared,
            EchoAgent {
                fail: true,
                ..EchoAgent::default()
            },
        );
        let response = h
            .app
            .oneshot(post_api(r#"{"user_input":"hello"}"#, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let log = h.state.memory.snapshot(&Bucket::Shared);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].speaker, Speaker::User);
    }

    #[tokio::test]
    async fn slow_agent_is_upstream_unavailable() {
        let registry = Arc::new(FixedRegistry::holding(dev_address(), 1));
        let agent = Arc::new(EchoAgent {
            delay: Some(Duration::from_secs(5)),
            ..EchoAgent::default()
        });
        let state = AppState::new(
            AccessGate::new(CHALLENGE, registry),
            SessionGuard::new(create_session_store(), &SessionConfig::default()),
            ConversationMemory::new(MemoryScope::Shared),
            agent,
        )
        .with_agent_timeout(Duration::from_millis(50));
        let app = build_router(state.clone(), &Config::default());

        let response = app
            .oneshot(post_api(r#"{"user_input":"hello"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let value: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(value["kind"], "upstream_unavailable");
        assert!(value["error"].as_str().unwrap().contains("did not answer"));
        assert_eq!(state.memory.len(&Bucket::Shared), 1);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let h = harness(1);
        let big = format!(r#"{{"user_input":"{}"}}"#, "a".repeat(128 * 1024));
        let response = h.app.oneshot(post_api(&big, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(h.state.memory.is_empty(&Bucket::Shared));
    }

    #[test]
    fn from_config_requires_rpc_endpoint() {
        let err = AppState::from_config(&Config::default()).err().unwrap();
        assert!(err.to_string().contains("RPC endpoint"));
    }

    #[test]
    fn from_config_builds_with_alchemy_key() {
        let mut config = Config::default();
        config.chain.alchemy_api_key = Some("test-key".into());
        let state = AppState::from_config(&config).unwrap();
        assert_eq!(state.gate.challenge(), CHALLENGE);
        assert!(!state.sessions.validates_tokens());
        assert_eq!(state.agent_timeout, Duration::from_secs(240));
    }
}
