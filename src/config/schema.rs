use crate::memory::MemoryScope;
use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Contract queried for `balanceOf` (ERC-721 on Polygon Mumbai).
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0xb022C9c672592c274397557556955eE968052969";
/// Text the wallet signs to prove ownership.
pub const DEFAULT_CHALLENGE: &str = "Access to chat bot";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level nftgate configuration, loaded from `config.toml`.
///
/// Resolution order: `--config-dir` / `NFTGATE_CONFIG_DIR` env → `~/.nftgate/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// LLM provider settings (`[provider]`).
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Agent loop settings (`[agent]`).
    #[serde(default)]
    pub agent: AgentConfig,

    /// Blockchain RPC and ownership contract (`[chain]`).
    #[serde(default)]
    pub chain: ChainConfig,

    /// HTTP server settings (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Session acceptance policy (`[session]`).
    #[serde(default)]
    pub session: SessionConfig,

    /// Conversation memory partitioning (`[memory]`).
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Agent tools: web search and document indexes (`[tools]`).
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Forum API credentials used by the document-index builders (`[forum]`).
    #[serde(default)]
    pub forum: ForumConfig,
}

// ── Provider ─────────────────────────────────────────────────────

/// LLM provider configuration (`[provider]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProviderConfig {
    /// Provider ID. Default: `"openai"`.
    #[serde(default = "default_provider_name")]
    pub name: String,
    /// API key. Overridden by `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Base URL override for OpenAI-compatible endpoints.
    pub api_url: Option<String>,
    /// Model name. Default: `"gpt-4o-mini"`.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature (0.0 to 2.0). Default: `0.5`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Request timeout in seconds. Default: `120`.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_temperature() -> f64 {
    0.5
}

fn default_provider_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_key: None,
            api_url: None,
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

/// Agent loop configuration (`[agent]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentConfig {
    /// Maximum model calls per user message. Default: `10`.
    /// Setting to `0` falls back to the safe default of `10`.
    #[serde(default = "default_agent_max_iterations")]
    pub max_iterations: usize,
    /// Extra instructions prepended to the agent's system prompt.
    #[serde(default)]
    pub instructions: Option<String>,
    /// Wall-clock limit for answering one message, in seconds. Must stay below
    /// `gateway.request_timeout_secs`. Default: `240`.
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_agent_max_iterations() -> usize {
    10
}

fn default_agent_timeout_secs() -> u64 {
    240
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_agent_max_iterations(),
            instructions: None,
            timeout_secs: default_agent_timeout_secs(),
        }
    }
}

// ── Chain ────────────────────────────────────────────────────────

/// Ownership registry configuration (`[chain]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChainConfig {
    /// Explicit JSON-RPC endpoint. Takes precedence over `alchemy_api_key`.
    pub rpc_url: Option<String>,
    /// Alchemy key used to build the RPC URL. Overridden by `ALCHEMY_API_KEY`.
    pub alchemy_api_key: Option<String>,
    /// Alchemy network slug. Default: `"polygon-mumbai"`.
    #[serde(default = "default_network")]
    pub network: String,
    /// ERC-721 contract whose `balanceOf` gates access.
    #[serde(default = "default_contract_address")]
    pub contract_address: String,
    /// Text the wallet must sign.
    #[serde(default = "default_challenge")]
    pub challenge: String,
    /// RPC request timeout in seconds. Default: `30`.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
}

fn default_network() -> String {
    "polygon-mumbai".into()
}

fn default_contract_address() -> String {
    DEFAULT_CONTRACT_ADDRESS.into()
}

fn default_challenge() -> String {
    DEFAULT_CHALLENGE.into()
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            alchemy_api_key: None,
            network: default_network(),
            contract_address: default_contract_address(),
            challenge: default_challenge(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
        }
    }
}

impl ChainConfig {
    /// Effective JSON-RPC endpoint, if one can be derived.
    pub fn resolved_rpc_url(&self) -> Option<String> {
        if let Some(url) = self.rpc_url.as_deref().map(str::trim) {
            if !url.is_empty() {
                return Some(url.to_string());
            }
        }
        self.alchemy_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| format!("https://{}.g.alchemy.com/v2/{key}", self.network))
    }
}

// ── Gateway ──────────────────────────────────────────────────────

/// Gateway server configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GatewayConfig {
    /// Gateway port (default: 8000)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Maximum accepted request body in bytes (default: 64 KiB).
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
    /// Whole-request timeout in seconds, covering the agent call (default: 300).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_gateway_port() -> u16 {
    8000
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_body_limit_bytes() -> usize {
    64 * 1024
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            body_limit_bytes: default_body_limit_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Session policy configuration (`[session]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionConfig {
    /// Look tokens up in the server-side store instead of trusting any
    /// non-empty cookie (default: false).
    #[serde(default)]
    pub validate_tokens: bool,
    /// Idle lifetime of a validated session in seconds (default: 86400).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Interval between idle-session sweeps in seconds (default: 300).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    86_400
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            validate_tokens: false,
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Conversation memory configuration (`[memory]` section).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MemoryConfig {
    /// `"shared"` (one log for all callers) or `"per_session"`.
    #[serde(default)]
    pub scope: MemoryScope,
}

// ── Tools ────────────────────────────────────────────────────────

/// Agent tool configuration (`[tools]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolsConfig {
    /// SerpAPI key; enables the web search tool. Overridden by `SERPAPI_API_KEY`.
    pub serpapi_api_key: Option<String>,
    /// Remote document indexes exposed as tools (`[[tools.indexes]]`).
    #[serde(default = "default_indexes")]
    pub indexes: Vec<IndexToolConfig>,
    /// Tool request timeout in seconds. Default: `60`.
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

/// A remote document index queried with `POST {url}` `{"query": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct IndexToolConfig {
    pub name: String,
    pub description: String,
    /// Query endpoint. Entries without a URL are skipped.
    pub url: Option<String>,
}

fn default_indexes() -> Vec<IndexToolConfig> {
    vec![
        IndexToolConfig {
            name: "Reddit".into(),
            description: "Posts from the product subreddit where users discuss products and \
                          get support for technical issues. Useful to gauge user sentiment \
                          about a feature or find answers to very niche technical issues."
                .into(),
            url: None,
        },
        IndexToolConfig {
            name: "Help Center".into(),
            description: "The official help center. Use this tool to find the solution to most \
                          technical and shipping issues. If you find a helpful article, include \
                          its URL in your response."
                .into(),
            url: None,
        },
    ]
}

fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            serpapi_api_key: None,
            indexes: default_indexes(),
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Forum API credentials (`[forum]` section), each overridable by `REDDIT_*` env vars.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ForumConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ForumConfig {
    /// Names of credentials that are still unset.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("user_agent", &self.user_agent),
            ("username", &self.username),
            ("password", &self.password),
        ];
        fields
            .iter()
            .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect()
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());

        Self {
            config_path: home.join(".nftgate").join("config.toml"),
            provider: ProviderConfig::default(),
            agent: AgentConfig::default(),
            chain: ChainConfig::default(),
            gateway: GatewayConfig::default(),
            session: SessionConfig::default(),
            memory: MemoryConfig::default(),
            tools: ToolsConfig::default(),
            forum: ForumConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".nftgate"))
}

fn resolve_config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("NFTGATE_CONFIG_DIR") {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(trimmed).into_owned()));
        }
    }
    default_config_dir()
}

/// Read `var`, treating unset and blank values alike.
fn env_nonempty(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = resolve_config_dir()?;
        Self::load_or_init_in(&config_dir).await
    }

    pub async fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.toml");

        fs::create_dir_all(config_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;
            config
        } else {
            // Warn if config file is world-readable (may contain API keys)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = fs::metadata(&config_path).await {
                    if meta.permissions().mode() & 0o004 != 0 {
                        tracing::warn!(
                            "Config file {:?} is world-readable (mode {:o}). \
                             Consider restricting with: chmod 600 {:?}",
                            config_path,
                            meta.permissions().mode() & 0o777,
                            config_path,
                        );
                    }
                }
            }

            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            anyhow::bail!(
                "provider.temperature must be between 0.0 and 2.0, got {}",
                self.provider.temperature
            );
        }
        if self.provider.model.trim().is_empty() {
            anyhow::bail!("provider.model must not be empty");
        }
        self.chain
            .contract_address
            .parse::<crate::auth::WalletAddress>()
            .with_context(|| {
                format!(
                    "chain.contract_address is not a valid address: {}",
                    self.chain.contract_address
                )
            })?;
        if self.chain.challenge.is_empty() {
            anyhow::bail!("chain.challenge must not be empty");
        }
        if self.agent.timeout_secs == 0
            || self.agent.timeout_secs >= self.gateway.request_timeout_secs
        {
            anyhow::bail!(
                "agent.timeout_secs must be between 1 and gateway.request_timeout_secs ({}), got {}",
                self.gateway.request_timeout_secs,
                self.agent.timeout_secs
            );
        }
        if self.memory.scope == MemoryScope::PerSession && !self.session.validate_tokens {
            anyhow::bail!(
                "memory.scope = \"per_session\" requires session.validate_tokens = true"
            );
        }
        if self.session.validate_tokens && self.session.idle_timeout_secs == 0 {
            anyhow::bail!("session.idle_timeout_secs must be greater than 0 when validate_tokens is on");
        }
        for (i, index) in self.tools.indexes.iter().enumerate() {
            if index.name.trim().is_empty() {
                anyhow::bail!("tools.indexes[{i}].name must not be empty");
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = env_nonempty("OPENAI_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(key) = env_nonempty("SERPAPI_API_KEY") {
            self.tools.serpapi_api_key = Some(key);
        }
        if let Some(key) = env_nonempty("ALCHEMY_API_KEY") {
            self.chain.alchemy_api_key = Some(key);
        }
        if let Some(url) = env_nonempty("NFTGATE_RPC_URL") {
            self.chain.rpc_url = Some(url);
        }

        let forum = [
            ("REDDIT_CLIENT_ID", &mut self.forum.client_id),
            ("REDDIT_CLIENT_SECRET", &mut self.forum.client_secret),
            ("REDDIT_USER_AGENT", &mut self.forum.user_agent),
            ("REDDIT_USERNAME", &mut self.forum.username),
            ("REDDIT_PASSWORD", &mut self.forum.password),
        ];
        for (var, slot) in forum {
            if let Some(value) = env_nonempty(var) {
                *slot = Some(value);
            }
        }

        if let Some(model) = env_nonempty("NFTGATE_MODEL") {
            self.provider.model = model;
        }

        if let Some(temp_str) = env_nonempty("NFTGATE_TEMPERATURE") {
            match temp_str.parse::<f64>() {
                Ok(temp) if (0.0..=2.0).contains(&temp) => self.provider.temperature = temp,
                _ => tracing::warn!(value = %temp_str, "Ignoring invalid NFTGATE_TEMPERATURE"),
            }
        }

        // Gateway port: NFTGATE_GATEWAY_PORT or PORT
        if let Some(port_str) = env_nonempty("NFTGATE_GATEWAY_PORT").or_else(|| env_nonempty("PORT"))
        {
            if let Ok(port) = port_str.parse::<u16>() {
                self.gateway.port = port;
            }
        }

        // Gateway host: NFTGATE_GATEWAY_HOST or HOST
        if let Some(host) = env_nonempty("NFTGATE_GATEWAY_HOST").or_else(|| env_nonempty("HOST")) {
            self.gateway.host = host;
        }

        if let Ok(flag) = std::env::var("NFTGATE_VALIDATE_SESSIONS") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.session.validate_tokens = true,
                "0" | "false" | "no" | "off" => self.session.validate_tokens = false,
                _ => {}
            }
        }
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("config.toml");
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        // Restrict permissions before the file becomes visible (may contain API keys)
        #[cfg(unix)]
        {
            use std::{fs::Permissions, os::unix::fs::PermissionsExt};
            let _ = fs::set_permissions(&temp_path, Permissions::from_mode(0o600)).await;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await?;
        Ok(())
    }
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}
