pub mod schema;

#[allow(unused_imports)]
pub use schema::{
    AgentConfig, ChainConfig, Config, ForumConfig, GatewayConfig, IndexToolConfig, MemoryConfig,
    ProviderConfig, SessionConfig, ToolsConfig, DEFAULT_CHALLENGE, DEFAULT_CONTRACT_ADDRESS,
};
