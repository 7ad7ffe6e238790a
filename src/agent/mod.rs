pub mod react;
pub mod traits;

pub use react::ReactAgent;
pub use traits::Agent;

use crate::config::Config;
use std::sync::Arc;

/// Build the chat agent from config: provider, tools, and loop limits.
pub fn build_agent(config: &Config) -> anyhow::Result<Arc<dyn Agent>> {
    let provider = crate::providers::create_provider(&config.provider)?;
    let tools = crate::tools::build_tools(&config.tools);
    tracing::info!(
        provider = provider.name(),
        model = %config.provider.model,
        tools = tools.len(),
        "Agent ready"
    );
    let agent = ReactAgent::new(
        Arc::from(provider),
        tools,
        config.provider.model.clone(),
        config.provider.temperature,
    )
    .with_max_iterations(config.agent.max_iterations)
    .with_instructions(config.agent.instructions.clone());
    Ok(Arc::new(agent))
}
