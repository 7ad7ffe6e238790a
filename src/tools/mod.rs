//! Tool subsystem for agent-callable capabilities.
//!
//! Each tool implements the [`Tool`] trait defined in [`traits`]: a name, a
//! description the model reads, and an async `execute` taking free text.
//! [`build_tools`] assembles the registry from `[tools]` config. Tools whose
//! credentials or endpoints are missing are left out.

pub mod index_query;
pub mod traits;
pub mod web_search;

pub use index_query::IndexQueryTool;
#[allow(unused_imports)]
pub use traits::{Tool, ToolResult, ToolSpec};
pub use web_search::WebSearchTool;

use crate::config::ToolsConfig;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Create the tool registry from config.
pub fn build_tools(config: &ToolsConfig) -> Vec<Arc<dyn Tool>> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
    let mut seen = HashSet::new();

    if let Some(key) = config
        .serpapi_api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
    {
        let tool = WebSearchTool::new(key, timeout);
        seen.insert(tool.name().to_ascii_lowercase());
        tools.push(Arc::new(tool));
    } else {
        tracing::info!("SERPAPI_API_KEY not set; web search tool disabled");
    }

    for index in &config.indexes {
        let Some(url) = index.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            tracing::info!(tool = %index.name, "Index has no url; tool disabled");
            continue;
        };
        if !seen.insert(index.name.trim().to_ascii_lowercase()) {
            tracing::warn!(tool = %index.name, "Duplicate tool name; skipping");
            continue;
        }
        tools.push(Arc::new(IndexQueryTool::new(
            &index.name,
            &index.description,
            url,
            timeout,
        )));
    }

    tools
}
