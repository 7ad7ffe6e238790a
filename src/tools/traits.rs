use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    /// Text handed back to the model as the observation for this call.
    pub fn as_observation(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("tool failed without detail")
            )
        }
    }
}

/// Description of a tool for the agent prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
}

/// Core tool trait: a named capability the agent can call with a free-text input.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as the model refers to it in `Action:` lines.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// Run the tool. Transport failures return `Err`; domain misses return a
    /// `ToolResult` with `success == false`.
    async fn execute(&self, input: &str) -> anyhow::Result<ToolResult>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }
}
