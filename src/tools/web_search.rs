use super::traits::{Tool, ToolResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";

const NO_RESULT: &str = "No good search result found";

/// Google search through SerpAPI.
pub struct WebSearchTool {
    api_key: String,
    endpoint: String,
    client: Client,
}

impl WebSearchTool {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        Self::with_endpoint(api_key, SERPAPI_ENDPOINT, timeout)
    }

    pub fn with_endpoint(api_key: &str, endpoint: &str, timeout: Duration) -> Self {
        Self {
            api_key: api_key.trim().to_string(),
            endpoint: endpoint.to_string(),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

/// Pick the most direct answer out of a SerpAPI response body.
///
/// Preference: answer box (answer, then snippet, then highlighted words),
/// knowledge graph description, first organic snippet.
pub(crate) fn extract_answer(body: &Value) -> Option<String> {
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    };

    if let Some(answer_box) = body.get("answer_box") {
        if let Some(answer) = non_empty(answer_box.get("answer")) {
            return Some(answer);
        }
        if let Some(snippet) = non_empty(answer_box.get("snippet")) {
            return Some(snippet);
        }
        if let Some(words) = answer_box
            .get("snippet_highlighted_words")
            .and_then(Value::as_array)
        {
            let joined = words
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if !joined.is_empty() {
                return Some(joined);
            }
        }
    }

    if let Some(description) = non_empty(
        body.get("knowledge_graph")
            .and_then(|kg| kg.get("description")),
    ) {
        return Some(description);
    }

    body.get("organic_results")
        .and_then(Value::as_array)
        .and_then(|results| results.iter().find_map(|r| non_empty(r.get("snippet"))))
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "Google Search"
    }

    fn description(&self) -> &str {
        "Search the web for current events or facts not covered by the other tools. \
         Input should be a search query."
    }

    async fn execute(&self, input: &str) -> anyhow::Result<ToolResult> {
        let query = input.trim();
        if query.is_empty() {
            return Ok(ToolResult::failed("search query is empty"));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "SerpAPI request failed: {}",
                    crate::providers::sanitize_api_error(&e.to_string())
                )
            })?;

        if !response.status().is_success() {
            return Err(crate::providers::api_error("SerpAPI", response).await);
        }

        let body: Value = response.json().await?;
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Ok(ToolResult::failed(format!("SerpAPI: {error}")));
        }

        Ok(ToolResult::ok(
            extract_answer(&body).unwrap_or_else(|| NO_RESULT.to_string()),
        ))
    }
}
