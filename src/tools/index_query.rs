use super::traits::{Tool, ToolResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queries a remote document index (forum posts, help-center articles, asset
/// lists) over HTTP: `POST {url}` with `{"query": ...}`, expecting `{"response": ...}`.
pub struct IndexQueryTool {
    name: String,
    description: String,
    url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct IndexRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    #[serde(default)]
    response: Option<String>,
}

impl IndexQueryTool {
    pub fn new(name: &str, description: &str, url: &str, timeout: Duration) -> Self {
        Self {
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            url: url.trim().to_string(),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl Tool for IndexQueryTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, input: &str) -> anyhow::Result<ToolResult> {
        let response = self
            .client
            .post(&self.url)
            .json(&IndexRequest {
                query: input.trim(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(crate::providers::api_error(&self.name, response).await);
        }

        let body: IndexResponse = response.json().await?;
        match body.response.map(|r| r.trim().to_string()) {
            Some(text) if !text.is_empty() => Ok(ToolResult::ok(text)),
            _ => Ok(ToolResult::failed(format!(
                "{} returned no matching documents",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}/query")
    }

    #[tokio::test]
    async fn posts_query_and_returns_response_text() {
        let url = serve(Router::new().route(
            "/query",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"response": format!("docs about {}", body["query"].as_str().unwrap_or(""))}))
            }),
        ))
        .await;

        let tool = IndexQueryTool::new("Help Center", "Support articles.", &url, Duration::from_secs(5));
        assert_eq!(tool.name(), "Help Center");
        let result = tool.execute(" refunds ").await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "docs about refunds");
    }

    #[tokio::test]
    async fn empty_response_is_failed_result() {
        let url = serve(Router::new().route("/query", post(|| async { Json(json!({})) }))).await;

        let tool = IndexQueryTool::new("Reddit", "Forum posts.", &url, Duration::from_secs(5));
        let result = tool.execute("anything").await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("no matching documents"));
    }

    #[tokio::test]
    async fn upstream_error_status_is_err() {
        let url = serve(Router::new().route(
            "/query",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "index loading") }),
        ))
        .await;

        let tool = IndexQueryTool::new("Reddit", "Forum posts.", &url, Duration::from_secs(5));
        let err = tool.execute("anything").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
