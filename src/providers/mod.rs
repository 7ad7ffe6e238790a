//! Provider subsystem for model inference backends.
//!
//! Each provider implements the [`Provider`] trait defined in [`traits`] and is
//! selected by its canonical string key in [`create_provider`].

pub mod compatible;
pub mod traits;

#[allow(unused_imports)]
pub use traits::{ChatMessage, Provider};

use crate::config::ProviderConfig;
use std::time::Duration;

const MAX_API_ERROR_CHARS: usize = 200;

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from upstream error strings.
///
/// Redacts tokens with prefixes like `sk-` (OpenAI) and `/v2/` path segments
/// that carry Alchemy keys.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 4] = ["sk-", "sk_", "api_key=", "/v2/"];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            let replacement = format!("{prefix}[REDACTED]");
            scrubbed.replace_range(start..end, &replacement);
            search_from = start + replacement.len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized error from a failed upstream HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}

/// Factory: create the configured provider.
pub fn create_provider(config: &ProviderConfig) -> anyhow::Result<Box<dyn Provider>> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    match config.name.trim() {
        "openai" => Ok(Box::new(compatible::OpenAiCompatibleProvider::with_timeout(
            "OpenAI",
            config
                .api_url
                .as_deref()
                .unwrap_or(compatible::OPENAI_BASE_URL),
            config.api_key.as_deref(),
            timeout,
        ))),
        "openai-compatible" | "custom" => {
            let Some(url) = config.api_url.as_deref().filter(|u| !u.trim().is_empty()) else {
                anyhow::bail!("provider \"{}\" requires provider.api_url", config.name);
            };
            Ok(Box::new(compatible::OpenAiCompatibleProvider::with_timeout(
                "Custom",
                url,
                config.api_key.as_deref(),
                timeout,
            )))
        }
        other => anyhow::bail!(
            "Unknown provider: {other}. Supported: \"openai\", \"openai-compatible\"."
        ),
    }
}
