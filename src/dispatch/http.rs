use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatch::{ProviderRequest, ProviderResult};
use crate::error::AgentError;

pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const PROVIDER: &str = "anthropic";

/// Upstream error bodies are echoed to the caller; keep them short.
const MAX_ERROR_PREVIEW_CHARS: usize = 500;

pub struct HttpDispatch {
    client: Client,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    /// Kept untyped: a block missing `type` or `text` is skipped, not a
    /// parse failure for the whole response.
    #[serde(default)]
    content: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpDispatch {
    pub fn new() -> Result<Self, AgentError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self { client })
    }

    /// POST one Messages API call to `{base_url}/v1/messages` and return the
    /// concatenated text output.
    pub async fn query_model(
        &self,
        req: &ProviderRequest,
        base_url: &str,
        api_key: &str,
    ) -> Result<ProviderResult, AgentError> {
        let start = Instant::now();

        // Check for expired deadline before making the request
        let timeout = req
            .deadline
            .checked_duration_since(Instant::now())
            .filter(|d| *d > Duration::from_millis(100))
            .ok_or(AgentError::Timeout(0))?;

        let body = MessagesRequest {
            model: &req.model,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            system: &req.system_prompt,
            messages: [Message {
                role: "user",
                content: &req.prompt,
            }],
        };

        let url = messages_url(base_url);
        tracing::debug!(model = %req.model, %url, "sending messages request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| timeout_or_request(e, timeout))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AgentError::RateLimited {
                provider: PROVIDER.to_string(),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            let bytes = response.bytes().await.unwrap_or_default();
            return Err(AgentError::AuthFailed {
                provider: PROVIDER.to_string(),
                message: format!("{status}: {}", error_message(&bytes)),
            });
        }

        if !status.is_success() {
            let bytes = response.bytes().await.unwrap_or_default();
            return Err(AgentError::Upstream {
                provider: PROVIDER.to_string(),
                message: format!("{status}: {}", error_message(&bytes)),
                status: Some(status.as_u16()),
            });
        }

        if let Some(len) = response.content_length()
            && len > MAX_RESPONSE_BYTES as u64
        {
            return Err(too_large(len));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| timeout_or_request(e, timeout))?;

        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(too_large(bytes.len() as u64));
        }

        let text = extract_text(&bytes)?;
        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            model = %req.model,
            latency_ms,
            output_bytes = text.len(),
            "messages request complete"
        );

        Ok(ProviderResult {
            text,
            model: req.model.clone(),
            provider: PROVIDER.to_string(),
            latency_ms,
        })
    }
}

/// Concatenate the `text` of every text block in a Messages API response
/// body, in order. A missing `content` array yields an empty string.
pub fn extract_text(body: &[u8]) -> Result<String, AgentError> {
    let parsed: MessagesResponse = serde_json::from_slice(body)
        .map_err(|e| AgentError::SchemaParse(format!("failed to parse response: {e}")))?;

    Ok(parsed
        .content
        .unwrap_or_default()
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect())
}

/// Accepts a bare origin (`https://api.anthropic.com`), a `/v1` prefix, or
/// the full endpoint.
fn messages_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1/messages") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{base}/messages")
    } else {
        format!("{base}/v1/messages")
    }
}

fn timeout_or_request(e: reqwest::Error, timeout: Duration) -> AgentError {
    if e.is_timeout() {
        AgentError::Timeout(timeout.as_millis() as u64)
    } else {
        AgentError::Request(e)
    }
}

fn too_large(len: u64) -> AgentError {
    AgentError::Upstream {
        provider: PROVIDER.to_string(),
        message: format!("response too large: {len} bytes (max {MAX_RESPONSE_BYTES})"),
        status: None,
    }
}

/// Prefer the API's own `error.message`; fall back to a prefix of the raw body.
fn error_message(bytes: &[u8]) -> String {
    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(bytes) {
        return envelope.error.message;
    }
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.chars().count() > MAX_ERROR_PREVIEW_CHARS {
        let preview: String = trimmed.chars().take(MAX_ERROR_PREVIEW_CHARS).collect();
        format!("{preview}...")
    } else {
        trimmed.to_string()
    }
}
