use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use super::error::ProviderError;
use super::types::{NormalizedResponse, Request, TokenUsage};
use crate::config::{ProviderConfig, ProviderKind, ResponseShape};
use crate::core::{redact_secrets, SecretString};

/// One backend. Turns a canonical [`Request`] into a provider call and the
/// provider's reply into a [`NormalizedResponse`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Id the dispatcher routes on
    fn id(&self) -> &str;

    async fn send(&self, request: &Request) -> Result<NormalizedResponse, ProviderError>;
}

/// Build the adapter described by a `[providers.<id>]` config section
pub fn build_adapter(
    id: &str,
    config: &ProviderConfig,
    api_key: Option<SecretString>,
) -> Result<Arc<dyn ProviderAdapter>> {
    let timeout = Duration::from_secs(config.timeout_secs);

    let adapter: Arc<dyn ProviderAdapter> = match config.kind {
        ProviderKind::Openai => {
            let key = api_key.with_context(|| {
                format!("OpenAI API key not found for provider '{}'", id)
            })?;
            Arc::new(OpenAiAdapter::new(
                id,
                key,
                config.base_url.clone(),
                config.model.clone(),
                timeout,
            )?)
        }
        ProviderKind::Anthropic => {
            let key = api_key.with_context(|| {
                format!("Anthropic API key not found for provider '{}'", id)
            })?;
            Arc::new(AnthropicAdapter::new(
                id,
                key,
                config.base_url.clone(),
                config.model.clone(),
                config.max_tokens,
                timeout,
            )?)
        }
        ProviderKind::HttpJson => {
            let base_url = config
                .base_url
                .clone()
                .with_context(|| format!("base_url is required for http_json provider '{}'", id))?;
            let url = format!(
                "{}{}",
                base_url.trim_end_matches('/'),
                config.path.as_deref().unwrap_or("")
            );
            Arc::new(HttpJsonAdapter::new(
                id,
                url,
                api_key,
                config.model.clone(),
                config.response.clone(),
                timeout,
            )?)
        }
    };

    Ok(adapter)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// `{model, messages: [user prompt], ...options}` as used by chat-completion style APIs
fn chat_body(model: &str, request: &Request) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("model".into(), json!(model));
    body.insert(
        "messages".into(),
        json!([{ "role": "user", "content": request.prompt() }]),
    );
    for (key, value) in request.passthrough_options() {
        if key != "messages" {
            body.insert(key.clone(), value.to_json());
        }
    }
    body
}

/// Send a JSON request and classify the outcome
async fn post_json(builder: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
    let response = builder.send().await?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Transport(format!("failed to read response body: {}", e)))?;

    if !status.is_success() {
        return Err(classify_status(status.as_u16(), &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| ProviderError::Transport(format!("malformed payload: {}", e)))
}

/// 408, 429 and 5xx are transient; any other failure status is a rejection
pub fn classify_status(status: u16, body: &str) -> ProviderError {
    // Redact the whole body so a key cut by truncation is still caught
    let message = error_message(&redact_secrets(body));
    match status {
        408 | 429 | 500..=599 => ProviderError::Transport(format!("HTTP {}: {}", status, message)),
        _ => ProviderError::Rejected {
            status: Some(status),
            message,
        },
    }
}

/// Pull the human readable message out of a provider error body
fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        for pointer in ["/error/message", "/message", "/error"] {
            if let Some(msg) = json.pointer(pointer).and_then(Value::as_str) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

fn pointer_u64(json: &Value, pointer: &str) -> Option<u64> {
    json.pointer(pointer).and_then(Value::as_u64)
}

fn missing_field(field: &str) -> ProviderError {
    ProviderError::Transport(format!("malformed payload: missing {}", field))
}

// ============================================================================
// OPENAI ADAPTER
// ============================================================================

pub struct OpenAiAdapter {
    id: String,
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    default_model: String,
}

impl OpenAiAdapter {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    pub fn new(
        id: impl Into<String>,
        api_key: SecretString,
        base_url: Option<String>,
        default_model: String,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            client: http_client(timeout)?,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            default_model,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, request: &Request) -> Result<NormalizedResponse, ProviderError> {
        let model = request.model().unwrap_or(&self.default_model);
        let body = chat_body(model, request);

        let json = post_json(
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(self.api_key.expose())
                .json(&body),
        )
        .await?;

        let content = json
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_field("choices[0].message.content"))?
            .to_string();

        let token_usage = TokenUsage::new(
            pointer_u64(&json, "/usage/prompt_tokens").unwrap_or(0),
            pointer_u64(&json, "/usage/completion_tokens").unwrap_or(0),
            pointer_u64(&json, "/usage/total_tokens"),
        );

        Ok(NormalizedResponse {
            provider_id: self.id.clone(),
            model: json["model"].as_str().unwrap_or(model).to_string(),
            content,
            token_usage,
            raw: json,
        })
    }
}

// ============================================================================
// ANTHROPIC ADAPTER
// ============================================================================

pub struct AnthropicAdapter {
    id: String,
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    default_model: String,
    max_tokens: u32,
}

impl AnthropicAdapter {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com/v1";
    pub const API_VERSION: &'static str = "2023-06-01";

    pub fn new(
        id: impl Into<String>,
        api_key: SecretString,
        base_url: Option<String>,
        default_model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            client: http_client(timeout)?,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            default_model,
            max_tokens,
        })
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, request: &Request) -> Result<NormalizedResponse, ProviderError> {
        let model = request.model().unwrap_or(&self.default_model);
        let mut body = chat_body(model, request);
        // max_tokens is mandatory for this API
        body.entry("max_tokens").or_insert(json!(self.max_tokens));

        let json = post_json(
            self.client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", self.api_key.expose())
                .header("anthropic-version", Self::API_VERSION)
                .json(&body),
        )
        .await?;

        let blocks = json["content"]
            .as_array()
            .ok_or_else(|| missing_field("content"))?;

        let content: String = blocks
            .iter()
            .filter(|b| b["type"].as_str() == Some("text"))
            .filter_map(|b| b["text"].as_str())
            .collect();

        let token_usage = TokenUsage::new(
            pointer_u64(&json, "/usage/input_tokens").unwrap_or(0),
            pointer_u64(&json, "/usage/output_tokens").unwrap_or(0),
            None,
        );

        Ok(NormalizedResponse {
            provider_id: self.id.clone(),
            model: json["model"].as_str().unwrap_or(model).to_string(),
            content,
            token_usage,
            raw: json,
        })
    }
}

// ============================================================================
// GENERIC HTTP/JSON ADAPTER
// ============================================================================

/// Any JSON endpoint that accepts a chat-completion style body. Fields are
/// read from the reply through configurable JSON pointers.
pub struct HttpJsonAdapter {
    id: String,
    client: reqwest::Client,
    url: String,
    api_key: Option<SecretString>,
    default_model: String,
    shape: ResponseShape,
}

impl HttpJsonAdapter {
    pub fn new(
        id: impl Into<String>,
        url: String,
        api_key: Option<SecretString>,
        default_model: String,
        shape: ResponseShape,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            client: http_client(timeout)?,
            url,
            api_key,
            default_model,
            shape,
        })
    }
}

#[async_trait]
impl ProviderAdapter for HttpJsonAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, request: &Request) -> Result<NormalizedResponse, ProviderError> {
        let model = request.model().unwrap_or(&self.default_model);
        let body = chat_body(model, request);

        let mut builder = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose());
        }
        let json = post_json(builder).await?;

        let content = json
            .pointer(&self.shape.content)
            .and_then(Value::as_str)
            .ok_or_else(|| missing_field(&self.shape.content))?
            .to_string();

        let token_usage = TokenUsage::new(
            pointer_u64(&json, &self.shape.prompt_tokens).unwrap_or(0),
            pointer_u64(&json, &self.shape.completion_tokens).unwrap_or(0),
            pointer_u64(&json, &self.shape.total_tokens),
        );

        let model = json
            .pointer(&self.shape.model)
            .and_then(Value::as_str)
            .unwrap_or(model)
            .to_string();

        Ok(NormalizedResponse {
            provider_id: self.id.clone(),
            model,
            content,
            token_usage,
            raw: json,
        })
    }
}
