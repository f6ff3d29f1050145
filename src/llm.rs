//! LLM gateway
//!
//! Wraps an OpenAI-compatible chat completion endpoint (OpenRouter by
//! default) and turns a system + user prompt into a typed, schema-checked
//! value. The network call sits behind [`ChatTransport`] so the gateway can
//! run against a fake in tests.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";
const DEFAULT_SITE_URL: &str = "https://todo.10x.show";
const DEFAULT_APP_TITLE: &str = "10X-TODO";

/// Errors raised while talking to the LLM provider
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Authentication failed: Invalid API key")]
    Unauthorized,

    #[error("Rate limit exceeded: Too many requests")]
    RateLimited,

    #[error("LLM provider unavailable (status {status}). Please try again later.")]
    ServiceUnavailable { status: u16 },

    #[error("Unexpected response status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response structure from API")]
    InvalidResponse,

    #[error("Failed to parse JSON response from model: {0}")]
    Unparseable(String),

    #[error("Model response does not match the expected schema: {0}")]
    SchemaViolation(String),
}

impl LlmError {
    /// Stable identifier for the error log
    pub fn code(&self) -> &'static str {
        match self {
            LlmError::BadRequest(_) => "LLM_BAD_REQUEST",
            LlmError::Unauthorized => "LLM_UNAUTHORIZED",
            LlmError::RateLimited => "LLM_RATE_LIMITED",
            LlmError::ServiceUnavailable { .. } => "LLM_SERVICE_UNAVAILABLE",
            LlmError::UnexpectedStatus { .. } => "LLM_UNEXPECTED_STATUS",
            LlmError::Http(_) => "LLM_HTTP_ERROR",
            LlmError::InvalidResponse => "LLM_INVALID_RESPONSE",
            LlmError::Unparseable(_) => "LLM_UNPARSEABLE_RESPONSE",
            LlmError::SchemaViolation(_) => "LLM_SCHEMA_VIOLATION",
        }
    }
}

/// Maps a non-success provider status to an error.
pub fn classify_status(status: u16, body: &str) -> LlmError {
    match status {
        400 => LlmError::BadRequest(
            provider_message(body).unwrap_or_else(|| "Bad request".to_string()),
        ),
        401 => LlmError::Unauthorized,
        429 => LlmError::RateLimited,
        s if s >= 500 => LlmError::ServiceUnavailable { status: s },
        s => LlmError::UnexpectedStatus {
            status: s,
            body: body.to_string(),
        },
    }
}

/// Extracts `error.message` from a provider error body
fn provider_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

// --- Wire types --- //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
    pub json_schema: JsonSchemaFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

impl ChatCompletionResponse {
    /// A response with a single assistant message
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            choices: vec![ChatChoice {
                message: ChatChoiceMessage {
                    content: Some(content.into()),
                },
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Per-call overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

// --- Transport --- //

/// Sends one chat completion request
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &ChatCompletionRequest)
        -> Result<ChatCompletionResponse, LlmError>;
}

/// Connection settings for the OpenRouter transport
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    pub site_url: String,
    pub app_title: String,
}

impl OpenRouterConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            app_title: DEFAULT_APP_TITLE.to_string(),
        }
    }
}

/// reqwest-backed transport for OpenRouter
pub struct OpenRouterTransport {
    http: reqwest::Client,
    config: OpenRouterConfig,
}

impl OpenRouterTransport {
    pub fn new(config: OpenRouterConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ChatTransport for OpenRouterTransport {
    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.site_url)
            .header("X-Title", &self.config.app_title)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        Ok(response.json::<ChatCompletionResponse>().await?)
    }
}

// --- Gateway --- //

/// Typed front end over a [`ChatTransport`]
#[derive(Clone)]
pub struct LlmGateway {
    transport: Arc<dyn ChatTransport>,
    default_model: String,
}

impl LlmGateway {
    pub fn new(transport: Arc<dyn ChatTransport>, default_model: impl Into<String>) -> Self {
        Self {
            transport,
            default_model: default_model.into(),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Builds the request sent for `T`; the response schema is derived from `T`.
    pub fn build_request<T: JsonSchema>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: RequestOptions,
    ) -> ChatCompletionRequest {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
        ChatCompletionRequest {
            model: options
                .model
                .unwrap_or_else(|| self.default_model.clone()),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: Role::User,
                    content: user_prompt.to_string(),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: "json_schema".to_string(),
                    strict: true,
                    schema,
                },
            },
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }

    /// Sends the prompts and decodes the first choice as `T`.
    pub async fn json_response<T>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: RequestOptions,
    ) -> Result<T, LlmError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let request = self.build_request::<T>(system_prompt, user_prompt, options);
        let response = self.transport.send(&request).await.map_err(|err| {
            error!(model = %request.model, code = err.code(), "LLM request failed: {}", err);
            err
        })?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::InvalidResponse)?;
        debug!(model = %request.model, content = %content, "Raw model response");

        parse_structured(&content)
    }
}

/// Parses model output as JSON, then checks it against `T`.
pub fn parse_structured<T: DeserializeOwned>(content: &str) -> Result<T, LlmError> {
    let value: Value =
        serde_json::from_str(content).map_err(|err| LlmError::Unparseable(err.to_string()))?;
    serde_json::from_value(value).map_err(|err| LlmError::SchemaViolation(err.to_string()))
}
