//! OpenAI-compatible chat-completion client.
//!
//! This module provides the request/response types for chat completions and
//! a client that talks to any endpoint exposing `POST /chat/completions`,
//! optionally through an authenticated HTTP proxy.

use async_trait::async_trait;
use reqwest::{Client, Proxy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{LlmSettings, ProxySettings};
use crate::error::LlmError;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier to use for generation. Empty means the client default.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0). Higher values = more random.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Create a new generation request with default parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature for this request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens for this request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Unique identifier for this response, when the endpoint reports one.
    pub id: Option<String>,
    /// Model that generated this response.
    pub model: String,
    /// Generated choices/completions. May be empty.
    pub choices: Vec<Choice>,
    /// Token usage statistics, when reported.
    pub usage: Option<Usage>,
}

impl GenerationResponse {
    /// Get the first choice, if available.
    pub fn first_choice(&self) -> Option<&Choice> {
        self.choices.first()
    }

    /// Get the content of the first choice, if available.
    pub fn first_content(&self) -> Option<&str> {
        self.first_choice().map(|c| c.message.content.as_str())
    }
}

/// A single generated choice from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Index of this choice in the response.
    pub index: u32,
    /// Generated message. Null content from the endpoint becomes an empty string.
    pub message: Message,
    /// Reason the generation stopped (e.g., "stop", "length", "content_filter").
    pub finish_reason: Option<String>,
}

impl Choice {
    /// Whether the endpoint's content filter cut this completion.
    pub fn is_content_filtered(&self) -> bool {
        self.finish_reason.as_deref() == Some("content_filter")
    }
}

/// Token usage statistics for a generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Trait for LLM providers that can generate text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a response for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Client for OpenAI-compatible chat-completion APIs.
pub struct ChatCompletionClient {
    /// Base URL for the API.
    api_base: String,
    /// Bearer token for authentication.
    api_key: String,
    /// Default model to use for requests.
    default_model: String,
    /// Whether requests go through a proxy.
    proxied: bool,
    /// HTTP client for making API requests.
    http_client: Client,
}

impl ChatCompletionClient {
    /// Create a new client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL for the API (e.g., "https://api.pawan.krd/v1")
    /// * `api_key` - Bearer token sent with every request
    /// * `default_model` - Model to use when a request leaves it empty
    /// * `proxy` - Optional HTTP proxy, with basic auth when credentials are set
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiKey` for an empty key,
    /// `LlmError::InvalidProxy` if the proxy URL is rejected and
    /// `LlmError::RequestFailed` if the HTTP client cannot be built.
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
        proxy: Option<&ProxySettings>,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let mut builder = Client::builder().timeout(Duration::from_secs(120));

        if let Some(settings) = proxy {
            let mut http_proxy =
                Proxy::all(settings.url()).map_err(|e| LlmError::InvalidProxy(e.to_string()))?;
            if let Some(ref username) = settings.username {
                http_proxy =
                    http_proxy.basic_auth(username, settings.password.as_deref().unwrap_or(""));
            }
            builder = builder.proxy(http_proxy);
        }

        let http_client = builder
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.into(),
            proxied: proxy.is_some(),
            http_client,
        })
    }

    /// Create a client from resolved settings.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        Self::new(
            settings.api_base.clone(),
            settings.api_key.clone(),
            settings.model.clone(),
            settings.proxy.as_ref(),
        )
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Get the default model.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Check if requests are routed through a proxy.
    pub fn is_proxied(&self) -> bool {
        self.proxied
    }
}

/// Internal request structure for the OpenAI-compatible API.
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: Option<u32>,
    messages: Vec<Message>,
    temperature: Option<f64>,
}

/// Internal response structure from the OpenAI-compatible API.
///
/// Every field is optional: some gateways omit `choices` entirely instead of
/// returning an error.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Option<Vec<ApiChoice>>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: Option<ApiMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    role: Option<String>,
    content: Option<String>,
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl From<ApiResponse> for GenerationResponse {
    fn from(api: ApiResponse) -> Self {
        let choices = api
            .choices
            .unwrap_or_default()
            .into_iter()
            .map(|choice| {
                let (role, content) = match choice.message {
                    Some(msg) => (msg.role, msg.content),
                    None => (None, None),
                };
                Choice {
                    index: choice.index,
                    message: Message {
                        role: role.unwrap_or_else(|| "assistant".to_string()),
                        content: content.unwrap_or_default(),
                    },
                    finish_reason: choice.finish_reason,
                }
            })
            .collect();

        Self {
            id: api.id,
            model: api.model.unwrap_or_default(),
            choices,
            usage: api.usage,
        }
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model
        };

        let api_request = ApiRequest {
            model,
            max_tokens: request.max_tokens,
            messages: request.messages,
            temperature: request.temperature,
        };

        let url = format!("{}/chat/completions", self.api_base);

        let http_response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|r| r.error.message)
                .unwrap_or(error_text);

            if status_code == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status_code,
                message,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        Ok(api_response.into())
    }
}
