//! OpenAI-compatible client implementation.
//!
//! # Features
//!
//! - **Chat Completions**: non-streaming `POST /chat/completions`
//! - **Model Listing**: `GET /models`, used to check the configured model at start-up
//! - **Tool/Function Calling**: tool schemas out, tool-call requests back
//! - **Automatic Retries**: exponential backoff for transient failures, honoring `Retry-After`
//! - **Secure API Keys**: keys are held as `SecretString` and never logged
//!
//! # Example
//!
//! ```no_run
//! use basedai_client::{LLMClient, OpenAIClient};
//! use basedai_common::chat::Conversation;
//! use basedai_common::client::{ChatRequest, Config};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::new("ollama", "llama3.1")
//!     .with_base_url("http://localhost:11434/v1");
//! let client = OpenAIClient::new(config)?;
//!
//! let mut conversation = Conversation::new();
//! conversation.add_message(conversation.user_message("Hello!"))?;
//!
//! let request = ChatRequest::new(conversation.get_messages().to_vec());
//! let response = client.chat(&request).await?;
//! println!("Response: {}", response.message.content);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use reqwest_retry_after::RetryAfterMiddleware;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use basedai_common::chat::Message;
use basedai_common::client::{ChatRequest, ChatResponse, Config};
use basedai_common::tools::ToolCall;

use crate::LLMClient;
use crate::error::{ClientError, ErrorResponse};
use crate::openai::{ChatCompletionRequest, ChatCompletionResponse, OpenAIMessage};

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Base URL used when the configuration does not name one.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible APIs.
///
/// The API key is optional: local servers such as Ollama accept unauthenticated
/// requests, in which case no `Authorization` header is sent.
#[derive(Clone)]
pub struct OpenAIClient {
    client: ClientWithMiddleware,
    api_key: Option<Arc<SecretString>>,
    base_url: String,
    config: Arc<Config>,
}

// Custom Debug implementation to avoid exposing API key
impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OpenAIClient {
    /// Create a new client from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be parsed or the HTTP client
    /// cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        url::Url::parse(&base_url).map_err(|e| {
            ClientError::ConfigurationError(format!("Invalid base URL '{base_url}': {e}"))
        })?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(
                config.retry_config.initial_delay,
                config.retry_config.max_delay,
            )
            .build_with_max_retries(
                u32::try_from(config.retry_config.max_retries).unwrap_or(u32::MAX),
            );

        // None means no timeout (useful for slow local models)
        let reqwest_client = match config.timeout_seconds {
            Some(timeout) => reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout))
                .build()?,
            None => reqwest::Client::builder().build()?,
        };

        // RetryAfterMiddleware goes first so Retry-After headers are respected
        // before falling back to exponential backoff
        let client = reqwest_middleware::ClientBuilder::new(reqwest_client)
            .with(RetryAfterMiddleware::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            api_key: config.api_key.clone().map(Arc::new),
            base_url,
            config: Arc::new(config),
        })
    }

    /// Set the model to use for chat completions.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(api_key) => builder.header(
                "Authorization",
                format!("Bearer {}", api_key.expose_secret()),
            ),
            None => builder,
        }
    }

    async fn make_request<T: for<'de> Deserialize<'de>, B: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let request_builder = self
            .authorized(self.client.post(&url))
            .header("Content-Type", "application/json")
            .body(serde_json::to_string(body).map_err(ClientError::SerializationError)?);

        Self::send(request_builder).await
    }

    /// Lists the model identifiers the backend serves (`GET /models`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the listing cannot be parsed.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        let listing: ModelList = Self::send(self.authorized(self.client.get(&url))).await?;
        Ok(listing.data.into_iter().map(|model| model.id).collect())
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        request_builder: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.map_err(|e| {
                warn!("Failed to read error response body: {e}");
                ClientError::NetworkError(e)
            })?;

            let error_message = match serde_json::from_str::<ErrorResponse>(&error_text) {
                Ok(parsed) => parsed.error.message,
                Err(parse_err) => {
                    debug!("Error body is not structured JSON ({parse_err}); using raw text");
                    error_text
                }
            };

            error!(
                "API request failed with status {}: {}",
                status.as_u16(),
                error_message
            );

            return Err(match status.as_u16() {
                401 => ClientError::AuthenticationError(error_message),
                408 => ClientError::TimeoutError,
                429 => ClientError::RateLimitError { retry_after: None },
                500..=599 => ClientError::ServiceUnavailable(error_message),
                _ => ClientError::RequestError(error_message),
            });
        }

        let response_text = response.text().await?;
        debug!("Raw API response: {response_text}");
        serde_json::from_str(&response_text).map_err(ClientError::SerializationError)
    }

    /// Convert a wire message into the common message type.
    ///
    /// Tool-call arguments are passed through untouched; each tool decodes and
    /// validates its own arguments.
    fn convert_openai_message(openai_msg: &OpenAIMessage, conversation_id: Uuid) -> Message {
        let tool_calls: SmallVec<[ToolCall; 2]> = openai_msg
            .tool_calls
            .as_ref()
            .map(|tcs| tcs.iter().map(ToolCall::from).collect())
            .unwrap_or_default();

        Message {
            id: Uuid::new_v4(),
            conversation_id,
            role: openai_msg.role,
            content: openai_msg.content.clone().unwrap_or_default(),
            tool_calls,
            tool_call_id: openai_msg.tool_call_id.clone(),
            name: openai_msg.name.clone(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
            is_error: false,
        }
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    fn config(&self) -> &Config {
        &self.config
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.validate_request(request)?;

        let openai_request = ChatCompletionRequest::from((request, self.config.as_ref()));

        let response: ChatCompletionResponse = self
            .make_request("chat/completions", &openai_request)
            .await?;

        let choice = response.choices.first().ok_or_else(|| {
            warn!(
                "Received empty choices array from API. Response ID: {}, Model: {}",
                response.id, response.model
            );
            ClientError::InvalidResponse("API returned no choices in response".to_string())
        })?;

        let conversation_id = request
            .messages
            .first()
            .ok_or_else(|| {
                ClientError::InvalidRequest("Request must contain at least one message".to_string())
            })?
            .conversation_id;

        let message = Self::convert_openai_message(&choice.message, conversation_id);

        let finish_reason = choice
            .finish_reason
            .as_ref()
            .and_then(|reason| reason.parse().ok());

        Ok(ChatResponse {
            message,
            model: response.model,
            usage: response.usage,
            finish_reason,
            created_at: DateTime::from_timestamp(i64::try_from(response.created).unwrap_or(0), 0)
                .unwrap_or_else(Utc::now),
            response_id: Some(response.id).filter(|id| !id.is_empty()),
        })
    }
}
