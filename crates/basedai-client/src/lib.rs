//! # basedai-client
//!
//! The language-model port: an [`LLMClient`] trait plus an implementation for
//! OpenAI-compatible chat-completion endpoints (OpenAI, Ollama and friends).
//!
//! ## Example
//!
//! ```no_run
//! use basedai_client::{LLMClient, OpenAIClient};
//! use basedai_common::{ChatRequest, Config, Message};
//! use uuid::Uuid;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::new("ollama", "llama3.1")
//!     .with_base_url("http://localhost:11434/v1");
//! let client = OpenAIClient::new(config)?;
//!
//! let message = Message::user(Uuid::new_v4(), "Hello, world!");
//! let request = ChatRequest::new(vec![message]);
//!
//! let response = client.chat(&request).await?;
//! println!("Response: {}", response.message.content);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use async_trait::async_trait;

use basedai_common::{ChatRequest, ChatResponse, Config};

pub mod error;
pub mod openai;

pub use error::ClientError;
pub use openai::OpenAIClient;

/// Trait for language-model client implementations.
///
/// Given the conversation so far and the available tool schemas, a client
/// returns the model's next message: either a final answer or a batch of tool
/// calls. Implementations must be thread-safe.
#[must_use = "LLMClient must be used to make requests"]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Get the client's configuration.
    fn config(&self) -> &Config;

    /// Send a chat completion request to the model.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The request fails validation
    /// - Network communication fails
    /// - The API returns an error (authentication, rate limit, etc.)
    /// - The response cannot be parsed
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Check if the client supports tool/function calling.
    fn supports_tools(&self) -> bool;

    /// Validate a configuration object.
    ///
    /// # Errors
    ///
    /// Returns an error if the temperature is outside 0.0 to 2.0.
    fn validate_config(&self, config: &Config) -> Result<()> {
        if config
            .temperature
            .is_some_and(|t| !(0.0..=2.0).contains(&t))
        {
            return Err(ClientError::InvalidTemperature.into());
        }
        Ok(())
    }

    /// Validate a chat request before sending.
    ///
    /// # Errors
    ///
    /// Returns an error if the request has no messages or carries tools the
    /// client cannot handle.
    fn validate_request(&self, request: &ChatRequest) -> Result<()> {
        request
            .validate()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        if !self.supports_tools() && request.has_tools() {
            return Err(ClientError::ToolsNotSupported.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use basedai_common::chat::Message;
    use basedai_common::tools::{ParameterDescriptor, Tool, ToolDescriptor};
    use uuid::Uuid;

    struct MockLLMClient {
        config: Config,
        supports_tools: bool,
    }

    impl MockLLMClient {
        fn new() -> Self {
            Self {
                config: Config::new("mock", "mock-model"),
                supports_tools: true,
            }
        }

        fn without_tools() -> Self {
            Self {
                supports_tools: false,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl LLMClient for MockLLMClient {
        fn config(&self) -> &Config {
            &self.config
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
            let conversation_id = request.messages[0].conversation_id;
            Ok(ChatResponse {
                message: Message::assistant(conversation_id, "pong"),
                model: "mock-model".to_string(),
                usage: None,
                finish_reason: None,
                created_at: chrono::Utc::now(),
                response_id: Some("test-response".to_string()),
            })
        }

        fn supports_tools(&self) -> bool {
            self.supports_tools
        }
    }

    fn create_test_tool() -> Tool {
        ToolDescriptor::builder()
            .name("test_function")
            .description("A test function")
            .required_parameters(vec![ParameterDescriptor::string("arg", "A test argument")])
            .build()
            .to_tool()
    }

    fn user_request() -> ChatRequest {
        ChatRequest::new(vec![Message::user(Uuid::new_v4(), "ping")])
    }

    #[test]
    fn test_validate_request_empty_messages() {
        let client = MockLLMClient::new();
        let request = ChatRequest::new(vec![]);

        let error = client.validate_request(&request).unwrap_err();
        let client_error = error.downcast_ref::<ClientError>().unwrap();
        assert!(matches!(client_error, ClientError::InvalidRequest(_)));
    }

    #[test]
    fn test_validate_request_tools_not_supported() {
        let client = MockLLMClient::without_tools();
        let request = user_request().with_tools(vec![create_test_tool()]);

        let error = client.validate_request(&request).unwrap_err();
        let client_error = error.downcast_ref::<ClientError>().unwrap();
        assert!(matches!(client_error, ClientError::ToolsNotSupported));
    }

    #[test]
    fn test_validate_request_tools_supported() {
        let client = MockLLMClient::new();
        let request = user_request().with_tools(vec![create_test_tool()]);
        assert!(client.validate_request(&request).is_ok());
    }

    #[test]
    fn test_validate_config_temperature() {
        let client = MockLLMClient::new();
        assert!(client.validate_config(&Config::new("m", "m").with_temperature(3.0)).is_err());
        assert!(client.validate_config(&Config::new("m", "m").with_temperature(1.0)).is_ok());
    }

    #[tokio::test]
    async fn test_chat_method() {
        let client = MockLLMClient::new();
        let response = client.chat(&user_request()).await.unwrap();
        assert_eq!(response.response_id, Some("test-response".to_string()));
        assert_eq!(response.message.content, "pong");
    }
}
