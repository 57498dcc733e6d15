//! OpenAI chat-completions wire types and client.
//!
//! The same wire format is served by OpenAI, Ollama's `/v1` endpoint and most
//! self-hosted inference servers, so one client covers all of them.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use typed_builder::TypedBuilder;

use basedai_common::chat::{Message, MessageRole};
use basedai_common::client::{ChatRequest, Config, Usage};
use basedai_common::tools::{FunctionCall, Tool, ToolCall};

pub mod client;
pub use client::OpenAIClient;

/// A single choice from a chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    /// The index of this choice in the response array.
    pub index: u32,
    /// The generated message for this choice.
    pub message: OpenAIMessage,
    /// Why generation stopped for this choice.
    pub finish_reason: Option<String>,
}

/// OpenAI-compatible message format.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct OpenAIMessage {
    /// The role of the message author.
    pub role: MessageRole,
    /// The text content of the message (optional for tool calls).
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Optional name of the message author.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls requested by the assistant.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<SmallVec<[OpenAIToolCall; 2]>>,
    /// ID of the tool call this message is responding to.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<&Message> for OpenAIMessage {
    fn from(message: &Message) -> Self {
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(OpenAIToolCall::from)
                    .collect(),
            )
        };

        // Tool results always carry content; other roles omit it when empty.
        let content = if message.content.is_empty() && message.role != MessageRole::Tool {
            None
        } else {
            Some(message.content.clone())
        };

        Self::builder()
            .role(message.role)
            .content(content)
            .name(message.name.clone())
            .tool_calls(tool_calls)
            .tool_call_id(message.tool_call_id.clone())
            .build()
    }
}

/// OpenAI-compatible tool call format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    /// Unique identifier for this tool call. Some servers omit it; the
    /// orchestration loop assigns one when it is empty.
    #[serde(default)]
    pub id: Cow<'static, str>,
    /// Type of the tool call, typically "function".
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub r#type: Cow<'static, str>,
    /// The function to call with its arguments.
    pub function: OpenAIFunction,
}

impl From<&ToolCall> for OpenAIToolCall {
    fn from(tool_call: &ToolCall) -> Self {
        Self {
            id: Cow::Owned(tool_call.id.clone()),
            r#type: Cow::Owned(tool_call.call_type.clone()),
            function: OpenAIFunction::from(&tool_call.function),
        }
    }
}

impl From<&OpenAIToolCall> for ToolCall {
    fn from(tool_call: &OpenAIToolCall) -> Self {
        Self {
            id: tool_call.id.to_string(),
            call_type: tool_call.r#type.to_string(),
            function: FunctionCall {
                name: tool_call.function.name.to_string(),
                arguments: tool_call.function.arguments.to_string(),
            },
        }
    }
}

const fn default_tool_call_type() -> Cow<'static, str> {
    Cow::Borrowed("function")
}

/// OpenAI-compatible function call format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunction {
    /// The name of the function to call.
    pub name: Cow<'static, str>,
    /// The arguments as a JSON-serialized string.
    ///
    /// Some servers (notably Ollama) send a JSON object here instead of a string;
    /// both shapes are accepted.
    #[serde(default, deserialize_with = "deserialize_arguments")]
    pub arguments: Cow<'static, str>,
}

impl From<&FunctionCall> for OpenAIFunction {
    fn from(function_call: &FunctionCall) -> Self {
        Self {
            name: Cow::Owned(function_call.name.clone()),
            arguments: Cow::Owned(function_call.arguments.clone()),
        }
    }
}

fn deserialize_arguments<'de, D>(deserializer: D) -> Result<Cow<'static, str>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Cow::Owned(s),
        serde_json::Value::Null => Cow::Borrowed(""),
        other => Cow::Owned(other.to_string()),
    })
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct ChatCompletionRequest {
    /// The model identifier to use.
    pub model: String,
    /// The conversation messages in OpenAI format.
    pub messages: Vec<OpenAIMessage>,
    /// Maximum tokens to generate.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature 0.0 to 2.0.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Always `false`; this client only uses non-streaming completions.
    #[builder(default = false)]
    pub stream: bool,
    /// Tools available for function calling.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// Tool selection strategy.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
}

impl From<(&ChatRequest, &Config)> for ChatCompletionRequest {
    fn from((request, config): (&ChatRequest, &Config)) -> Self {
        let messages: Vec<OpenAIMessage> =
            request.messages.iter().map(OpenAIMessage::from).collect();

        Self::builder()
            .model(
                request
                    .model
                    .clone()
                    .unwrap_or_else(|| config.model.clone()),
            )
            .messages(messages)
            .max_tokens(request.max_tokens.or(config.max_tokens))
            .temperature(request.temperature.or(config.temperature))
            .tools(request.tools.clone().filter(|t| !t.is_empty()))
            .tool_choice(request.tool_choice.as_ref().map(|tc| tc.clone().into()))
            .build()
    }
}

/// Response from `POST /chat/completions`.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    /// Unique identifier for this completion.
    #[serde(default)]
    pub id: String,
    /// Unix timestamp of when the completion was created.
    #[serde(default)]
    pub created: u64,
    /// The model that generated this completion.
    pub model: String,
    /// Generated completions.
    pub choices: Vec<ChatChoice>,
    /// Token usage statistics (if available).
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use uuid::Uuid;

    #[test]
    fn tool_message_keeps_empty_content() {
        let msg = Message::tool(Uuid::new_v4(), "", "call_1".into(), "f".into()).unwrap();
        let wire = OpenAIMessage::from(&msg);
        assert_eq!(wire.content.as_deref(), Some(""));
        assert_eq!(wire.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn assistant_tool_request_omits_content() {
        let msg = Message::assistant(Uuid::new_v4(), "")
            .with_tool_calls(vec![ToolCall::with_id("c1", "get_weather", "{}")])
            .unwrap();
        let json = serde_json::to_value(OpenAIMessage::from(&msg)).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["tool_calls"][0]["id"], "c1");
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["arguments"], "{}");
    }

    #[test]
    fn object_arguments_are_accepted() {
        let call: OpenAIToolCall = serde_json::from_value(serde_json::json!({
            "id": "call_9",
            "function": {"name": "get_date_time", "arguments": {"location": "Tokyo"}}
        }))
        .unwrap();
        let common = ToolCall::from(&call);
        assert_eq!(common.call_type, "function");
        let args: serde_json::Value = serde_json::from_str(&common.function.arguments).unwrap();
        assert_eq!(args["location"], "Tokyo");
    }

    #[test]
    fn tool_call_without_id_is_accepted() {
        let msg: OpenAIMessage = serde_json::from_str(
            r#"{"role":"assistant","content":null,"tool_calls":[{"type":"function","function":{"name":"get_date_time","arguments":{"location":"Paris"}}}]}"#,
        )
        .unwrap();
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        let common = ToolCall::from(&calls[0]);
        assert!(common.id.is_empty());
        assert_eq!(common.function.name, "get_date_time");
    }

    #[test]
    fn request_falls_back_to_config_defaults() {
        let config = Config::new("ollama", "llama3.1").with_temperature(0.2);
        let request = ChatRequest::new(vec![Message::user(Uuid::new_v4(), "hi")]);
        let wire = ChatCompletionRequest::from((&request, &config));
        assert_eq!(wire.model, "llama3.1");
        assert_eq!(wire.temperature, Some(0.2));
        assert!(!wire.stream);
        assert!(wire.tools.is_none());
    }
}
