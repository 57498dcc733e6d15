//! Conversation and message management for tool-calling runs.
//!
//! This module provides the conversation model that the orchestration loop
//! appends to while it drives a run: user questions, assistant answers,
//! assistant tool-call requests and the tool results fed back to the model.
//!
//! # Overview
//!
//! - [`Message`]: Individual messages with role-based content (system, user, assistant, tool)
//! - [`Conversation`]: An append-only thread of messages that enforces the
//!   tool-call/tool-result pairing invariant
//!
//! # Tool Calling Workflow
//!
//! ```
//! use basedai_common::chat::Conversation;
//! use basedai_common::tools::ToolCall;
//!
//! let mut conversation = Conversation::new();
//!
//! let user_msg = conversation.user_message("What's the weather in Tokyo?");
//! conversation.add_message(user_msg).unwrap();
//!
//! let tool_call = ToolCall::new("get_weather", r#"{"location": "Tokyo"}"#);
//! let assistant_msg = conversation
//!     .assistant_message("")
//!     .with_tool_calls(vec![tool_call.clone()])
//!     .unwrap();
//! conversation.add_message(assistant_msg).unwrap();
//! assert_eq!(conversation.pending_tool_call_ids(), vec![tool_call.id.clone()]);
//!
//! let tool_result = conversation
//!     .tool_message("Current weather in Tokyo: 64.2°F, Clear sky", tool_call.id.clone(), "get_weather".to_string())
//!     .unwrap();
//! conversation.add_message(tool_result).unwrap();
//! assert!(conversation.pending_tool_call_ids().is_empty());
//! ```
//!
//! # Invariants
//!
//! - Tool calls can only be added to assistant messages
//! - Tool messages must have a `tool_call_id` and `name` (function name)
//! - A tool message must answer a tool call that is still pending in the conversation
//! - Messages must belong to the conversation they're added to

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::tools::ToolCall;

/// Represents the role of a message sender in a conversation.
///
/// Roles are serialized to lowercase strings matching the OpenAI API format.
///
/// ```
/// use basedai_common::chat::MessageRole;
///
/// let role = MessageRole::User;
/// let json = serde_json::to_string(&role).unwrap();
/// assert_eq!(json, "\"user\"");
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageRole {
    /// System-level instructions (the configured system prompt).
    #[serde(rename = "system")]
    System,

    /// The question posed by the end user.
    #[serde(rename = "user")]
    User,

    /// Messages from the model: either a final answer or a batch of tool calls.
    #[serde(rename = "assistant")]
    Assistant,

    /// Results from executing a tool, linked to the call by `tool_call_id`.
    #[serde(rename = "tool")]
    Tool,
}

/// A single message in a conversation.
///
/// # Creating Messages
///
/// ```
/// use basedai_common::chat::Message;
/// use uuid::Uuid;
///
/// let conv_id = Uuid::new_v4();
///
/// let system = Message::system(conv_id, "You are a helpful assistant");
/// let user = Message::user(conv_id, "What is Rust?");
/// let assistant = Message::assistant(conv_id, "Rust is a systems programming language.");
/// let tool = Message::tool(
///     conv_id,
///     "2026-10-18 14:03:12 in Europe/Paris timezone",
///     "call_123".to_string(),
///     "get_date_time".to_string()
/// ).expect("Valid tool message");
/// assert!(!tool.is_error);
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, TypedBuilder)]
pub struct Message {
    /// Unique identifier for this message.
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    /// ID of the conversation this message belongs to.
    pub conversation_id: Uuid,

    /// The role of the message sender.
    pub role: MessageRole,

    /// The text content of the message.
    ///
    /// - For system/user/assistant messages: the actual message text
    /// - For tool messages: the result text returned by the tool
    /// - Can be empty for assistant messages that only contain tool calls
    pub content: String,

    /// Additional metadata attached to this message.
    #[builder(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// When this message was created.
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,

    /// Tool calls requested by this message (assistant messages only).
    ///
    /// Uses `SmallVec` to avoid heap allocation for ≤2 tool calls (the common case).
    #[builder(default)]
    pub tool_calls: SmallVec<[ToolCall; 2]>,

    /// Reference to the tool call this message responds to (tool messages only).
    #[builder(default)]
    pub tool_call_id: Option<String>,

    /// Name of the function for tool messages.
    #[builder(default)]
    pub name: Option<String>,

    /// Whether a tool message reports a failure rather than a result.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    /// Creates a new message with the specified role and content.
    pub fn new(conversation_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
            tool_calls: SmallVec::new(),
            tool_call_id: None,
            name: None,
            is_error: false,
        }
    }

    /// Creates a new system message.
    pub fn system(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::System, content)
    }

    /// Creates a new user message.
    pub fn user(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::User, content)
    }

    /// Creates a new assistant message.
    pub fn assistant(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::Assistant, content)
    }

    /// Creates a new tool result message.
    ///
    /// # Errors
    ///
    /// Returns an error if the `tool_call_id` or the function name is empty.
    pub fn tool(
        conversation_id: Uuid,
        content: impl Into<String>,
        tool_call_id: String,
        function_name: String,
    ) -> anyhow::Result<Self> {
        if tool_call_id.is_empty() {
            anyhow::bail!("Tool call ID cannot be empty");
        }
        if function_name.is_empty() {
            anyhow::bail!("Function name cannot be empty for tool messages");
        }
        let mut msg = Self::new(conversation_id, MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id);
        msg.name = Some(function_name);
        Ok(msg)
    }

    /// Marks a tool message as reporting a failure.
    #[must_use]
    pub const fn with_error(mut self, is_error: bool) -> Self {
        self.is_error = is_error;
        self
    }

    /// Adds a metadata key-value pair to this message.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Sets the tool calls for this message.
    ///
    /// # Errors
    ///
    /// Returns an error if this message is not an assistant message.
    pub fn with_tool_calls(
        mut self,
        tool_calls: impl Into<SmallVec<[ToolCall; 2]>>,
    ) -> anyhow::Result<Self> {
        if self.role != MessageRole::Assistant {
            anyhow::bail!(
                "Tool calls can only be added to assistant messages, found {:?}",
                self.role
            );
        }
        self.tool_calls = tool_calls.into();
        Ok(self)
    }

    /// Returns `true` if this is an assistant message requesting tool calls.
    #[must_use]
    pub fn requests_tools(&self) -> bool {
        self.role == MessageRole::Assistant && !self.tool_calls.is_empty()
    }
}

/// An append-only thread of messages for a single run.
///
/// The conversation tracks which tool calls are still waiting for a result and
/// refuses tool messages that do not answer one of them, so every tool call is
/// answered at most once.
///
/// ```
/// use basedai_common::chat::{Conversation, Message};
///
/// let mut conv1 = Conversation::new();
/// let conv2 = Conversation::new();
///
/// // Message belongs to conv2, not conv1
/// assert!(conv1.add_message(conv2.user_message("Hello")).is_err());
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    /// Unique identifier for this conversation.
    pub id: Uuid,

    /// When this conversation was created.
    pub created_at: DateTime<Utc>,

    /// When a message was last appended.
    pub updated_at: DateTime<Utc>,

    /// Messages in this conversation, in the order they were appended.
    messages: Vec<Message>,
}

impl Conversation {
    /// Creates a new, empty conversation with a generated ID.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Appends a message to this conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the message belongs to another conversation, or if it
    /// is a tool message whose `tool_call_id` is not pending.
    pub fn add_message(&mut self, message: Message) -> anyhow::Result<()> {
        if message.conversation_id != self.id {
            anyhow::bail!(
                "Message conversation_id {} does not match conversation id {}",
                message.conversation_id,
                self.id
            );
        }

        if message.role == MessageRole::Tool {
            let call_id = message
                .tool_call_id
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Tool message is missing a tool_call_id"))?;
            if !self.pending_tool_call_ids().iter().any(|id| id == call_id) {
                anyhow::bail!("Tool result for '{call_id}' does not answer a pending tool call");
            }
        }

        self.messages.push(message);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Returns the messages in this conversation.
    #[must_use]
    pub fn get_messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the IDs of tool calls that have not received a result yet,
    /// in the order they were requested.
    #[must_use]
    pub fn pending_tool_call_ids(&self) -> Vec<String> {
        let mut pending: Vec<String> = Vec::new();
        for message in &self.messages {
            match message.role {
                MessageRole::Assistant => {
                    pending.extend(message.tool_calls.iter().map(|tc| tc.id.clone()));
                }
                MessageRole::Tool => {
                    if let Some(call_id) = message.tool_call_id.as_deref() {
                        pending.retain(|id| id != call_id);
                    }
                }
                _ => {}
            }
        }
        pending
    }

    /// Returns the most recent assistant message that carries no tool calls.
    #[must_use]
    pub fn last_answer(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant && m.tool_calls.is_empty())
    }

    /// Creates a new user message for this conversation.
    #[must_use]
    pub fn user_message(&self, content: impl Into<String>) -> Message {
        Message::user(self.id, content)
    }

    /// Creates a new assistant message for this conversation.
    #[must_use]
    pub fn assistant_message(&self, content: impl Into<String>) -> Message {
        Message::assistant(self.id, content)
    }

    /// Creates a new system message for this conversation.
    #[must_use]
    pub fn system_message(&self, content: impl Into<String>) -> Message {
        Message::system(self.id, content)
    }

    /// Creates a new tool result message for this conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the `tool_call_id` or function name is empty.
    pub fn tool_message(
        &self,
        content: impl Into<String>,
        tool_call_id: String,
        function_name: String,
    ) -> anyhow::Result<Message> {
        Message::tool(self.id, content, tool_call_id, function_name)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
