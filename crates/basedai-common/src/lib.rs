//! # basedai-common
//!
//! Common types shared by the basedai crates.
//!
//! - Conversation and message management
//! - Tool descriptors, argument validation and tool-call wire types
//! - Chat request/response types exchanged with the language model
//!
//! ## Example
//!
//! ```
//! use basedai_common::{Conversation, ParameterDescriptor, ToolDescriptor};
//!
//! let conv = Conversation::new();
//! let msg = conv.user_message("What time is it in Tokyo?");
//! assert_eq!(msg.conversation_id, conv.id);
//!
//! let descriptor = ToolDescriptor::builder()
//!     .name("get_date_time")
//!     .description("Get the current date and time for a location")
//!     .optional_parameters(vec![ParameterDescriptor::string("location", "City or IANA zone")])
//!     .build();
//! let tool = descriptor.to_tool();
//! assert_eq!(tool.function.name, "get_date_time");
//! ```

/// Chat conversation and message types.
pub mod chat;
/// Client configuration and request/response types.
pub mod client;
/// Tool descriptors, validation and tool-call types.
pub mod tools;

pub use chat::{Conversation, Message, MessageRole};
pub use client::{
    ChatRequest, ChatResponse, Config, FinishReason, ModelTurn, RetryConfig, ToolChoice, Usage,
};
pub use tools::{
    Function, FunctionCall, ParameterDescriptor, ParameterType, Parameters, Property, Tool,
    ToolCall, ToolDescriptor, ToolInvocation, ValidationError,
};
