//! Event types for Core orchestration
//!
//! Events are **observability**: fire-and-forget notifications about what a run
//! is doing. Core awaits the callback but never reacts to it, so a slow
//! callback delays the run without changing its outcome.

use std::future::Future;
use std::pin::Pin;

use basedai_common::client::Usage;
use basedai_common::tools::ToolCall;

/// Events emitted by Core during a run.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// The model requested a tool; emitted before the batch executes.
    ToolCall(ToolCall),

    /// A tool call finished and its result was appended to the conversation.
    ToolResult {
        /// ID of the call this result answers
        call_id: String,
        /// Name of the tool that was requested
        name: String,
        /// Result text handed back to the model
        result: String,
        /// Whether the result is an error
        is_error: bool,
    },

    /// Token usage reported with a model response
    Usage(Usage),
}

/// Async callback for receiving Core events
pub type EventCallback =
    Box<dyn Fn(CoreEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
