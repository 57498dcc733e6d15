use thiserror::Error;

/// Failures that stop a run from producing an answer.
///
/// Anything a single tool call does wrong is absorbed into the conversation
/// as an error result; only these reach the caller.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The language model could not be reached or rejected the request.
    #[error("Language model request failed: {0:#}")]
    Port(anyhow::Error),

    /// The model kept requesting tools past the round cap.
    #[error("No final answer after {max_turns} model turns")]
    MaxTurnsExceeded { max_turns: u32 },

    /// The model replied with something that is neither an answer nor tool calls.
    #[error("Unrecognized model response: {0}")]
    UnrecognizedResponse(String),

    /// The conversation transcript rejected a message.
    #[error("Conversation error: {0:#}")]
    Conversation(anyhow::Error),
}

impl CoreError {
    /// Returns `true` for failures attributable to the language model backend.
    #[must_use]
    pub const fn is_port_error(&self) -> bool {
        matches!(
            self,
            Self::Port(_) | Self::MaxTurnsExceeded { .. } | Self::UnrecognizedResponse(_)
        )
    }
}
