//! Lets the model speak to the user through an injectable output sink.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use basedai_common::tools::{ParameterDescriptor, ToolDescriptor, ToolInvocation};

use crate::{ToolImplementation, error_result};

/// Destination for speech rendered by [`SpeakTool`].
pub type SpeakSink = Arc<dyn Fn(&str) + Send + Sync>;

/// The model's sanctioned channel for talking to the user.
pub struct SpeakTool {
    descriptor: ToolDescriptor,
    character_name: String,
    sink: SpeakSink,
}

impl fmt::Debug for SpeakTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeakTool")
            .field("character_name", &self.character_name)
            .finish_non_exhaustive()
    }
}

impl SpeakTool {
    /// Creates a speak tool that prints to stdout.
    pub fn new(character_name: impl Into<String>) -> Self {
        Self::with_sink(character_name, Arc::new(|line: &str| println!("{line}")))
    }

    pub fn with_sink(character_name: impl Into<String>, sink: SpeakSink) -> Self {
        Self {
            descriptor: ToolDescriptor::builder()
                .name("speak_to_user")
                .description("Service tool, used by the agent to talk.")
                .required_parameters(vec![ParameterDescriptor::string(
                    "message",
                    "Message from the agent",
                )])
                .build(),
            character_name: character_name.into(),
            sink,
        }
    }
}

#[async_trait]
impl ToolImplementation for SpeakTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, invocation: &ToolInvocation) -> String {
        let Some(message) = invocation.get_str("message") else {
            return error_result("missing 'message' argument");
        };

        (self.sink)(&format!("{} says: {message}", self.character_name));
        "Message Sent.".to_string()
    }
}
