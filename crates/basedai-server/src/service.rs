//! The question-answering service behind every front end.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use basedai::{Core, CoreEvent, LLMClient, OpenAIClient, SpeakSink, standard_registry};

use crate::config::AppConfig;
use crate::error::{Result, ServerError};

/// Logs tool activity from a run.
async fn log_event(event: CoreEvent) {
    match event {
        CoreEvent::ToolCall(call) => {
            info!(
                tool = %call.function.name,
                call_id = %call.id,
                arguments = %call.function.arguments,
                "Tool call"
            );
        }
        CoreEvent::ToolResult {
            name,
            call_id,
            result,
            is_error: true,
        } => {
            warn!(tool = %name, call_id = %call_id, result = %result, "Tool call failed");
        }
        CoreEvent::ToolResult { name, call_id, .. } => {
            info!(tool = %name, call_id = %call_id, "Tool call finished");
        }
        CoreEvent::Usage(usage) => {
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Model usage"
            );
        }
    }
}

/// Speak sink for the HTTP service: speech goes to the log, never to stdout.
#[must_use]
pub fn log_speak_sink() -> SpeakSink {
    Arc::new(|line: &str| info!(target: "basedai_server::speak", "{line}"))
}

/// Whether `model` appears in a backend's model listing. Ollama lists
/// untagged models with an explicit `:latest` tag.
fn model_is_listed(listed: &[String], model: &str) -> bool {
    listed
        .iter()
        .any(|id| id == model || id.strip_suffix(":latest") == Some(model))
}

/// Answers questions by running the orchestration loop.
///
/// Cheap to share behind an `Arc`; every call to [`QueryService::answer`] is
/// an independent run.
pub struct QueryService<C: LLMClient> {
    core: Core<C>,
}

impl QueryService<OpenAIClient> {
    /// Builds the service described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model client or the tool registry cannot be built.
    pub fn from_config(config: &AppConfig, speak_sink: Option<SpeakSink>) -> Result<Self> {
        let client = OpenAIClient::new(config.client_config())?;
        let registry = standard_registry(&config.tool_settings(), speak_sink)?;
        info!(
            model = %config.model.model,
            tools = ?registry.tool_names(),
            "Query service ready"
        );

        let core = Core::new(client, registry)
            .with_system_prompt(config.prompting.system_prompt.clone())
            .with_max_turns(config.settings.max_turns)
            .with_tool_timeout(config.tool_timeout())
            .with_event_callback(log_event);

        Ok(Self::new(core))
    }

    /// Confirms the configured model is served by the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the backend cannot list its models
    /// or does not serve the configured one.
    pub async fn check_model(&self) -> Result<()> {
        let model = &self.core.client.config().model;
        let listed = self
            .core
            .client
            .list_models()
            .await
            .map_err(|e| ServerError::Config(format!("could not list models: {e:#}")))?;

        if !model_is_listed(&listed, model) {
            return Err(ServerError::Config(format!(
                "model '{model}' is not available on the backend (available: {})",
                listed.join(", ")
            )));
        }
        info!(model = %model, "Model is available");
        Ok(())
    }
}

impl<C: LLMClient> QueryService<C> {
    pub const fn new(core: Core<C>) -> Self {
        Self { core }
    }

    /// Answers one question.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::EmptyQuestion`] for a blank question, and
    /// [`ServerError::Core`] when the run cannot produce an answer.
    #[instrument(skip(self, question), fields(question_len = question.len()))]
    pub async fn answer(&self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ServerError::EmptyQuestion);
        }

        let answer = self.core.run(question).await?;
        info!(answer_len = answer.len(), "Answered question");
        Ok(answer)
    }
}
