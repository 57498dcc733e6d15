use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::future::join_all;
use log::{debug, info, warn};
use uuid::Uuid;

use basedai_client::{ClientError, LLMClient};
use basedai_common::chat::{Conversation, Message};
use basedai_common::client::{ChatRequest, ChatResponse, ModelTurn, ToolChoice};
use basedai_common::tools::ToolCall;
use basedai_tools::{ToolRegistry, error_result, is_error_result};

use crate::error::CoreError;
use crate::events::{CoreEvent, EventCallback};

pub const DEFAULT_MAX_TURNS: u32 = 10;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a run is in its model/tool cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The next step is a request to the model.
    AwaitingModel,
    /// The model asked for tools; their results are still owed.
    ExecutingTools,
    /// The model answered; the run is over.
    Finished,
}

/// State owned by a single run.
#[derive(Debug)]
struct RunState {
    conversation: Conversation,
    pending_calls: Vec<ToolCall>,
    phase: Phase,
    turns: u32,
}

impl RunState {
    fn new(system_prompt: Option<&str>, question: &str) -> Result<Self, CoreError> {
        let mut conversation = Conversation::new();
        if let Some(prompt) = system_prompt {
            let message = conversation.system_message(prompt);
            conversation
                .add_message(message)
                .map_err(CoreError::Conversation)?;
        }
        let message = conversation.user_message(question);
        conversation
            .add_message(message)
            .map_err(CoreError::Conversation)?;

        Ok(Self {
            conversation,
            pending_calls: Vec::new(),
            phase: Phase::AwaitingModel,
            turns: 0,
        })
    }
}

/// What one tool call produced.
struct ToolOutcome {
    text: String,
    is_error: bool,
}

impl ToolOutcome {
    fn failure(message: impl std::fmt::Display) -> Self {
        Self {
            text: error_result(message),
            is_error: true,
        }
    }
}

/// The orchestration loop: asks the model, runs the tools it requests, feeds
/// the results back, and repeats until the model answers.
///
/// `Core` holds no per-run state, so one instance can serve many concurrent
/// runs against the same client and registry.
pub struct Core<C: LLMClient> {
    pub client: C,
    pub registry: ToolRegistry,
    /// Maximum model requests per run before giving up.
    pub max_turns: u32,
    /// Budget for a single tool execution.
    pub tool_timeout: Duration,
    pub tool_choice: ToolChoice,
    /// Seeded ahead of the question in every run.
    pub system_prompt: Option<String>,
    pub event_callback: Option<EventCallback>,
}

impl<C: LLMClient> Core<C> {
    pub fn new(client: C, registry: ToolRegistry) -> Self {
        Self {
            client,
            registry,
            max_turns: DEFAULT_MAX_TURNS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            tool_choice: ToolChoice::Auto,
            system_prompt: None,
            event_callback: None,
        }
    }

    #[must_use]
    pub const fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    #[must_use]
    pub const fn with_tool_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_event_callback<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(CoreEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.event_callback = Some(Box::new(move |event| Box::pin(callback(event))));
        self
    }

    async fn emit(&self, event: CoreEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event).await;
        }
    }

    /// Answers a question, returning the text of the model's final message.
    ///
    /// # Errors
    ///
    /// See [`Core::run_conversation`].
    pub async fn run(&self, question: &str) -> Result<String, CoreError> {
        let conversation = self.run_conversation(question).await?;
        conversation
            .last_answer()
            .map(|m| m.content.clone())
            .ok_or_else(|| CoreError::UnrecognizedResponse("run ended without an answer".into()))
    }

    /// Answers a question, returning the full transcript of the run.
    ///
    /// Dropping the returned future cancels any tool calls still in flight.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Port`] if the model cannot be reached,
    /// [`CoreError::MaxTurnsExceeded`] if it never stops requesting tools, and
    /// [`CoreError::UnrecognizedResponse`] if it replies with a non-assistant
    /// message. Tool failures never surface here.
    pub async fn run_conversation(&self, question: &str) -> Result<Conversation, CoreError> {
        let start = Instant::now();
        let mut state = RunState::new(self.system_prompt.as_deref(), question)?;

        loop {
            match state.phase {
                Phase::AwaitingModel => self.await_model(&mut state).await?,
                Phase::ExecutingTools => self.execute_tools(&mut state).await?,
                Phase::Finished => {
                    debug!(
                        "Run finished in {} turn(s) ({:.2?})",
                        state.turns,
                        start.elapsed()
                    );
                    return Ok(state.conversation);
                }
            }
        }
    }

    async fn await_model(&self, state: &mut RunState) -> Result<(), CoreError> {
        if state.turns >= self.max_turns {
            return Err(CoreError::MaxTurnsExceeded {
                max_turns: self.max_turns,
            });
        }
        state.turns += 1;
        info!("Executing chat turn ({}/{})", state.turns, self.max_turns);

        let messages: Arc<[Message]> = Arc::from(state.conversation.get_messages());
        let request = ChatRequest::from((self.client.config(), messages))
            .with_tools(self.registry.get_all_definitions())
            .with_tool_choice(self.tool_choice.clone());
        debug!("Chat request: {request}");

        let response = self
            .chat_with_retry(&request)
            .await
            .map_err(CoreError::Port)?;
        if let Some(usage) = response.usage.clone() {
            self.emit(CoreEvent::Usage(usage)).await;
        }

        let turn = response
            .into_turn()
            .map_err(|e| CoreError::UnrecognizedResponse(e.to_string()))?;

        match turn {
            ModelTurn::Answer(message) => {
                debug!("Model answered without tool calls");
                state
                    .conversation
                    .add_message(message)
                    .map_err(CoreError::Conversation)?;
                state.phase = Phase::Finished;
            }
            ModelTurn::ToolCalls(_) if state.turns >= self.max_turns => {
                // No turn is left to hand the results back, so the batch is not run.
                warn!("Model requested tools on its final turn ({})", self.max_turns);
                return Err(CoreError::MaxTurnsExceeded {
                    max_turns: self.max_turns,
                });
            }
            ModelTurn::ToolCalls(mut message) => {
                normalize_call_ids(&mut message);
                debug!("Model requested {} tool call(s)", message.tool_calls.len());
                state.pending_calls = message.tool_calls.to_vec();
                state
                    .conversation
                    .add_message(message)
                    .map_err(CoreError::Conversation)?;
                state.phase = Phase::ExecutingTools;
            }
        }
        Ok(())
    }

    async fn execute_tools(&self, state: &mut RunState) -> Result<(), CoreError> {
        let calls = std::mem::take(&mut state.pending_calls);
        for call in &calls {
            self.emit(CoreEvent::ToolCall(call.clone())).await;
        }

        // Sibling calls are independent; results are appended in request order.
        let outcomes = join_all(calls.iter().map(|call| self.run_tool(call))).await;

        for (call, outcome) in calls.iter().zip(outcomes) {
            let name = if call.function.name.trim().is_empty() {
                "unknown".to_string()
            } else {
                call.function.name.clone()
            };
            self.emit(CoreEvent::ToolResult {
                call_id: call.id.clone(),
                name: name.clone(),
                result: outcome.text.clone(),
                is_error: outcome.is_error,
            })
            .await;

            let message = state
                .conversation
                .tool_message(outcome.text, call.id.clone(), name)
                .map_err(CoreError::Conversation)?
                .with_error(outcome.is_error);
            state
                .conversation
                .add_message(message)
                .map_err(CoreError::Conversation)?;
        }

        let unanswered = state.conversation.pending_tool_call_ids();
        if !unanswered.is_empty() {
            return Err(CoreError::Conversation(anyhow::anyhow!(
                "tool calls left without results: {}",
                unanswered.join(", ")
            )));
        }

        state.phase = Phase::AwaitingModel;
        Ok(())
    }

    /// Resolves, validates and executes one call. Never fails.
    async fn run_tool(&self, call: &ToolCall) -> ToolOutcome {
        let name = call.function.name.as_str();

        let tool = match self.registry.resolve(name) {
            Ok(tool) => tool,
            Err(e) => {
                warn!("Model requested unknown tool '{name}'");
                return ToolOutcome::failure(e);
            }
        };

        let invocation = match tool.validate(call.function.arguments_json()) {
            Ok(invocation) => invocation,
            Err(e) => {
                debug!("Rejected arguments for '{name}': {e}");
                return ToolOutcome::failure(format!("invalid arguments for '{name}': {e}"));
            }
        };

        debug!("Executing tool: {name} (id: {})", call.id);
        match tokio::time::timeout(self.tool_timeout, tool.execute(&invocation)).await {
            Ok(text) => {
                let is_error = is_error_result(&text);
                ToolOutcome { text, is_error }
            }
            Err(_) => {
                warn!("Tool '{name}' timed out after {:?}", self.tool_timeout);
                ToolOutcome::failure(format!(
                    "tool '{name}' timed out after {} seconds",
                    self.tool_timeout.as_secs_f64()
                ))
            }
        }
    }

    /// Send a chat request, retrying transient failures with a fixed delay.
    async fn chat_with_retry(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let retry = &self.client.config().retry_config;
        let mut attempt = 0;

        loop {
            match self.client.chat(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let retryable = e
                        .downcast_ref::<ClientError>()
                        .is_some_and(ClientError::is_retryable);
                    if !retryable || attempt >= retry.max_retries {
                        return Err(e);
                    }
                    attempt += 1;
                    debug!(
                        "Request failed (attempt {attempt}), retrying in {:?}: {e}",
                        retry.initial_delay
                    );
                    tokio::time::sleep(retry.initial_delay).await;
                }
            }
        }
    }
}

/// Gives every call in the batch a unique, non-empty ID.
fn normalize_call_ids(message: &mut Message) {
    let mut seen = HashSet::new();
    for call in &mut message.tool_calls {
        if call.id.trim().is_empty() || !seen.insert(call.id.clone()) {
            call.id = format!("call_{}", Uuid::new_v4().simple());
            seen.insert(call.id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use basedai_common::chat::MessageRole;
    use basedai_common::client::{Config, RetryConfig, Usage};
    use basedai_common::tools::{ParameterDescriptor, ToolDescriptor, ToolInvocation};
    use basedai_tools::{DateTimeTool, ToolImplementation};

    use super::*;

    enum Reply {
        Answer(&'static str),
        Calls(Vec<ToolCall>),
        Role(MessageRole),
        Fail(ClientError),
    }

    /// Replays a fixed script of model replies and records every request.
    struct ScriptedClient {
        config: Config,
        script: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedClient {
        fn new(script: Vec<Reply>) -> Self {
            let retry = RetryConfig {
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
                ..RetryConfig::default()
            };
            Self {
                config: Config::new("mock", "mock-model").with_retry_config(retry),
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        fn config(&self) -> &Config {
            &self.config
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
            self.requests.lock().unwrap().push(request.messages.to_vec());
            let conversation_id = request.messages[0].conversation_id;
            let reply = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Reply::Answer("script exhausted"));

            let message = match reply {
                Reply::Answer(text) => Message::assistant(conversation_id, text),
                Reply::Calls(calls) => Message::assistant(conversation_id, "")
                    .with_tool_calls(calls)
                    .unwrap(),
                Reply::Role(role) => Message::new(conversation_id, role, "odd"),
                Reply::Fail(e) => return Err(e.into()),
            };

            Ok(ChatResponse {
                message,
                model: "mock-model".to_string(),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                finish_reason: None,
                created_at: chrono::Utc::now(),
                response_id: None,
            })
        }

        fn supports_tools(&self) -> bool {
            true
        }
    }

    /// Sleeps, then reports its own label.
    struct SleepyTool {
        descriptor: ToolDescriptor,
        delay: Duration,
        executions: Arc<AtomicUsize>,
    }

    impl SleepyTool {
        fn new(name: &str, delay: Duration) -> Self {
            Self {
                descriptor: ToolDescriptor::builder()
                    .name(name)
                    .description("Waits and echoes a label")
                    .required_parameters(vec![ParameterDescriptor::string("label", "Label")])
                    .build(),
                delay,
                executions: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ToolImplementation for SleepyTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(&self, invocation: &ToolInvocation) -> String {
            self.executions.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            format!("done: {}", invocation.get_str("label").unwrap_or_default())
        }
    }

    fn call(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall::with_id(id, name, args)
    }

    fn tool_results(conversation: &Conversation) -> Vec<&Message> {
        conversation
            .get_messages()
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .collect()
    }

    #[tokio::test]
    async fn test_direct_answer_takes_one_turn() {
        let client = ScriptedClient::new(vec![Reply::Answer("Four")]);
        let core = Core::new(client, ToolRegistry::new());

        let answer = core.run("What is 2+2 in plain words").await.unwrap();

        assert_eq!(answer, "Four");
        assert_eq!(core.client.request_count(), 1);
    }

    #[tokio::test]
    async fn test_date_time_round_trip() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(DateTimeTool::new())).unwrap();
        let client = ScriptedClient::new(vec![
            Reply::Calls(vec![call("c1", "get_date_time", r#"{"location": "Paris"}"#)]),
            Reply::Answer("It is evening in Paris."),
        ]);
        let core = Core::new(client, registry);

        let conversation = core.run_conversation("What time is it in Paris?").await.unwrap();

        let results = tool_results(&conversation);
        assert_eq!(results.len(), 1);
        assert!(results[0].content.ends_with("in Europe/Paris timezone"));
        assert_eq!(results[0].tool_call_id.as_deref(), Some("c1"));
        assert!(!results[0].is_error);
        assert_eq!(
            conversation.last_answer().unwrap().content,
            "It is evening in Paris."
        );

        let requests = core.client.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].last().unwrap().role, MessageRole::Tool);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_result() {
        let client = ScriptedClient::new(vec![
            Reply::Calls(vec![call("c1", "teleport", "{}")]),
            Reply::Answer("Sorry, I cannot do that."),
        ]);
        let core = Core::new(client, ToolRegistry::new());

        let conversation = core.run_conversation("Beam me up").await.unwrap();

        let results = tool_results(&conversation);
        assert!(results[0].is_error);
        assert_eq!(results[0].content, "Error: tool 'teleport' not found");
        assert_eq!(
            conversation.last_answer().unwrap().content,
            "Sorry, I cannot do that."
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments_skip_execution() {
        let tool = SleepyTool::new("sleepy", Duration::ZERO);
        let executions = Arc::clone(&tool.executions);
        let registry = ToolRegistry::new();
        registry.register(Arc::new(tool)).unwrap();

        let client = ScriptedClient::new(vec![
            Reply::Calls(vec![call("c1", "sleepy", r#"{"label": 7}"#)]),
            Reply::Answer("ok"),
        ]);
        let core = Core::new(client, registry);

        let conversation = core.run_conversation("go").await.unwrap();

        let results = tool_results(&conversation);
        assert!(results[0].is_error);
        assert!(results[0].content.starts_with("Error: invalid arguments for 'sleepy'"));
        assert!(results[0].content.contains("label"));
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_results_follow_request_order() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(SleepyTool::new("slow", Duration::from_millis(50))))
            .unwrap();
        registry
            .register(Arc::new(SleepyTool::new("fast", Duration::ZERO)))
            .unwrap();

        let client = ScriptedClient::new(vec![
            Reply::Calls(vec![
                call("a", "slow", r#"{"label": "first"}"#),
                call("b", "fast", r#"{"label": "second"}"#),
            ]),
            Reply::Answer("both done"),
        ]);
        let core = Core::new(client, registry);

        let conversation = core.run_conversation("go").await.unwrap();

        let results: Vec<(&str, &str)> = tool_results(&conversation)
            .iter()
            .map(|m| (m.tool_call_id.as_deref().unwrap(), m.content.as_str()))
            .collect();
        assert_eq!(results, vec![("a", "done: first"), ("b", "done: second")]);
    }

    #[tokio::test]
    async fn test_tool_timeout_becomes_error_result() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(SleepyTool::new("slow", Duration::from_secs(5))))
            .unwrap();
        let client = ScriptedClient::new(vec![
            Reply::Calls(vec![call("c1", "slow", r#"{"label": "x"}"#)]),
            Reply::Answer("gave up waiting"),
        ]);
        let core = Core::new(client, registry).with_tool_timeout(Duration::from_millis(20));

        let conversation = core.run_conversation("go").await.unwrap();

        let results = tool_results(&conversation);
        assert!(results[0].is_error);
        assert!(results[0].content.starts_with("Error: tool 'slow' timed out"));
    }

    #[tokio::test]
    async fn test_round_cap_stops_endless_tool_requests() {
        let script = (0..5)
            .map(|i| Reply::Calls(vec![call(&format!("c{i}"), "missing", "{}")]))
            .collect();
        let core = Core::new(ScriptedClient::new(script), ToolRegistry::new()).with_max_turns(3);

        let err = core.run("loop forever").await.unwrap_err();

        assert!(matches!(err, CoreError::MaxTurnsExceeded { max_turns: 3 }));
        assert!(err.is_port_error());
        assert_eq!(core.client.request_count(), 3);
    }

    #[tokio::test]
    async fn test_tools_requested_on_final_turn_are_not_run() {
        let tool = SleepyTool::new("sleepy", Duration::ZERO);
        let executions = Arc::clone(&tool.executions);
        let registry = ToolRegistry::new();
        registry.register(Arc::new(tool)).unwrap();

        let client = ScriptedClient::new(vec![
            Reply::Calls(vec![call("c1", "sleepy", r#"{"label": "one"}"#)]),
            Reply::Calls(vec![call("c2", "sleepy", r#"{"label": "two"}"#)]),
        ]);
        let core = Core::new(client, registry).with_max_turns(2);

        let err = core.run("go").await.unwrap_err();

        assert!(matches!(err, CoreError::MaxTurnsExceeded { max_turns: 2 }));
        assert_eq!(core.client.request_count(), 2);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_port_failure_surfaces() {
        let client = ScriptedClient::new(vec![Reply::Fail(ClientError::AuthenticationError(
            "bad key".into(),
        ))]);
        let core = Core::new(client, ToolRegistry::new());

        let err = core.run("hello").await.unwrap_err();

        assert!(matches!(err, CoreError::Port(_)));
        assert_eq!(core.client.request_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let client = ScriptedClient::new(vec![
            Reply::Fail(ClientError::ServiceUnavailable("502".into())),
            Reply::Answer("recovered"),
        ]);
        let core = Core::new(client, ToolRegistry::new());

        assert_eq!(core.run("hello").await.unwrap(), "recovered");
        assert_eq!(core.client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_non_assistant_reply_is_unrecognized() {
        let client = ScriptedClient::new(vec![Reply::Role(MessageRole::User)]);
        let core = Core::new(client, ToolRegistry::new());

        let err = core.run("hello").await.unwrap_err();
        assert!(matches!(err, CoreError::UnrecognizedResponse(_)));
    }

    #[tokio::test]
    async fn test_system_prompt_leads_the_conversation() {
        let client = ScriptedClient::new(vec![Reply::Answer("hi")]);
        let core = Core::new(client, ToolRegistry::new()).with_system_prompt("Be brief.");

        core.run("hello").await.unwrap();

        let requests = core.client.requests.lock().unwrap();
        let roles: Vec<MessageRole> = requests[0].iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![MessageRole::System, MessageRole::User]);
        assert_eq!(requests[0][0].content, "Be brief.");
    }

    #[tokio::test]
    async fn test_duplicate_and_empty_call_ids_are_replaced() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(SleepyTool::new("fast", Duration::ZERO)))
            .unwrap();
        let client = ScriptedClient::new(vec![
            Reply::Calls(vec![
                call("dup", "fast", r#"{"label": "1"}"#),
                call("dup", "fast", r#"{"label": "2"}"#),
                call("", "fast", r#"{"label": "3"}"#),
            ]),
            Reply::Answer("done"),
        ]);
        let core = Core::new(client, registry);

        let conversation = core.run_conversation("go").await.unwrap();

        let ids: HashSet<String> = tool_results(&conversation)
            .iter()
            .map(|m| m.tool_call_id.clone().unwrap())
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("dup"));
        assert!(conversation.pending_tool_call_ids().is_empty());
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let client = ScriptedClient::new(vec![
            Reply::Calls(vec![call("c1", "missing", "{}")]),
            Reply::Answer("done"),
        ]);
        let core = Core::new(client, ToolRegistry::new()).with_event_callback(move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(event);
            }
        });

        core.run("go").await.unwrap();

        let events = events.lock().unwrap();
        let tool_calls = events
            .iter()
            .filter(|e| matches!(e, CoreEvent::ToolCall(c) if c.id == "c1"))
            .count();
        let failed_results = events
            .iter()
            .filter(|e| matches!(e, CoreEvent::ToolResult { is_error: true, .. }))
            .count();
        let usage = events
            .iter()
            .filter(|e| matches!(e, CoreEvent::Usage(_)))
            .count();
        assert_eq!((tool_calls, failed_results, usage), (1, 1, 2));
    }
}
