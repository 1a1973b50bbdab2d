//! The conversation orchestrator: one user turn through to a final answer.
//!
//! A turn is a sequence of rounds:
//!
//! 1. **Request** the whole log plus the enabled tool schemas
//! 2. **Stream** (or await) the response and fold it into one result
//! 3. **Dispatch** any requested tool calls, one at a time, in order
//! 4. Loop back to 1 with the tool results, or finish on plain content
//!
//! A round's assistant message and tool results are staged and only enter
//! the log once every tool in the round has answered. A failed or cancelled
//! round leaves the log as it was before that round began. The user message
//! is dropped only when no round was committed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use lightzai_core::completion::{AggregatedResult, Usage};
use lightzai_core::error::{Error, Result, TransportError};
use lightzai_core::event::{EventSink, StreamEvent, TurnState};
use lightzai_core::message::{Message, MessageLog};
use lightzai_core::transport::{ChatRequest, ToolSchema, Transport, TransportResponse};
use lightzai_providers::{StreamFolder, from_completion};
use lightzai_tools::ToolDispatcher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::history;
use crate::prompt;

/// Rounds allowed per turn before the loop is declared runaway.
pub const DEFAULT_MAX_ROUNDS: u32 = 25;

/// Per-request and per-chunk idle timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

/// Owns one conversation and drives its turns.
pub struct Orchestrator {
    transport: Arc<dyn Transport>,
    dispatcher: Arc<ToolDispatcher>,
    model: String,
    max_tokens: Option<u32>,
    temperature: f32,
    streaming: bool,
    thinking: bool,
    max_rounds: u32,
    max_history: Option<usize>,
    request_timeout: Duration,
    persona: String,
    /// Tool availability the current system message was built for.
    prompt_tools: Option<bool>,
    log: MessageLog,
    state: TurnState,
    last_usage: Option<Usage>,
    last_web_search: Option<serde_json::Value>,
    session_id: Uuid,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn Transport>, dispatcher: Arc<ToolDispatcher>, model: impl Into<String>) -> Self {
        Self {
            transport,
            dispatcher,
            model: model.into(),
            max_tokens: None,
            temperature: 0.7,
            streaming: true,
            thinking: false,
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_history: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            persona: prompt::DEFAULT_PERSONA.to_string(),
            prompt_tools: None,
            log: MessageLog::new(),
            state: TurnState::Idle,
            last_usage: None,
            last_web_search: None,
            session_id: Uuid::new_v4(),
        }
    }

    /// Set the round cap. Zero is treated as one.
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_thinking(mut self, thinking: bool) -> Self {
        self.thinking = thinking;
        self
    }

    /// Trim the log to this many messages after every turn.
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = Some(max_history);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_system_prompt(mut self, persona: impl Into<String>) -> Self {
        self.set_system_prompt(persona);
        self
    }

    /// Replace the persona. The system message is rebuilt on the next turn.
    pub fn set_system_prompt(&mut self, persona: impl Into<String>) {
        self.persona = persona.into();
        self.prompt_tools = None;
    }

    pub fn messages(&self) -> &[Message] {
        self.log.as_slice()
    }

    pub fn last_usage(&self) -> Option<&Usage> {
        self.last_usage.as_ref()
    }

    pub fn last_web_search(&self) -> Option<&serde_json::Value> {
        self.last_web_search.as_ref()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Forget the conversation, keeping the system message.
    pub fn clear(&mut self) {
        self.log.clear();
        self.state = TurnState::Idle;
        info!(session = %self.session_id, "Conversation cleared");
    }

    /// Keep the system message plus the newest `max - 1` messages.
    pub fn trim_history(&mut self, max: usize) {
        if self.log.len() > max {
            let trimmed = history::trim_history(self.log.as_slice(), max);
            debug!(before = self.log.len(), after = trimmed.len(), "Trimmed history");
            self.log.replace(trimmed);
        }
    }

    /// Run one user turn to completion and return the final answer.
    ///
    /// Events for the turn go to `sink`. Cancelling `cancel` aborts the
    /// in-flight request and skips any tool calls not yet started.
    pub async fn run_turn(
        &mut self,
        user_text: &str,
        tools_enabled: bool,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.refresh_system_prompt(tools_enabled);

        let checkpoint = self.log.len();
        self.log.push(Message::user(user_text));
        info!(
            session = %self.session_id,
            messages = self.log.len(),
            tools_enabled,
            streaming = self.streaming,
            "Starting turn"
        );

        let mut committed = 0;
        let outcome = self.run_rounds(tools_enabled, sink, cancel, &mut committed).await;

        match outcome {
            Ok(answer) => {
                self.apply_history_limit();
                Ok(answer)
            }
            Err(Error::Cancelled) => {
                if committed == 0 {
                    self.log.truncate(checkpoint);
                } else {
                    self.apply_history_limit();
                }
                info!(session = %self.session_id, committed, "Turn cancelled");
                self.set_state(TurnState::Idle, sink);
                Err(Error::Cancelled)
            }
            Err(e) => {
                if committed == 0 {
                    self.log.truncate(checkpoint);
                }
                warn!(session = %self.session_id, error = %e, committed, "Turn failed, uncommitted round discarded");
                self.set_state(TurnState::Idle, sink);
                Err(e)
            }
        }
    }

    async fn run_rounds(
        &mut self,
        tools_enabled: bool,
        sink: &EventSink,
        cancel: &CancellationToken,
        committed: &mut u32,
    ) -> Result<String> {
        let tools = if tools_enabled {
            Some(self.dispatcher.schemas()).filter(|schemas| !schemas.is_empty())
        } else {
            None
        };
        let mut tool_calls_made = 0;

        for round in 1..=self.max_rounds {
            let result = self.request_round(round, tools.clone(), sink, cancel).await?;
            if result.usage.is_some() {
                self.last_usage = result.usage.clone();
            }
            if result.web_search.is_some() {
                self.last_web_search = result.web_search.clone();
            }

            let Some(calls) = result.tool_calls else {
                self.log.push(Message::assistant(result.content.clone()));
                info!(session = %self.session_id, rounds = round, tool_calls_made, "Turn completed");
                sink.emit(StreamEvent::Done {
                    rounds: round,
                    tool_calls_made,
                    usage: self.last_usage.clone(),
                });
                return Ok(result.content);
            };

            if round == self.max_rounds {
                warn!(session = %self.session_id, limit = self.max_rounds, "Round limit reached with tool calls pending");
                break;
            }

            self.set_state(TurnState::Dispatching, sink);
            debug!(round, tool_count = calls.len(), "Dispatching tool calls");

            let mut staged = Vec::with_capacity(calls.len() + 1);
            staged.push(Message::assistant_tool_calls(result.content, calls.clone()));

            for call in &calls {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                sink.emit(StreamEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                });

                let outcome = self
                    .dispatcher
                    .dispatch(&call.function.name, &call.function.arguments)
                    .await;
                let content = outcome.to_content();
                tool_calls_made += 1;

                sink.emit(StreamEvent::ToolResult {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    success: outcome.success,
                    content: content.clone(),
                });
                staged.push(Message::tool_result(&call.id, content));
            }

            self.log.extend(staged);
            *committed += 1;
        }

        Err(Error::RoundLimitExceeded { limit: self.max_rounds })
    }

    /// Send the log and fold the response into one round result.
    async fn request_round(
        &mut self,
        round: u32,
        tools: Option<Vec<ToolSchema>>,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<AggregatedResult> {
        self.set_state(TurnState::Requesting, sink);
        debug!(session = %self.session_id, round, messages = self.log.len(), "Requesting round");

        let mut request = ChatRequest::new(&self.model, self.log.as_slice().to_vec());
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;
        request.stream = self.streaming;
        request.tools = tools;
        request.thinking = self.thinking.then(|| serde_json::json!({"type": "enabled"}));

        if !self.streaming {
            self.set_state(TurnState::Awaiting, sink);
        }

        let timeout = self.request_timeout;
        let transport = Arc::clone(&self.transport);
        let response = guarded(timeout, cancel, "request", transport.send(request)).await??;

        let result = match response {
            TransportResponse::Stream(mut stream) => {
                self.set_state(TurnState::Streaming, sink);
                let mut folder = StreamFolder::new(round, sink.clone());
                while let Some(chunk) = guarded(timeout, cancel, "stream chunk", stream.next()).await? {
                    if folder.feed(&chunk?) {
                        break;
                    }
                }
                folder.finish()
            }
            TransportResponse::Complete(value) => {
                let result = from_completion(value)?;
                sink.emit(StreamEvent::RoundCompleted {
                    round,
                    result: result.clone(),
                });
                result
            }
        };

        self.set_state(TurnState::Completed, sink);
        Ok(result)
    }

    fn set_state(&mut self, state: TurnState, sink: &EventSink) {
        if self.state != state {
            self.state = state;
            sink.emit(StreamEvent::StateChanged { state });
        }
    }

    fn refresh_system_prompt(&mut self, tools_enabled: bool) {
        if self.prompt_tools == Some(tools_enabled) && self.log.system().is_some() {
            return;
        }
        let names = if tools_enabled { self.dispatcher.tool_names() } else { Vec::new() };
        self.log.set_system(prompt::system_prompt(&self.persona, &names));
        self.prompt_tools = Some(tools_enabled);
    }

    fn apply_history_limit(&mut self) {
        if let Some(max) = self.max_history {
            self.trim_history(max);
        }
    }
}

/// Await `future` unless it times out or the turn is cancelled first.
async fn guarded<F: Future>(
    limit: Duration,
    cancel: &CancellationToken,
    what: &str,
    future: F,
) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        outcome = tokio::time::timeout(limit, future) => outcome.map_err(|_| {
            Error::Transport(TransportError::Timeout(format!(
                "no {what} within {}s",
                limit.as_secs()
            )))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use lightzai_core::error::ToolError;
    use lightzai_core::message::Role;
    use lightzai_core::tool::{Tool, ToolRegistry, ToolResult};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Step {
        Sse(String),
        Json(serde_json::Value),
        Fail(TransportError),
        Hang,
    }

    /// Replays a fixed script of responses and records every request.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Step>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(steps.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, request: ChatRequest) -> std::result::Result<TransportResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Step::Sse(text)) => {
                    // Small chunks so frames straddle chunk boundaries.
                    let chunks: Vec<_> = text
                        .into_bytes()
                        .chunks(7)
                        .map(|c| Ok(Bytes::copy_from_slice(c)))
                        .collect();
                    Ok(TransportResponse::Stream(Box::pin(futures::stream::iter(chunks))))
                }
                Some(Step::Json(value)) => Ok(TransportResponse::Complete(value)),
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Hang) => std::future::pending::<std::result::Result<TransportResponse, TransportError>>().await,
                None => Err(TransportError::InvalidResponse("script exhausted".into())),
            }
        }
    }

    fn frame(value: serde_json::Value) -> String {
        format!("data: {value}\n\n")
    }

    fn content_sse(text: &str) -> String {
        let mut body = frame(serde_json::json!({"choices": [{"delta": {"content": text}}]}));
        body.push_str(&frame(serde_json::json!({
            "choices": [{"delta": {}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        })));
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn tool_sse(calls: &[(&str, &str, &str)]) -> String {
        let mut body = String::new();
        for (index, (id, name, arguments)) in calls.iter().enumerate() {
            body.push_str(&frame(serde_json::json!({"choices": [{"delta": {"tool_calls": [
                {"index": index, "id": id, "function": {"name": name}}
            ]}}]})));
            body.push_str(&frame(serde_json::json!({"choices": [{"delta": {"tool_calls": [
                {"index": index, "function": {"arguments": arguments}}
            ]}}]})));
        }
        body.push_str(&frame(serde_json::json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]})));
        body.push_str("data: [DONE]\n\n");
        body
    }

    /// Logs `start:<tag>` and `end:<tag>` around a short sleep.
    struct Recorder {
        trace: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for Recorder {
        fn name(&self) -> &str {
            "record"
        }
        fn description(&self) -> &str {
            "Record a tag"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"tag": {"type": "string"}}})
        }
        async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            let tag = arguments["tag"].as_str().unwrap_or("?").to_string();
            self.trace.lock().unwrap().push(format!("start:{tag}"));
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.trace.lock().unwrap().push(format!("end:{tag}"));
            Ok(ToolResult::output(format!("recorded {tag}")))
        }
    }

    /// Cancels the turn from inside a tool call.
    struct Canceller {
        token: CancellationToken,
        trace: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for Canceller {
        fn name(&self) -> &str {
            "cancel_turn"
        }
        fn description(&self) -> &str {
            "Cancel the running turn"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            self.trace.lock().unwrap().push("cancel".into());
            self.token.cancel();
            Ok(ToolResult::output("cancelled"))
        }
    }

    fn setup(steps: Vec<Step>) -> (Orchestrator, Arc<ScriptedTransport>, Arc<Mutex<Vec<String>>>) {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Recorder {
            trace: Arc::clone(&trace),
        }));
        let transport = ScriptedTransport::new(steps);
        let orchestrator = Orchestrator::new(
            transport.clone(),
            Arc::new(ToolDispatcher::new(registry)),
            "glm-5",
        );
        (orchestrator, transport, trace)
    }

    fn assert_valid(orchestrator: &Orchestrator) {
        let mut log = MessageLog::new();
        log.replace(orchestrator.messages().to_vec());
        log.validate().unwrap();
    }

    fn roles(orchestrator: &Orchestrator) -> Vec<Role> {
        orchestrator.messages().iter().map(|m| m.role).collect()
    }

    #[tokio::test]
    async fn plain_answer_in_one_round() {
        let (mut orch, transport, _) = setup(vec![Step::Sse(content_sse("Hello!"))]);
        let (sink, mut rx) = EventSink::channel();

        let answer = orch.run_turn("hi", true, &sink, &CancellationToken::new()).await.unwrap();
        assert_eq!(answer, "Hello!");
        assert_eq!(roles(&orch), vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(orch.state(), TurnState::Completed);
        assert_eq!(orch.last_usage().unwrap().total_tokens, 13);

        let request = &transport.requests()[0];
        assert!(request.stream);
        assert_eq!(request.tools.as_ref().unwrap()[0].function.name, "record");

        drop(sink);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event.event_type());
        }
        assert_eq!(events.first(), Some(&"state_changed"));
        assert!(events.contains(&"content"));
        assert!(events.contains(&"round_completed"));
        assert_eq!(events.last(), Some(&"done"));
    }

    #[tokio::test]
    async fn two_tool_rounds_then_answer() {
        let (mut orch, transport, trace) = setup(vec![
            Step::Sse(tool_sse(&[("call_1", "record", r#"{"tag":"one"}"#)])),
            Step::Sse(tool_sse(&[("call_2", "record", r#"{"tag":"two"}"#)])),
            Step::Sse(content_sse("All done.")),
        ]);

        let answer = orch
            .run_turn("go", true, &EventSink::disabled(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(answer, "All done.");
        assert_eq!(trace.lock().unwrap().len(), 4);
        assert_eq!(
            roles(&orch),
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
            ]
        );
        assert_eq!(orch.state(), TurnState::Completed);
        assert_eq!(orch.messages()[3].tool_call_id.as_deref(), Some("call_1"));
        assert!(orch.messages()[2].content.is_none());

        // Third request saw both rounds' results.
        assert_eq!(transport.requests()[2].messages.len(), 6);
        assert_valid(&orch);
    }

    #[tokio::test]
    async fn tool_calls_run_in_order_without_interleaving() {
        let (mut orch, _, trace) = setup(vec![
            Step::Sse(tool_sse(&[
                ("a", "record", r#"{"tag":"A"}"#),
                ("b", "record", r#"{"tag":"B"}"#),
            ])),
            Step::Sse(content_sse("ok")),
        ]);

        orch.run_turn("go", true, &EventSink::disabled(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*trace.lock().unwrap(), vec!["start:A", "end:A", "start:B", "end:B"]);
        let ids: Vec<_> = orch.messages().iter().filter_map(|m| m.tool_call_id.as_deref()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn transport_failure_rolls_back_user_message() {
        let (mut orch, _, _) = setup(vec![
            Step::Sse(content_sse("first")),
            Step::Fail(TransportError::Api {
                status_code: 500,
                message: "boom".into(),
            }),
        ]);
        let cancel = CancellationToken::new();
        orch.run_turn("one", true, &EventSink::disabled(), &cancel).await.unwrap();
        let before = orch.messages().len();

        let err = orch.run_turn("two", true, &EventSink::disabled(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Api { status_code: 500, .. })));
        assert_eq!(orch.messages().len(), before);
        assert_eq!(orch.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn failure_after_tool_round_keeps_committed_round() {
        let (mut orch, _, trace) = setup(vec![
            Step::Sse(tool_sse(&[("a", "record", r#"{"tag":"A"}"#)])),
            Step::Fail(TransportError::Network("reset".into())),
        ]);

        let err = orch
            .run_turn("go", true, &EventSink::disabled(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Network(_))));
        assert_eq!(trace.lock().unwrap().len(), 2);
        assert_eq!(roles(&orch), vec![Role::System, Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(orch.state(), TurnState::Idle);
        assert_valid(&orch);
    }

    #[tokio::test]
    async fn cancel_between_tool_calls_skips_the_rest_of_the_round() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Recorder {
            trace: Arc::clone(&trace),
        }));
        registry.register(Arc::new(Canceller {
            token: cancel.clone(),
            trace: Arc::clone(&trace),
        }));
        let transport = ScriptedTransport::new(vec![
            Step::Sse(content_sse("first")),
            Step::Sse(tool_sse(&[
                ("a", "cancel_turn", "{}"),
                ("b", "record", r#"{"tag":"B"}"#),
            ])),
        ]);
        let mut orch = Orchestrator::new(transport, Arc::new(ToolDispatcher::new(registry)), "glm-5");

        orch.run_turn("one", true, &EventSink::disabled(), &CancellationToken::new())
            .await
            .unwrap();
        let checkpoint = orch.messages().to_vec();

        let err = orch.run_turn("two", true, &EventSink::disabled(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(*trace.lock().unwrap(), vec!["cancel"]);
        assert_eq!(orch.messages(), checkpoint.as_slice());
        assert_eq!(orch.state(), TurnState::Idle);
        assert_valid(&orch);
    }

    #[tokio::test]
    async fn round_limit_is_fatal_and_keeps_dispatched_rounds() {
        let looping: Vec<_> = (0..5)
            .map(|i| Step::Sse(tool_sse(&[(format!("c{i}").as_str(), "record", r#"{"tag":"x"}"#)])))
            .collect();
        let (orch, _, trace) = setup(looping);
        let mut orch = orch.with_max_rounds(3);

        let err = orch
            .run_turn("loop", true, &EventSink::disabled(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RoundLimitExceeded { limit: 3 }));
        // The last round's calls are not dispatched.
        assert_eq!(trace.lock().unwrap().len(), 4);
        assert_eq!(orch.messages().len(), 6);
        assert_eq!(orch.messages()[5].tool_call_id.as_deref(), Some("c1"));
        assert_valid(&orch);
    }

    #[tokio::test]
    async fn non_streaming_mode_runs_the_same_loop() {
        let (orch, transport, trace) = setup(vec![
            Step::Json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "a", "type": "function", "function": {"name": "record", "arguments": "{\"tag\":\"A\"}"}}
                ]}, "finish_reason": "tool_calls"}]
            })),
            Step::Json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "done"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6},
                "web_search": [{"title": "t"}]
            })),
        ]);
        let mut orch = orch.with_streaming(false);
        let (sink, mut rx) = EventSink::channel();

        let answer = orch.run_turn("go", true, &sink, &CancellationToken::new()).await.unwrap();
        assert_eq!(answer, "done");
        assert_eq!(trace.lock().unwrap().len(), 2);
        assert!(!transport.requests()[0].stream);
        assert_eq!(orch.last_usage().unwrap().total_tokens, 6);
        assert_eq!(orch.last_web_search().unwrap()[0]["title"], "t");

        drop(sink);
        while let Some(event) = rx.recv().await {
            assert!(!matches!(event, StreamEvent::Content { .. }));
        }
    }

    #[tokio::test]
    async fn tools_disabled_sends_no_schemas() {
        let (mut orch, transport, _) = setup(vec![Step::Sse(content_sse("plain"))]);
        orch.run_turn("hi", false, &EventSink::disabled(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(transport.requests()[0].tools.is_none());
        assert!(orch.messages()[0].text().contains("No tools are available"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_request_times_out() {
        let (orch, _, _) = setup(vec![Step::Hang]);
        let mut orch = orch.with_request_timeout(Duration::from_secs(5));

        let err = orch
            .run_turn("hi", true, &EventSink::disabled(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Timeout(_))));
        assert_eq!(roles(&orch), vec![Role::System]);
    }

    #[tokio::test]
    async fn cancellation_before_first_round_drops_user_message() {
        let (mut orch, _, _) = setup(vec![Step::Hang]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = orch.run_turn("hi", true, &EventSink::disabled(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(roles(&orch), vec![Role::System]);
    }

    #[tokio::test]
    async fn cancellation_keeps_committed_rounds() {
        let (mut orch, _, trace) = setup(vec![
            Step::Sse(tool_sse(&[("a", "record", r#"{"tag":"A"}"#)])),
            Step::Hang,
        ]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = orch.run_turn("go", true, &EventSink::disabled(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(trace.lock().unwrap().len(), 2);
        assert_eq!(roles(&orch), vec![Role::System, Role::User, Role::Assistant, Role::Tool]);
        assert_valid(&orch);
    }

    #[tokio::test]
    async fn history_limit_applies_after_turn() {
        let steps = (0..4).map(|i| Step::Sse(content_sse(&format!("a{i}")))).collect();
        let (orch, _, _) = setup(steps);
        let mut orch = orch.with_max_history(4);
        let cancel = CancellationToken::new();
        for i in 0..4 {
            orch.run_turn(&format!("q{i}"), true, &EventSink::disabled(), &cancel)
                .await
                .unwrap();
        }
        assert_eq!(orch.messages().len(), 4);
        assert_eq!(orch.messages()[0].role, Role::System);
        assert_eq!(orch.messages()[3].text(), "a3");
    }

    #[tokio::test]
    async fn clear_keeps_system_prompt() {
        let (mut orch, _, _) = setup(vec![Step::Sse(content_sse("x"))]);
        orch.run_turn("hi", true, &EventSink::disabled(), &CancellationToken::new())
            .await
            .unwrap();
        orch.clear();
        assert_eq!(roles(&orch), vec![Role::System]);
        assert_eq!(orch.state(), TurnState::Idle);
    }
}
