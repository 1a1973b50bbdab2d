//! Delta aggregator: folds decoded frames into one `AggregatedResult`.
//!
//! Text and reasoning fragments are appended and forwarded to the event
//! sink as they arrive. Tool-call fragments are accumulated into sparse
//! index-keyed slots and only densified when the stream ends.

use lightzai_core::completion::{AggregatedResult, Usage};
use lightzai_core::error::TransportError;
use lightzai_core::event::{EventSink, StreamEvent};
use lightzai_core::message::ToolCallRequest;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::sse::{FrameDecoder, SseEvent, StreamFrame, ToolCallFragment};

/// Highest tool-call index accepted from a stream.
pub const MAX_TOOL_CALL_SLOTS: usize = 256;

/// Mutable accumulator for one round.
#[derive(Debug)]
pub struct DeltaAggregator {
    round: u32,
    content: String,
    reasoning: String,
    slots: Vec<Option<ToolCallRequest>>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    web_search: Option<serde_json::Value>,
    sink: EventSink,
}

impl DeltaAggregator {
    pub fn new(round: u32, sink: EventSink) -> Self {
        Self {
            round,
            content: String::new(),
            reasoning: String::new(),
            slots: Vec::new(),
            finish_reason: None,
            usage: None,
            web_search: None,
            sink,
        }
    }

    /// Fold one frame. Must be called in stream order.
    pub fn apply(&mut self, frame: StreamFrame) {
        if let Some(usage) = frame.usage {
            self.usage = Some(usage);
        }
        if let Some(web_search) = frame.web_search {
            self.web_search = Some(web_search);
        }

        let Some(choice) = frame.choices.and_then(|choices| choices.into_iter().next()) else {
            return;
        };

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }

        let Some(delta) = choice.delta else {
            return;
        };

        if let Some(reasoning) = delta.reasoning_content.filter(|r| !r.is_empty()) {
            self.reasoning.push_str(&reasoning);
            self.sink.emit(StreamEvent::Reasoning { delta: reasoning });
        }

        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            self.content.push_str(&content);
            self.sink.emit(StreamEvent::Content { delta: content });
        }

        for fragment in delta.tool_calls.into_iter().flatten() {
            self.apply_tool_fragment(fragment);
        }
    }

    fn apply_tool_fragment(&mut self, fragment: ToolCallFragment) {
        let Some(index) = fragment.index else {
            return;
        };
        if index >= MAX_TOOL_CALL_SLOTS {
            warn!(index, "Dropping tool-call fragment with out-of-range index");
            return;
        }

        if let Some(id) = fragment.id {
            if self.slots.len() <= index {
                self.slots.resize(index + 1, None);
            }
            let mut call = ToolCallRequest::new(id, "", "");
            if let Some(call_type) = fragment.call_type {
                call.call_type = call_type;
            }
            self.slots[index] = Some(call);
        }

        let Some(slot) = self.slots.get_mut(index).and_then(Option::as_mut) else {
            debug!(index, "Tool-call fragment for uninitialized slot ignored");
            return;
        };
        if let Some(function) = fragment.function {
            if let Some(name) = function.name {
                slot.function.name = name;
            }
            if let Some(arguments) = function.arguments {
                slot.function.arguments.push_str(&arguments);
            }
        }
    }

    /// Stream ended: densify tool calls and emit the completion event.
    pub fn finish(self) -> AggregatedResult {
        let calls: Vec<ToolCallRequest> = self.slots.into_iter().flatten().collect();
        let result = AggregatedResult {
            content: self.content,
            reasoning: self.reasoning,
            tool_calls: (!calls.is_empty()).then_some(calls),
            finish_reason: self.finish_reason,
            usage: self.usage,
            web_search: self.web_search,
        };
        self.sink.emit(StreamEvent::RoundCompleted {
            round: self.round,
            result: result.clone(),
        });
        result
    }
}

/// Decoder and aggregator bundled for one streaming round.
#[derive(Debug)]
pub struct StreamFolder {
    decoder: FrameDecoder,
    aggregator: DeltaAggregator,
    done: bool,
}

impl StreamFolder {
    pub fn new(round: u32, sink: EventSink) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            aggregator: DeltaAggregator::new(round, sink),
            done: false,
        }
    }

    /// Feed raw bytes. Returns `true` once the `[DONE]` sentinel has been
    /// seen; bytes after it are ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if self.done {
            return true;
        }
        for event in self.decoder.push(chunk) {
            match event {
                SseEvent::Frame(frame) => self.aggregator.apply(frame),
                SseEvent::Done => {
                    self.done = true;
                    break;
                }
            }
        }
        self.done
    }

    /// Close the round, whether by sentinel or by connection close.
    pub fn finish(self) -> AggregatedResult {
        let dropped = self.decoder.malformed_frames();
        if dropped > 0 {
            debug!(dropped, "Malformed frames dropped during stream");
        }
        self.decoder.finish();
        self.aggregator.finish()
    }
}

/// Fold a complete byte sequence delivered as the given chunks.
#[cfg(test)]
pub(crate) fn fold_chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>, sink: EventSink) -> AggregatedResult {
    let mut folder = StreamFolder::new(1, sink);
    for chunk in chunks {
        if folder.feed(chunk) {
            break;
        }
    }
    folder.finish()
}

// --- Non-streaming responses ---

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    web_search: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRequest>>,
}

/// Build a round result from a non-streaming `choices[0].message` response.
pub fn from_completion(value: serde_json::Value) -> Result<AggregatedResult, TransportError> {
    let response: CompletionResponse = serde_json::from_value(value)
        .map_err(|e| TransportError::InvalidResponse(format!("Failed to parse response: {e}")))?;

    if let Some(error) = response.error.filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_owned)
            .unwrap_or_else(|| error.to_string());
        return Err(TransportError::Api {
            status_code: 200,
            message,
        });
    }

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::InvalidResponse("No choices in response".into()))?;

    Ok(AggregatedResult {
        content: choice.message.content.unwrap_or_default(),
        reasoning: choice.message.reasoning_content.unwrap_or_default(),
        tool_calls: choice.message.tool_calls.filter(|calls| !calls.is_empty()),
        finish_reason: choice.finish_reason,
        usage: response.usage,
        web_search: response.web_search,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOOL_STREAM: &str = concat!(
        "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"Let me check.\"}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Reading\"}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"a\",\"function\":{\"name\":\"f\"}}]}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"x\\\":\"}}]}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"1}\"}}]}}]}\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n",
        "data: {\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":5,\"total_tokens\":15}}\n",
        "data: [DONE]\n",
    );

    #[test]
    fn tool_call_arguments_concatenate() {
        let result = fold_chunks([TOOL_STREAM.as_bytes()], EventSink::disabled());
        let calls = result.tool_calls.expect("tool calls");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].call_type, "function");
        assert_eq!(calls[0].function.name, "f");
        assert_eq!(calls[0].function.arguments, "{\"x\":1}");
        assert_eq!(result.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(result.reasoning, "Let me check.");
        assert_eq!(result.content, "Reading");
        assert_eq!(result.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn any_byte_chunking_matches_single_chunk() {
        let bytes = TOOL_STREAM.as_bytes();
        let whole = fold_chunks([bytes], EventSink::disabled());

        for split in 1..bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(fold_chunks([a, b], EventSink::disabled()), whole, "split at {split}");
        }

        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(fold_chunks(singles, EventSink::disabled()), whole);

        let sevens: Vec<&[u8]> = bytes.chunks(7).collect();
        assert_eq!(fold_chunks(sevens, EventSink::disabled()), whole);
    }

    #[test]
    fn no_tool_frames_yields_none() {
        let stream = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\ndata: [DONE]\n";
        let result = fold_chunks([stream.as_bytes()], EventSink::disabled());
        assert!(result.tool_calls.is_none());
        assert_eq!(result.content, "Hi");
    }

    #[test]
    fn fragments_for_uninitialized_slot_resolve_to_none() {
        let stream = "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{}\"}}]}}]}\n";
        let result = fold_chunks([stream.as_bytes()], EventSink::disabled());
        assert!(result.tool_calls.is_none());
    }

    #[test]
    fn malformed_frame_does_not_change_result() {
        let clean = "data: {\"choices\":[{\"delta\":{\"content\":\"A\",\"reasoning_content\":\"r1\"}}]}\n\
                     data: {\"choices\":[{\"delta\":{\"content\":\"B\",\"reasoning_content\":\"r2\"}}]}\n";
        let noisy = "data: {\"choices\":[{\"delta\":{\"content\":\"A\",\"reasoning_content\":\"r1\"}}]}\n\
                     data: {\"choices\": [oops\n\
                     data: {\"choices\":[{\"delta\":{\"content\":\"B\",\"reasoning_content\":\"r2\"}}]}\n";
        let a = fold_chunks([clean.as_bytes()], EventSink::disabled());
        let b = fold_chunks([noisy.as_bytes()], EventSink::disabled());
        assert_eq!(a.content, b.content);
        assert_eq!(a.reasoning, b.reasoning);
        assert_eq!(b.content, "AB");
    }

    #[test]
    fn sparse_indices_densify_in_order() {
        let stream = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":2,\"id\":\"c\",\"function\":{\"name\":\"g\",\"arguments\":\"{}\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"a\",\"function\":{\"name\":\"f\",\"arguments\":\"{}\"}}]}}]}\n",
        );
        let calls = fold_chunks([stream.as_bytes()], EventSink::disabled()).tool_calls.unwrap();
        let ids: Vec<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn id_resets_slot() {
        let stream = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"old\",\"function\":{\"name\":\"f\",\"arguments\":\"{\\\"a\\\"\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"new\",\"function\":{\"name\":\"g\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{}\"}}]}}]}\n",
        );
        let calls = fold_chunks([stream.as_bytes()], EventSink::disabled()).tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "new");
        assert_eq!(calls[0].function.name, "g");
        assert_eq!(calls[0].function.arguments, "{}");
    }

    #[test]
    fn out_of_range_index_dropped() {
        let stream = "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":100000,\"id\":\"x\"}]}}]}\n";
        let result = fold_chunks([stream.as_bytes()], EventSink::disabled());
        assert!(result.tool_calls.is_none());
    }

    #[test]
    fn usage_and_web_search_last_write_wins() {
        let stream = concat!(
            "data: {\"usage\":{\"total_tokens\":1},\"web_search\":[{\"title\":\"first\"}]}\n",
            "data: {\"usage\":{\"total_tokens\":2},\"web_search\":[{\"title\":\"second\"}]}\n",
        );
        let result = fold_chunks([stream.as_bytes()], EventSink::disabled());
        assert_eq!(result.usage.unwrap().total_tokens, 2);
        assert_eq!(result.web_search.unwrap()[0]["title"], "second");
    }

    #[test]
    fn bytes_after_done_ignored() {
        let stream = "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\ndata: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n";
        let result = fold_chunks([stream.as_bytes()], EventSink::disabled());
        assert_eq!(result.content, "A");
    }

    #[tokio::test]
    async fn callbacks_fire_in_order() {
        let (sink, mut rx) = EventSink::channel();
        let result = fold_chunks([TOOL_STREAM.as_bytes()], sink);

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.event_type());
        }
        assert_eq!(kinds, vec!["reasoning", "content", "round_completed"]);
        assert!(result.requests_tools());
    }

    #[test]
    fn completion_with_tool_calls() {
        let value = serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "call_1", "type": "function", "function": {"name": "read_file", "arguments": "{\"path\":\"a\"}"}}]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
        });
        let result = from_completion(value).unwrap();
        assert_eq!(result.content, "");
        assert_eq!(result.tool_calls.unwrap()[0].function.name, "read_file");
        assert_eq!(result.usage.unwrap().total_tokens, 3);
    }

    #[test]
    fn completion_empty_tool_list_normalizes_to_none() {
        let value = serde_json::json!({
            "choices": [{"message": {"content": "hi", "tool_calls": []}}]
        });
        let result = from_completion(value).unwrap();
        assert!(result.tool_calls.is_none());
        assert_eq!(result.content, "hi");
    }

    #[test]
    fn completion_error_object_is_api_error() {
        let value = serde_json::json!({"error": {"message": "Insufficient balance"}});
        let err = from_completion(value).unwrap_err();
        assert!(err.is_quota_exhausted());
    }

    #[test]
    fn completion_without_choices_is_invalid() {
        let err = from_completion(serde_json::json!({"choices": []})).unwrap_err();
        assert!(matches!(err, TransportError::InvalidResponse(_)));
    }
}
