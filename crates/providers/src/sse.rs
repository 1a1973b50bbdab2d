//! Frame decoder: raw response bytes → `data:` frames.
//!
//! Bytes are buffered until a newline arrives, so a chunk boundary can fall
//! anywhere (mid-line, mid-JSON, even inside a multi-byte UTF-8 character)
//! without changing what is decoded. Only complete lines are interpreted.

use lightzai_core::completion::Usage;
use memchr::memchr;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, trace};

/// Prefix marking a frame line.
pub const DATA_PREFIX: &str = "data:";

/// Payload marking the end of the frame stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// What a complete line decoded to.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A parsed JSON frame.
    Frame(StreamFrame),
    /// The `[DONE]` sentinel; no frames follow.
    Done,
}

/// Incremental line splitter with a carry-over buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    malformed: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and decode every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = memchr(b'\n', &self.buffer[start..]) {
            let end = start + offset;
            match decode_line(&self.buffer[start..end]) {
                Line::Event(event) => events.push(event),
                Line::Malformed => self.malformed += 1,
                Line::Ignored => {}
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        events
    }

    /// Number of `data:` lines dropped because their payload was not a
    /// valid frame.
    pub fn malformed_frames(&self) -> usize {
        self.malformed
    }

    /// End of input. Any unterminated remainder is discarded, never parsed;
    /// returns how many bytes were thrown away.
    pub fn finish(self) -> usize {
        let leftover = self.buffer.len();
        if leftover > 0 {
            debug!(bytes = leftover, "Discarding unterminated SSE remainder");
        }
        leftover
    }
}

enum Line {
    Event(SseEvent),
    Malformed,
    Ignored,
}

fn decode_line(raw: &[u8]) -> Line {
    let text = String::from_utf8_lossy(raw);
    let Some(payload) = text.trim().strip_prefix(DATA_PREFIX) else {
        return Line::Ignored;
    };
    let payload = payload.trim();

    if payload == DONE_SENTINEL {
        return Line::Event(SseEvent::Done);
    }

    match serde_json::from_str::<StreamFrame>(payload) {
        Ok(frame) => Line::Event(SseEvent::Frame(frame)),
        Err(e) => {
            debug!(error = %e, "Dropping malformed SSE frame");
            trace!(payload = %payload, "Malformed frame payload");
            Line::Malformed
        }
    }
}

// --- Frame types ---

/// One decoded `data: {...}` object.
///
/// Every field is optional: metadata-only frames (usage, web search) carry
/// no choices at all.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub choices: Option<Vec<FrameChoice>>,
    #[serde(default, deserialize_with = "lenient")]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub web_search: Option<serde_json::Value>,
}

/// Deserialize a metadata field, treating a mistyped value as absent so it
/// cannot take the rest of the frame down with it.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            debug!(error = %e, "Ignoring mistyped frame metadata");
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FrameChoice {
    #[serde(default)]
    pub delta: Option<FrameDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FrameDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallFragment>>,
}

/// A tool call delta; arrives incrementally across frames.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolCallFragment {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub call_type: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionFragment>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FunctionFragment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}
