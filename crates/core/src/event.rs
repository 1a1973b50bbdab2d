//! Turn events: incremental output delivered to the front-end.
//!
//! The decoder, aggregator and orchestrator never touch presentation; they
//! push `StreamEvent`s into an `EventSink`. The sink is an unbounded
//! channel, so a slow consumer buffers and the producer never blocks.
//! Delivery order is the order of `emit` calls.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::completion::{AggregatedResult, Usage};

/// Where a turn is in its request/response/tool cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    /// A request is being sent.
    Requesting,
    /// Frames are arriving from a streaming response.
    Streaming,
    /// Waiting on an atomic non-streaming response.
    Awaiting,
    /// A round's result is final.
    Completed,
    /// Tool calls from the last round are being executed.
    Dispatching,
}

/// Events emitted while a turn runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial answer text.
    Content { delta: String },

    /// Partial reasoning text.
    Reasoning { delta: String },

    /// The orchestrator moved to a new state.
    StateChanged { state: TurnState },

    /// A tool is about to run.
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },

    /// A tool finished.
    ToolResult {
        id: String,
        name: String,
        success: bool,
        content: String,
    },

    /// One round's stream ended and was folded.
    RoundCompleted { round: u32, result: AggregatedResult },

    /// The turn produced its final answer.
    Done {
        rounds: u32,
        tool_calls_made: usize,
        usage: Option<Usage>,
    },
}

impl StreamEvent {
    /// Short name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::Reasoning { .. } => "reasoning",
            Self::StateChanged { .. } => "state_changed",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::RoundCompleted { .. } => "round_completed",
            Self::Done { .. } => "done",
        }
    }
}

/// A non-blocking event sink. A disabled sink drops everything.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl EventSink {
    /// A sink that discards events.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A sink plus the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender: Some(sender) }, receiver)
    }

    /// Push an event. A dropped receiver is ignored.
    pub fn emit(&self, event: StreamEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }
}

impl From<mpsc::UnboundedSender<StreamEvent>> for EventSink {
    fn from(sender: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self { sender: Some(sender) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(StreamEvent::Content { delta: "a".into() });
        sink.emit(StreamEvent::Content { delta: "b".into() });
        drop(sink);

        let mut seen = Vec::new();
        while let Some(StreamEvent::Content { delta }) = rx.recv().await {
            seen.push(delta);
        }
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn disabled_sink_is_silent() {
        let sink = EventSink::disabled();
        assert!(!sink.is_enabled());
        sink.emit(StreamEvent::Reasoning { delta: "x".into() });
    }

    #[test]
    fn emit_after_receiver_dropped_is_ignored() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(StreamEvent::Content { delta: "lost".into() });
    }

    #[test]
    fn event_serialization_tags() {
        let event = StreamEvent::StateChanged { state: TurnState::Streaming };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"state_changed""#));
        assert!(json.contains(r#""state":"streaming""#));
        assert_eq!(event.event_type(), "state_changed");
    }
}
