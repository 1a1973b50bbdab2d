//! History limiting.
//!
//! Keeps the log small on low-memory devices. The system message always
//! survives, and the kept tail never opens on a `tool` message, so every
//! tool result still follows the assistant message that requested it.

use lightzai_core::message::{Message, Role};

/// Keep the system message (when present) plus at most `max - 1` of the
/// newest messages. `max` below 2 is treated as 2.
pub fn trim_history(messages: &[Message], max: usize) -> Vec<Message> {
    let max = max.max(2);
    if messages.len() <= max {
        return messages.to_vec();
    }

    let (head, body) = match messages.first() {
        Some(first) if first.role == Role::System => (Some(first), &messages[1..]),
        _ => (None, messages),
    };
    let budget = if head.is_some() { max - 1 } else { max };

    let mut start = body.len().saturating_sub(budget);
    while start < body.len() && body[start].role == Role::Tool {
        start += 1;
    }

    head.into_iter().cloned().chain(body[start..].iter().cloned()).collect()
}
