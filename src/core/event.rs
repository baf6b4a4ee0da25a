//! CloudEvent taxonomy (C9) — the event envelope carried on a task's
//! streaming channel. Grounded in the toolkit's `event.rs`: a single enum of
//! typed variants, each carrying exactly the payload that kind of event
//! needs, documented with a module-level event-flow description. The
//! teacher's `EventHandler` trait (an observability sink with default
//! no-op methods) is not reused here as-is — C9 events are streamed to
//! callers over SSE/channels rather than observed by a registered handler;
//! that handler shape is instead what `hooks.rs` generalizes for C10.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::message::Message;
use crate::core::task::TaskStatus;

/// The `type` field of a CloudEvent, per §6's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloudEventType {
    Delta,
    TaskStatusChanged,
    InputRequired,
    IterationCompleted,
    StreamFailed,
    StreamCancelled,
}

impl CloudEventType {
    /// Whether an event of this type is a terminal sentinel for a stream —
    /// §8's invariant that the final event on the channel always has a
    /// terminal type.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CloudEventType::IterationCompleted
                | CloudEventType::StreamFailed
                | CloudEventType::StreamCancelled
                | CloudEventType::InputRequired
        )
    }
}

/// A structured event envelope: unique id, source, time, type, and a
/// type-specific JSON payload (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudEvent {
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: CloudEventType,
    pub time: DateTime<Utc>,
    pub data: Value,
}

const SOURCE: &str = "agentcore/task-handler";

impl CloudEvent {
    fn new(event_type: CloudEventType, data: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: SOURCE.to_string(),
            event_type,
            time: Utc::now(),
            data,
        }
    }

    /// Partial assistant content during a streaming LLM call.
    pub fn delta(task_id: &str, content: &str) -> Self {
        Self::new(
            CloudEventType::Delta,
            serde_json::json!({ "task_id": task_id, "content": content }),
        )
    }

    pub fn task_status_changed(task_id: &str, status: &TaskStatus) -> Self {
        Self::new(
            CloudEventType::TaskStatusChanged,
            serde_json::json!({ "task_id": task_id, "status": status }),
        )
    }

    pub fn input_required(task_id: &str, message: &Message) -> Self {
        Self::new(
            CloudEventType::InputRequired,
            serde_json::json!({ "task_id": task_id, "message": message }),
        )
    }

    pub fn iteration_completed(task_id: &str, message: &Message) -> Self {
        Self::new(
            CloudEventType::IterationCompleted,
            serde_json::json!({ "task_id": task_id, "message": message }),
        )
    }

    pub fn stream_failed(task_id: &str, error: &str) -> Self {
        Self::new(
            CloudEventType::StreamFailed,
            serde_json::json!({ "task_id": task_id, "error": error }),
        )
    }

    pub fn stream_cancelled(task_id: &str) -> Self {
        Self::new(
            CloudEventType::StreamCancelled,
            serde_json::json!({ "task_id": task_id }),
        )
    }

    /// SSE wire framing: `data: <JSON>\n\n` (§6).
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", serde_json::to_string(self).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_types_match_spec_registry() {
        assert!(CloudEventType::IterationCompleted.is_terminal());
        assert!(CloudEventType::StreamFailed.is_terminal());
        assert!(CloudEventType::StreamCancelled.is_terminal());
        assert!(CloudEventType::InputRequired.is_terminal());
        assert!(!CloudEventType::Delta.is_terminal());
        assert!(!CloudEventType::TaskStatusChanged.is_terminal());
    }

    #[test]
    fn sse_frame_ends_with_blank_line() {
        let event = CloudEvent::delta("t1", "hello");
        let frame = event.to_sse_frame();
        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));
    }
}
