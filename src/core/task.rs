//! Task data model and state machine (C3). Grounded in the toolkit's
//! registry-of-records idiom (`mcp_server.rs`'s `Arc<RwLock<HashMap<..>>>`)
//! for how the store that owns these types is shaped; the state machine
//! itself is new — the teacher has no task lifecycle of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::core::message::Message;

/// `Task.status.state`, per §4.3's formal state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    AuthRequired,
    Completed,
    Failed,
    Canceled,
    Rejected,
}

impl TaskState {
    /// Terminal states accept no further transitions except cleanup.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled | TaskState::Rejected
        )
    }

    /// Whether `self -> to` is a legal edge in the state machine diagram.
    pub fn can_transition_to(self, to: TaskState) -> bool {
        use TaskState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (Submitted, Working) => true,
            (Working, Completed | Failed | Canceled | InputRequired | AuthRequired) => true,
            (InputRequired, Working | Canceled) => true,
            (AuthRequired, Working) => true,
            // Any non-terminal state may be cancelled.
            (_, Canceled) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskStatus {
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(state: TaskState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }
}

/// An artifact part reuses the same tagged variant as a message part (§3).
pub type ArtifactPart = crate::core::message::Part;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parts: Vec<ArtifactPart>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, parts: Vec<ArtifactPart>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            parts,
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub status: TaskStatus,
    pub history: Vec<Message>,
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Task {
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            context_id: context_id.into(),
            status: TaskStatus::new(TaskState::Submitted),
            history: Vec::new(),
            artifacts: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

/// Authentication descriptor for a push-notification webhook. Kept minimal:
/// the only scheme implemented is an HMAC-signed shared secret (§4.7); a
/// richer descriptor (OAuth client-credential exchange, etc.) is an
/// external collaborator concern per §1's non-goals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushNotificationConfig {
    pub id: String,
    pub task_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl PushNotificationConfig {
    pub fn new(task_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            url: url.into(),
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

/// A filter for `list_tasks`: all fields optional/defaulted.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub context_id: Option<String>,
    pub state: Option<TaskState>,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_reject_transitions() {
        assert!(!TaskState::Completed.can_transition_to(TaskState::Working));
        assert!(!TaskState::Failed.can_transition_to(TaskState::Canceled));
    }

    #[test]
    fn input_required_resumes_to_working() {
        assert!(TaskState::InputRequired.can_transition_to(TaskState::Working));
    }

    #[test]
    fn any_non_terminal_state_can_be_cancelled() {
        assert!(TaskState::Submitted.can_transition_to(TaskState::Canceled));
        assert!(TaskState::Working.can_transition_to(TaskState::Canceled));
        assert!(TaskState::AuthRequired.can_transition_to(TaskState::Canceled));
    }
}
