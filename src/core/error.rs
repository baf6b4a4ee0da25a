//! Canonical error taxonomy for the A2A runtime core.
//!
//! Grounded in `tool_protocol::ToolError` from the vendored agent toolkit:
//! a hand-rolled enum with a manual `Display` impl and a plain `impl Error`,
//! no `thiserror`. `CoreError` adds a `code()` method that maps each kind to
//! the JSON-RPC error code it must surface as.

use std::fmt;

/// Every error kind the runtime can surface, each carrying the data needed
/// to render a JSON-RPC error object.
#[derive(Debug, Clone)]
pub enum CoreError {
    /// The JSON-RPC request body could not be parsed.
    ParseError(String),
    /// The request was structurally invalid (missing fields, wrong types).
    InvalidRequest(String),
    /// No handler exists for the requested method.
    MethodNotFound(String),
    /// Parameters failed validation for an otherwise known method.
    InvalidParams(String),
    /// An unexpected internal error, not attributable to caller input.
    Internal(String),
    /// `tasks/get`, `tasks/cancel`, etc. referenced an unknown task id.
    TaskNotFound(String),
    /// A transition was attempted on a task already in a terminal state.
    TaskNotCancelable(String),
    /// A requested state transition is not legal from the task's current state.
    InvalidTransition(String),
    /// Push notifications were requested but none are registered, or the
    /// config id named does not exist.
    PushConfigNotFound(String),
    /// The provider/queue does not support push notifications at all.
    PushNotificationNotSupported,
    /// The queue is at capacity and cannot accept new entries.
    QueueFull,
    /// The caller asked for a method/feature the server does not implement.
    UnsupportedOperation(String),
    /// `Content-Type` on the request did not match what the handler expects.
    ContentTypeMismatch(String),
    /// The LLM provider returned something the converter could not interpret.
    InvalidAgentResponse(String),
    /// Missing or invalid bearer token.
    AuthenticationRequired(String),
    /// A tool invocation failed.
    ToolError(String),
}

impl CoreError {
    /// The canonical JSON-RPC error code for this error kind, per the
    /// external interface's error table (standard range plus the `-3200x`
    /// domain extensions).
    pub fn code(&self) -> i64 {
        match self {
            CoreError::ParseError(_) => -32700,
            CoreError::InvalidRequest(_) => -32600,
            CoreError::MethodNotFound(_) => -32601,
            CoreError::InvalidParams(_) => -32602,
            CoreError::Internal(_) => -32603,
            CoreError::AuthenticationRequired(_) => -32000,
            CoreError::TaskNotFound(_) => -32001,
            CoreError::TaskNotCancelable(_) => -32002,
            CoreError::PushNotificationNotSupported => -32003,
            CoreError::UnsupportedOperation(_) => -32004,
            CoreError::ContentTypeMismatch(_) => -32005,
            CoreError::InvalidAgentResponse(_) => -32006,
            // Not in the canonical table; reuse the closest domain bucket
            // rather than inventing a new reserved code.
            CoreError::InvalidTransition(_) => -32002,
            CoreError::PushConfigNotFound(_) => -32003,
            CoreError::QueueFull => -32001,
            CoreError::ToolError(_) => -32603,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::AuthenticationRequired(_) => 401,
            CoreError::TaskNotFound(_) | CoreError::PushConfigNotFound(_) => 404,
            CoreError::ContentTypeMismatch(_) => 415,
            CoreError::QueueFull => 503,
            CoreError::ParseError(_)
            | CoreError::InvalidRequest(_)
            | CoreError::InvalidParams(_)
            | CoreError::MethodNotFound(_) => 400,
            _ => 500,
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::ParseError(m) => write!(f, "parse error: {}", m),
            CoreError::InvalidRequest(m) => write!(f, "invalid request: {}", m),
            CoreError::MethodNotFound(m) => write!(f, "method not found: {}", m),
            CoreError::InvalidParams(m) => write!(f, "invalid params: {}", m),
            CoreError::Internal(m) => write!(f, "internal error: {}", m),
            CoreError::TaskNotFound(id) => write!(f, "task not found: {}", id),
            CoreError::TaskNotCancelable(id) => write!(f, "task not cancelable: {}", id),
            CoreError::InvalidTransition(m) => write!(f, "invalid transition: {}", m),
            CoreError::PushConfigNotFound(m) => write!(f, "push notification config not found: {}", m),
            CoreError::PushNotificationNotSupported => {
                write!(f, "push notifications are not supported")
            }
            CoreError::QueueFull => write!(f, "task queue is full"),
            CoreError::UnsupportedOperation(m) => write!(f, "unsupported operation: {}", m),
            CoreError::ContentTypeMismatch(m) => write!(f, "content-type mismatch: {}", m),
            CoreError::InvalidAgentResponse(m) => write!(f, "invalid agent response: {}", m),
            CoreError::AuthenticationRequired(m) => write!(f, "authentication required: {}", m),
            CoreError::ToolError(m) => write!(f, "tool error: {}", m),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<crate::core::tool::ToolError> for CoreError {
    fn from(e: crate::core::tool::ToolError) -> Self {
        CoreError::ToolError(e.to_string())
    }
}

impl From<crate::core::store::TaskStoreError> for CoreError {
    fn from(e: crate::core::store::TaskStoreError) -> Self {
        match e {
            crate::core::store::TaskStoreError::NotFound(id) => CoreError::TaskNotFound(id),
            crate::core::store::TaskStoreError::NotCancelable(id) => {
                CoreError::TaskNotCancelable(id)
            }
            crate::core::store::TaskStoreError::InvalidTransition(m) => {
                CoreError::InvalidTransition(m)
            }
            crate::core::store::TaskStoreError::PushConfigNotFound(m) => {
                CoreError::PushConfigNotFound(m)
            }
        }
    }
}

impl From<crate::core::queue::QueueError> for CoreError {
    fn from(e: crate::core::queue::QueueError) -> Self {
        match e {
            crate::core::queue::QueueError::Full => CoreError::QueueFull,
            crate::core::queue::QueueError::Closed => {
                CoreError::Internal("queue closed".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_canonical_table() {
        assert_eq!(CoreError::TaskNotFound("x".into()).code(), -32001);
        assert_eq!(CoreError::PushNotificationNotSupported.code(), -32003);
        assert_eq!(CoreError::UnsupportedOperation("x".into()).code(), -32004);
        assert_eq!(CoreError::ContentTypeMismatch("x".into()).code(), -32005);
        assert_eq!(CoreError::InvalidAgentResponse("x".into()).code(), -32006);
        assert_eq!(CoreError::AuthenticationRequired("x".into()).code(), -32000);
    }

    #[test]
    fn display_is_human_readable() {
        let e = CoreError::TaskNotFound("abc-123".to_string());
        assert_eq!(e.to_string(), "task not found: abc-123");
    }
}
