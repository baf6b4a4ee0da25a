//! Canonical message representation, independent of any LLM provider's wire
//! format. Grounded in `client_wrapper::{Role, Message}` from the vendored
//! toolkit, generalized from a flat `content: Arc<str>` into a tagged `Part`
//! list per the polymorphism-over-roles-and-parts design: `Part` is an enum,
//! not a base-class-with-subclasses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Who sent a message, from the task's point of view. Providers have their
/// own richer role vocabulary (system/user/assistant/tool); that mapping is
/// the converter's job, not this type's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// A tagged unit within a message. Deliberately a variant, not a struct with
/// optional fields for every kind, so the converter can exhaustively match
/// instead of falling back to untyped maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    File {
        name: String,
        media_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        bytes: Option<Vec<u8>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    Data { data: Value },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn data(data: Value) -> Self {
        Part::Data { data }
    }

    pub fn file_inline(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Part::File {
            name: name.into(),
            media_type: media_type.into(),
            bytes: Some(bytes),
            uri: None,
        }
    }

    pub fn file_uri(name: impl Into<String>, media_type: impl Into<String>, uri: impl Into<String>) -> Self {
        Part::File {
            name: name.into(),
            media_type: media_type.into(),
            bytes: None,
            uri: Some(uri.into()),
        }
    }

    /// Structural validation rule from the Message/Part Model contract:
    /// reject parts with no field set, empty text, missing data, or a file
    /// part missing name/media type.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Part::Text { text } if text.is_empty() => Err("text part has empty text".to_string()),
            Part::Text { .. } => Ok(()),
            Part::File { name, media_type, bytes, uri } => {
                if name.is_empty() {
                    return Err("file part missing name".to_string());
                }
                if media_type.is_empty() {
                    return Err("file part missing media type".to_string());
                }
                if bytes.is_none() && uri.is_none() {
                    return Err("file part has neither inline bytes nor a uri".to_string());
                }
                Ok(())
            }
            Part::Data { data } if data.is_null() => Err("data part missing data".to_string()),
            Part::Data { .. } => Ok(()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Part::Data { data } => Some(data),
            _ => None,
        }
    }
}

/// A single message in a task's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            parts,
            task_id: None,
            context_id: None,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn agent_text(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, vec![Part::text(text)])
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    /// Concatenation of every text part's content, in order. Used both for
    /// the provider round-trip invariant and for building human-readable
    /// previews.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// The first Data part whose payload is a JSON object, if any. Used to
    /// locate tool-call / tool-result payloads without assuming position.
    pub fn data_part(&self) -> Option<&Value> {
        self.parts.iter().find_map(Part::as_data)
    }

    /// A tool-result message, per §4.1: agent role, one Data part carrying
    /// `tool_call_id`, `tool_name`, and `result`.
    pub fn tool_result(tool_call_id: impl Into<String>, tool_name: impl Into<String>, result: impl Into<String>) -> Self {
        let data = serde_json::json!({
            "tool_call_id": tool_call_id.into(),
            "tool_name": tool_name.into(),
            "result": result.into(),
        });
        Self::new(Role::Agent, vec![Part::data(data)])
    }

    /// Whether this message's Data part carries a `tool_call_id`, which per
    /// the converter's role-mapping rule routes it to the provider's `tool`
    /// role rather than `assistant`.
    pub fn tool_call_id(&self) -> Option<String> {
        self.data_part()
            .and_then(|d| d.get("tool_call_id"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// The `tool_calls` array carried by an assistant message's Data part,
    /// if present.
    pub fn tool_calls(&self) -> Option<&Value> {
        self.data_part().and_then(|d| d.get("tool_calls"))
    }

    pub fn validate(&self) -> Result<(), String> {
        for part in &self.parts {
            part.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_concatenates_in_order() {
        let m = Message::new(
            Role::Agent,
            vec![Part::text("hello "), Part::text("world")],
        );
        assert_eq!(m.text_content(), "hello world");
    }

    #[test]
    fn tool_result_carries_call_id() {
        let m = Message::tool_result("call-1", "echo", "Echo: hi");
        assert_eq!(m.tool_call_id(), Some("call-1".to_string()));
    }

    #[test]
    fn validate_rejects_empty_text() {
        let p = Part::text("");
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_file_without_bytes_or_uri() {
        let p = Part::File {
            name: "a.txt".into(),
            media_type: "text/plain".into(),
            bytes: None,
            uri: None,
        };
        assert!(p.validate().is_err());
    }
}
