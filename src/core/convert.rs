//! Bidirectional mapping between canonical `core::message::Message` and the
//! provider wire format in `core::provider`. Grounded in the toolkit's
//! `agent.rs::parse_tool_call` (extracting tool-call structure out of a
//! model turn) generalized to structured Data parts instead of text-embedded
//! JSON, and in `client_wrapper::Role` for the role-mapping shape.

use crate::core::message::{Message, Part, Role};
use crate::core::provider::{NativeToolCall, ProviderMessage, ProviderRole};
use serde_json::json;

/// `to_provider`: map canonical messages to the provider's wire format.
///
/// Rules (§4.1):
/// - user → provider `user`.
/// - agent with a Data part carrying `tool_call_id` → provider `tool`,
///   content is the Data part's `result`, `tool_call_id` propagated.
/// - agent with a Data part carrying `tool_calls` → provider `assistant`
///   with that array in the structured tool-call field; text parts become
///   concatenated content.
/// - agent otherwise → provider `assistant`, content is concatenated text.
pub fn to_provider(messages: &[Message]) -> Vec<ProviderMessage> {
    messages.iter().map(to_provider_one).collect()
}

fn to_provider_one(message: &Message) -> ProviderMessage {
    match message.role {
        Role::User => ProviderMessage::new(ProviderRole::User, message.text_content()),
        Role::Agent => {
            if let Some(call_id) = message.tool_call_id() {
                let result = message
                    .data_part()
                    .and_then(|d| d.get("result"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                ProviderMessage::new(ProviderRole::Tool { call_id }, result)
            } else {
                let mut msg = ProviderMessage::new(ProviderRole::Assistant, message.text_content());
                if let Some(calls) = message.tool_calls().and_then(|v| v.as_array()) {
                    msg.tool_calls = calls
                        .iter()
                        .filter_map(|c| {
                            Some(NativeToolCall {
                                id: c.get("id")?.as_str()?.to_string(),
                                name: c.get("name")?.as_str()?.to_string(),
                                arguments: c.get("arguments").cloned().unwrap_or(json!({})),
                            })
                        })
                        .collect();
                }
                msg
            }
        }
    }
}

/// `from_provider`: map a single provider message back to the canonical
/// form. An assistant turn carrying tool calls becomes an agent message
/// with one Text part (the textual content, possibly empty) plus one Data
/// part carrying the `tool_calls` array — never collapsed into one part, so
/// the converter stays exhaustive over `Part` variants.
///
/// `reasoning`, when supplied by a provider that exposes separate reasoning
/// content, becomes an additional Text part appended after the primary
/// content, per §4.1.
pub fn from_provider(message: &ProviderMessage, reasoning: Option<&str>) -> Message {
    let role = match message.role {
        ProviderRole::User => Role::User,
        // System content has no canonical counterpart; the loop never
        // stores a system turn in task history, so mapping it to Agent is
        // unreachable in practice but keeps the match total.
        ProviderRole::System | ProviderRole::Assistant | ProviderRole::Tool { .. } => Role::Agent,
    };

    let mut parts = Vec::new();
    if !message.tool_calls.is_empty() {
        if !message.content.is_empty() {
            parts.push(Part::text(message.content.clone()));
        }
        let calls = json!(message
            .tool_calls
            .iter()
            .map(|c| json!({"id": c.id, "name": c.name, "arguments": c.arguments}))
            .collect::<Vec<_>>());
        parts.push(Part::data(json!({ "tool_calls": calls })));
    } else if let ProviderRole::Tool { call_id } = &message.role {
        parts.push(Part::data(json!({
            "tool_call_id": call_id,
            "result": message.content,
        })));
    } else {
        parts.push(Part::text(message.content.clone()));
    }

    if let Some(r) = reasoning {
        if !r.is_empty() {
            parts.push(Part::text(r.to_string()));
        }
    }

    Message::new(role, parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Message;

    #[test]
    fn round_trip_preserves_role_and_text() {
        let original = vec![Message::user_text("ping")];
        let provider = to_provider(&original);
        assert_eq!(provider[0].role, ProviderRole::User);
        let back = from_provider(&provider[0], None);
        assert_eq!(back.text_content(), "ping");
        assert_eq!(back.role, Role::User);
    }

    #[test]
    fn assistant_tool_call_round_trips_through_data_part() {
        let provider_msg = ProviderMessage {
            role: ProviderRole::Assistant,
            content: "".to_string(),
            tool_calls: vec![NativeToolCall {
                id: "call-1".into(),
                name: "echo".into(),
                arguments: json!({"message": "hello"}),
            }],
        };
        let canonical = from_provider(&provider_msg, None);
        assert!(canonical.tool_calls().is_some());
        let back = to_provider(&[canonical]);
        assert_eq!(back[0].tool_calls.len(), 1);
        assert_eq!(back[0].tool_calls[0].name, "echo");
    }

    #[test]
    fn tool_result_message_maps_to_provider_tool_role() {
        let m = Message::tool_result("call-1", "echo", "Echo: hello");
        let provider = to_provider(&[m]);
        match &provider[0].role {
            ProviderRole::Tool { call_id } => assert_eq!(call_id, "call-1"),
            other => panic!("expected tool role, got {:?}", other),
        }
        assert_eq!(provider[0].content, "Echo: hello");
    }

    #[test]
    fn reasoning_becomes_trailing_text_part() {
        let provider_msg = ProviderMessage::new(ProviderRole::Assistant, "final answer");
        let canonical = from_provider(&provider_msg, Some("because reasons"));
        assert_eq!(canonical.parts.len(), 2);
        assert_eq!(canonical.text_content(), "final answerbecause reasons");
    }
}
