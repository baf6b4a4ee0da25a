//! A concrete `LlmProvider` speaking an OpenAI-compatible chat-completions
//! HTTP API. Grounded in `http_pool.rs` for connection reuse and in
//! `provider.rs`'s trait shape; this is the "plumbing around the core"
//! the spec explicitly keeps external (§1 excludes concrete client
//! libraries), so it stays a thin, single-vendor adapter rather than the
//! teacher's dispatcher over many vendor clients.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Mutex;

use crate::core::http_pool::get_or_create_client;
use crate::core::provider::{LlmProvider, NativeToolCall, ProviderMessage, ProviderRole, ToolDefinition, TokenUsage};

pub struct HttpChatProvider {
    base_url: String,
    api_key: String,
    model: String,
    timeout: std::time::Duration,
    idle_timeout: std::time::Duration,
    last_usage: Mutex<Option<TokenUsage>>,
}

impl HttpChatProvider {
    /// `idle_timeout` seeds the shared pooled client the first time this
    /// `base_url` is seen (see `http_pool::get_or_create_client`) — pass
    /// `ServerConfig::http_idle_timeout_secs`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: std::time::Duration,
        idle_timeout: std::time::Duration,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
            idle_timeout,
            last_usage: Mutex::new(None),
        }
    }

    fn to_wire_role(role: &ProviderRole) -> &'static str {
        match role {
            ProviderRole::System => "system",
            ProviderRole::User => "user",
            ProviderRole::Assistant => "assistant",
            ProviderRole::Tool { .. } => "tool",
        }
    }

    fn to_wire_messages(messages: &[ProviderMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                let mut obj = json!({
                    "role": Self::to_wire_role(&m.role),
                    "content": m.content,
                });
                if let ProviderRole::Tool { call_id } = &m.role {
                    obj["tool_call_id"] = json!(call_id);
                }
                if !m.tool_calls.is_empty() {
                    obj["tool_calls"] = json!(m
                        .tool_calls
                        .iter()
                        .map(|c| json!({
                            "id": c.id,
                            "type": "function",
                            "function": {"name": c.name, "arguments": c.arguments.to_string()},
                        }))
                        .collect::<Vec<_>>());
                }
                obj
            })
            .collect()
    }

    fn to_wire_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {"name": t.name, "description": t.description, "parameters": t.parameters_schema},
                })
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for HttpChatProvider {
    async fn send_message(
        &self,
        messages: &[ProviderMessage],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ProviderMessage, Box<dyn Error + Send + Sync>> {
        let client = get_or_create_client(&self.base_url, self.idle_timeout);
        let mut body = json!({
            "model": self.model,
            "messages": Self::to_wire_messages(messages),
        });
        if let Some(tools) = &tools {
            if !tools.is_empty() {
                body["tools"] = json!(Self::to_wire_tools(tools));
            }
        }

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        if let Ok(mut slot) = self.last_usage.lock() {
            *slot = payload.get("usage").and_then(|u| serde_json::from_value(u.clone()).ok());
        }

        let choice = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or("provider response missing choices[0].message")?;

        let content = choice.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let tool_calls = choice
            .get("tool_calls")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|c| {
                        let function = c.get("function")?;
                        let arguments_str = function.get("arguments")?.as_str()?;
                        Some(NativeToolCall {
                            id: c.get("id")?.as_str()?.to_string(),
                            name: function.get("name")?.as_str()?.to_string(),
                            arguments: serde_json::from_str(arguments_str).unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ProviderMessage { role: ProviderRole::Assistant, content, tool_calls })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.last_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_role_mapping_matches_openai_vocabulary() {
        assert_eq!(HttpChatProvider::to_wire_role(&ProviderRole::User), "user");
        assert_eq!(
            HttpChatProvider::to_wire_role(&ProviderRole::Tool { call_id: "x".into() }),
            "tool"
        );
    }

    #[test]
    fn wire_messages_carry_tool_call_id() {
        let messages = vec![ProviderMessage::new(ProviderRole::Tool { call_id: "c1".into() }, "result")];
        let wire = HttpChatProvider::to_wire_messages(&messages);
        assert_eq!(wire[0]["tool_call_id"], "c1");
    }
}
