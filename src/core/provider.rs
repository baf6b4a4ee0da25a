//! The LLM provider boundary: the wire-format types a concrete provider
//! speaks, and the async trait the Agent Iteration Loop calls through.
//!
//! Grounded directly in the vendored toolkit's `client_wrapper.rs`: the
//! shape of `ClientWrapper` (async `send_message`, optional streaming via a
//! boxed future returning a boxed stream, `model_name`, `get_last_usage`)
//! carries over essentially unchanged. What changes is the canonical
//! `core::message::Message` feeding it — that type is richer (tagged Part
//! variants) than this teacher's flat `content: Arc<str>`, which is exactly
//! why `convert.rs` exists as a separate boundary.

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::pin::Pin;
use std::sync::Mutex;

/// A tool call as the provider's wire format represents it: an opaque id
/// plus a name and JSON arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A tool declaration sent to the provider alongside the conversation so the
/// model knows what it may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
}

/// Provider-side role vocabulary — richer than `core::message::Role`: the
/// provider distinguishes `system`, `user`, `assistant`, and `tool` (the
/// latter carrying the call it answers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    System,
    User,
    Assistant,
    Tool { call_id: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A single message in the provider's own wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: ProviderRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<NativeToolCall>,
}

impl ProviderMessage {
    pub fn new(role: ProviderRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// One incremental chunk of a streaming completion.
#[derive(Debug, Clone)]
pub struct MessageChunk {
    pub content: String,
    pub finish_reason: Option<String>,
}

pub type MessageChunkStream =
    Pin<Box<dyn Stream<Item = Result<MessageChunk, Box<dyn Error + Send + Sync>>> + Send>>;

pub type MessageStreamFuture<'a> = Pin<
    Box<dyn std::future::Future<Output = Result<Option<MessageChunkStream>, Box<dyn Error + Send + Sync>>>
        + Send
        + 'a>,
>;

/// The contract the Agent Iteration Loop calls through to reach an LLM.
/// Concrete providers (OpenAI-compatible HTTP, a local model, a test
/// fixture) implement this trait; the loop never depends on a concrete
/// provider type.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Non-streaming completion: send the full conversation, get back one
    /// complete assistant message.
    async fn send_message(
        &self,
        messages: &[ProviderMessage],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ProviderMessage, Box<dyn Error + Send + Sync>>;

    /// Streaming completion. Default: providers that do not support
    /// streaming return `Ok(None)`, and the loop falls back to
    /// `send_message`.
    fn send_message_stream<'a>(
        &'a self,
        _messages: &'a [ProviderMessage],
        _tools: Option<Vec<ToolDefinition>>,
    ) -> MessageStreamFuture<'a> {
        Box::pin(async { Ok(None) })
    }

    fn model_name(&self) -> &str;

    async fn get_last_usage(&self) -> Option<TokenUsage> {
        match self.usage_slot() {
            Some(slot) => slot.lock().ok().and_then(|g| g.clone()),
            None => None,
        }
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}

/// A scripted provider for driving the iteration loop in tests without a
/// live LLM endpoint. Left unconditionally public (rather than
/// `#[cfg(test)]`) so black-box tests under `tests/` can reach it too.
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A scripted provider used across unit and scenario tests: returns one
    /// `ProviderMessage` per call, advancing through a fixed script, then
    /// repeating the last response.
    pub struct ScriptedProvider {
        script: Vec<ProviderMessage>,
        call_count: AtomicUsize,
    }

    impl ScriptedProvider {
        pub fn new(script: Vec<ProviderMessage>) -> Self {
            Self {
                script,
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn calls_made(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn send_message(
            &self,
            _messages: &[ProviderMessage],
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<ProviderMessage, Box<dyn Error + Send + Sync>> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            let reply = self
                .script
                .get(idx)
                .or_else(|| self.script.last())
                .cloned()
                .ok_or_else(|| -> Box<dyn Error + Send + Sync> { "empty script".into() })?;
            Ok(reply)
        }

        fn model_name(&self) -> &str {
            "scripted-test-model"
        }
    }
}
