//! Agent Iteration Loop (C5): the bounded LLM↔tool cycle. Grounded in the
//! toolkit's `agent.rs::send` — the same "loop with a max-iteration cap,
//! call the LLM, detect a tool call, execute it, feed the result back"
//! shape, the same emit-an-event-at-every-step discipline — adapted from
//! agent.rs's free-text-JSON tool-call parsing to the structured Data-part
//! tool-call encoding §4.1 specifies, and extended with callback-hook
//! short-circuiting (absent from the teacher, which only observes) and
//! cooperative cancellation via a `CancellationToken` checked at every
//! suspension point (§5).

use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::convert::{from_provider, to_provider};
use crate::core::event::CloudEvent;
use crate::core::hooks::{CallbackContext, CallbackPipeline, HookPoint};
use crate::core::message::Message;
use crate::core::provider::{LlmProvider, ProviderMessage, ProviderRole, ToolDefinition};
use crate::core::store::TaskStore;
use crate::core::task::TaskState;
use crate::core::tool::{ToolRegistry, INPUT_REQUIRED_TOOL};

/// Everything one run of the loop needs that is not itself part of the
/// persistent Task Store or Tool Registry.
#[derive(Clone)]
pub struct IterationConfig {
    pub max_iter: u32,
    pub system_prompt: Option<String>,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self { max_iter: 10, system_prompt: None }
    }
}

/// Drives one user turn to completion, input-required, failure, or
/// cancellation, publishing `CloudEvent`s on `events` as it goes. Returns
/// once the task reaches a state from which no further loop progress is
/// expected within this call (it may still be resumed later on
/// `input-required`).
pub async fn run_iteration(
    task_id: &str,
    context_id: &str,
    trigger: Message,
    store: &TaskStore,
    tools: &ToolRegistry,
    provider: &dyn LlmProvider,
    hooks: &CallbackPipeline,
    config: &IterationConfig,
    cancel: CancellationToken,
    events: mpsc::Sender<CloudEvent>,
) {
    let ctx = CallbackContext::new("agentcore", task_id, context_id);
    let before_agent = serde_json::json!({ "task_id": task_id, "context_id": context_id });
    let _ = hooks.run(HookPoint::BeforeAgent, &ctx, before_agent).await;

    run_turn(task_id, context_id, trigger, store, tools, provider, hooks, config, &cancel, &events, &ctx).await;

    let final_state = store.get_task(task_id).await.ok().map(|t| t.status.state);
    let after_agent = serde_json::json!({ "task_id": task_id, "final_state": final_state });
    let _ = hooks.run(HookPoint::AfterAgent, &ctx, after_agent).await;
}

/// The per-turn loop itself, wrapped by `run_iteration`'s `BeforeAgent`/
/// `AfterAgent` firing so every return path (completion, failure,
/// input-required, cancellation) still fires `AfterAgent` exactly once.
#[allow(clippy::too_many_arguments)]
async fn run_turn(
    task_id: &str,
    context_id: &str,
    trigger: Message,
    store: &TaskStore,
    tools: &ToolRegistry,
    provider: &dyn LlmProvider,
    hooks: &CallbackPipeline,
    config: &IterationConfig,
    cancel: &CancellationToken,
    events: &mpsc::Sender<CloudEvent>,
    ctx: &CallbackContext,
) {
    store
        .update_task(task_id, TaskState::Working, None, None)
        .await
        .ok();
    let _ = events
        .send(CloudEvent::task_status_changed(
            task_id,
            &crate::core::task::TaskStatus::new(TaskState::Working),
        ))
        .await;

    let mut local_messages = store.get_history(context_id).await;
    if local_messages.last().map(|m| m.id.clone()) != Some(trigger.id.clone()) {
        local_messages.push(trigger);
    }

    let tool_defs = tool_definitions(tools).await;
    let mut last_assistant_message: Option<Message> = None;

    for iteration in 1..=config.max_iter {
        if cancel.is_cancelled() {
            cancel_task(task_id, events).await.ok();
            return;
        }

        let provider_messages = build_provider_messages(config, &local_messages);

        let before_payload = serde_json::json!({ "iteration": iteration, "messages": provider_messages });
        let model_response = match hooks.run(HookPoint::BeforeModel, ctx, before_payload).await {
            Some(short_circuit) => parse_short_circuit_response(short_circuit),
            None => match call_model(provider, &provider_messages, &tool_defs, task_id, events, cancel).await {
                Ok(resp) => resp,
                Err(e) => {
                    fail_task(task_id, &e, events, store).await;
                    return;
                }
            },
        };

        if cancel.is_cancelled() {
            cancel_task(task_id, events).await.ok();
            return;
        }

        let after_payload = serde_json::json!({ "iteration": iteration, "response": &model_response });
        let model_response = match hooks.run(HookPoint::AfterModel, ctx, after_payload).await {
            Some(replacement) => parse_short_circuit_response(replacement),
            None => model_response,
        };

        let assistant_message = from_provider(&model_response, None);
        local_messages.push(assistant_message.clone());
        store
            .append_history(context_id, vec![assistant_message.clone()])
            .await;
        last_assistant_message = Some(assistant_message.clone());

        let calls = assistant_message.tool_calls().and_then(|v| v.as_array()).cloned();
        let calls = match calls {
            Some(c) if !c.is_empty() => c,
            _ => {
                complete_task(task_id, &assistant_message, events, store).await;
                return;
            }
        };

        for call in calls {
            let tool_name = call.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let tool_call_id = call.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let arguments = call.get("arguments").cloned().unwrap_or(Value::Null);

            let before_tool = serde_json::json!({
                "tool_name": tool_name, "arguments": arguments,
            });
            if let Some(substituted) = hooks.run(HookPoint::BeforeTool, ctx, before_tool).await {
                let result_text = substituted.as_str().unwrap_or_default().to_string();
                let msg = Message::tool_result(tool_call_id, tool_name, result_text);
                local_messages.push(msg.clone());
                store.append_history(context_id, vec![msg]).await;
                continue;
            }

            if tool_name == INPUT_REQUIRED_TOOL {
                let prompt = arguments
                    .get("prompt")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Further input is required.")
                    .to_string();
                let agent_message = Message::agent_text(prompt);
                store
                    .update_task(
                        task_id,
                        TaskState::InputRequired,
                        Some(agent_message.text_content()),
                        Some(agent_message.clone()),
                    )
                    .await
                    .ok();
                let _ = events.send(CloudEvent::input_required(task_id, &agent_message)).await;
                return;
            }

            if cancel.is_cancelled() {
                cancel_task(task_id, events).await.ok();
                return;
            }

            let result = match tools.execute(&tool_name, arguments).await {
                Ok(r) => r,
                Err(e) => format!("Error: tool '{}' failed: {}", tool_name, e),
            };

            let after_tool = serde_json::json!({ "tool_name": tool_name, "result": result });
            let result = match hooks.run(HookPoint::AfterTool, ctx, after_tool).await {
                Some(replacement) => replacement.as_str().unwrap_or(&result).to_string(),
                None => result,
            };

            let msg = Message::tool_result(tool_call_id, tool_name, result);
            local_messages.push(msg.clone());
            store.append_history(context_id, vec![msg]).await;
        }
    }

    // MaxIter reached without a plain-text conclusion: complete with the
    // last message the model itself produced, not the last message in
    // history overall (which, after a tool-call turn, is the tool *result*
    // — also `Role::Agent`, but not "the last assistant message" §4.3
    // step 7 means).
    if let Some(last_assistant) = last_assistant_message {
        complete_task(task_id, &last_assistant, events, store).await;
    }
}

async fn tool_definitions(tools: &ToolRegistry) -> Vec<ToolDefinition> {
    tools
        .list()
        .await
        .into_iter()
        .map(|m| ToolDefinition {
            name: m.name.clone(),
            description: m.description.clone(),
            parameters_schema: m.parameters_schema(),
        })
        .collect()
}

fn build_provider_messages(config: &IterationConfig, messages: &[Message]) -> Vec<ProviderMessage> {
    let mut provider_messages = Vec::new();
    if let Some(prompt) = &config.system_prompt {
        provider_messages.push(ProviderMessage::new(ProviderRole::System, prompt.clone()));
    }
    provider_messages.extend(to_provider(messages));
    provider_messages
}

/// Calls the LLM, preferring streaming when the provider supports it so
/// `delta` events are published as content arrives (§4.3 step 2); falls
/// back to a single non-streaming call otherwise. Checks cancellation
/// around the suspension point.
async fn call_model(
    provider: &dyn LlmProvider,
    messages: &[ProviderMessage],
    tools: &[ToolDefinition],
    task_id: &str,
    events: &mpsc::Sender<CloudEvent>,
    cancel: &CancellationToken,
) -> Result<ProviderMessage, String> {
    let stream_result = tokio::select! {
        r = provider.send_message_stream(messages, Some(tools.to_vec())) => r,
        _ = cancel.cancelled() => return Err("cancelled".to_string()),
    };

    match stream_result {
        Ok(Some(mut stream)) => {
            let mut content = String::new();
            let mut finish_reason = None;
            while let Some(chunk) = stream.next().await {
                if cancel.is_cancelled() {
                    return Err("cancelled".to_string());
                }
                match chunk {
                    Ok(c) => {
                        content.push_str(&c.content);
                        let _ = events.send(CloudEvent::delta(task_id, &c.content)).await;
                        if c.finish_reason.is_some() {
                            finish_reason = c.finish_reason;
                        }
                    }
                    Err(e) => return Err(e.to_string()),
                }
            }
            let _ = finish_reason;
            Ok(ProviderMessage::new(ProviderRole::Assistant, content))
        }
        Ok(None) => tokio::select! {
            r = provider.send_message(messages, Some(tools.to_vec())) => r.map_err(|e| e.to_string()),
            _ = cancel.cancelled() => Err("cancelled".to_string()),
        },
        Err(e) => Err(e.to_string()),
    }
}

/// `AfterModel`/`BeforeModel` short-circuit values are plain JSON; the only
/// shape the loop accepts back is a string (the synthesized assistant
/// text) or an already-built `ProviderMessage` object.
fn parse_short_circuit_response(value: Value) -> ProviderMessage {
    if let Some(s) = value.as_str() {
        return ProviderMessage::new(ProviderRole::Assistant, s);
    }
    serde_json::from_value(value.clone())
        .unwrap_or_else(|_| ProviderMessage::new(ProviderRole::Assistant, value.to_string()))
}

async fn complete_task(task_id: &str, message: &Message, events: &mpsc::Sender<CloudEvent>, store: &TaskStore) {
    store
        .update_task(task_id, TaskState::Completed, None, None)
        .await
        .ok();
    let _ = events.send(CloudEvent::iteration_completed(task_id, message)).await;
}

async fn fail_task(task_id: &str, error: &str, events: &mpsc::Sender<CloudEvent>, store: &TaskStore) {
    store
        .update_task(task_id, TaskState::Failed, Some(error.to_string()), None)
        .await
        .ok();
    let _ = events.send(CloudEvent::stream_failed(task_id, error)).await;
}

async fn cancel_task(task_id: &str, events: &mpsc::Sender<CloudEvent>) -> Result<(), ()> {
    let _ = events.send(CloudEvent::stream_cancelled(task_id)).await;
    Ok(())
}
