//! Black-box end-to-end tests driving a started server over real HTTP:
//! echo completion, a single tool call, input-required pausing, the
//! MaxIter bound, and push notification delivery. Cancellation is covered
//! only at the unit level (`core::iteration::tests::cancellation_stops_the_loop_promptly`)
//! — `ScriptedProvider` answers synchronously, so there is no suspension
//! point left over HTTP to race a `tasks/cancel` call against. Companion to
//! the white-box unit tests in `src/core/iteration.rs`, which exercise the
//! same loop-internal scenarios directly against `run_iteration` without
//! the HTTP/JSON-RPC layer in between.

use std::sync::Arc;
use std::time::Duration;

use agentcore::core::config::ServerConfig;
use agentcore::core::protocol::{AgentCard, AgentCardCapabilities};
use agentcore::core::provider::test_support::ScriptedProvider;
use agentcore::core::provider::{ProviderMessage, ProviderRole};
use agentcore::core::server::ServerBuilder;
use agentcore::core::tool::{Tool, ToolError, ToolExecutor, ToolMetadata, ToolParameter, ToolParameterType};
use async_trait::async_trait;
use serde_json::{json, Value};

fn test_card() -> AgentCard {
    AgentCard {
        name: "integration-test-agent".into(),
        description: "scenario coverage".into(),
        version: "0.1.0".into(),
        url: "http://127.0.0.1:0".into(),
        protocol_version: "1.0".into(),
        capabilities: AgentCardCapabilities {
            streaming: true,
            push_notifications: true,
            state_transition_history: true,
        },
        default_input_modes: vec!["text".into()],
        default_output_modes: vec!["text".into()],
        skills: vec![],
    }
}

/// Answers after a short delay so a test can register a push config
/// against a queued task before it reaches a terminal state.
struct SlowProvider {
    reply: ProviderMessage,
    delay: Duration,
}

#[async_trait]
impl agentcore::core::provider::LlmProvider for SlowProvider {
    async fn send_message(
        &self,
        _messages: &[ProviderMessage],
        _tools: Option<Vec<agentcore::core::provider::ToolDefinition>>,
    ) -> Result<ProviderMessage, Box<dyn std::error::Error + Send + Sync>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "slow-test-model"
    }
}

struct EchoTool;

#[async_trait]
impl ToolExecutor for EchoTool {
    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        Ok(format!("echoed: {}", arguments.get("text").and_then(|v| v.as_str()).unwrap_or_default()))
    }
}

fn echo_tool() -> Tool {
    let metadata = ToolMetadata::new("echo", "Echoes back the given text").with_parameter(
        ToolParameter::new("text", ToolParameterType::String)
            .with_description("text to echo")
            .required(),
    );
    Tool::new(metadata, Arc::new(EchoTool))
}

async fn rpc(base: &str, method: &str, params: Value) -> Value {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/a2a"))
        .json(&json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1}))
        .send()
        .await
        .expect("request should succeed");
    response.json().await.expect("response should be json")
}

#[tokio::test]
async fn echo_completion_end_to_end() {
    let provider = Arc::new(ScriptedProvider::new(vec![ProviderMessage::new(ProviderRole::Assistant, "hello back")]));
    let server = ServerBuilder::new(ServerConfig::default())
        .with_agent_card(test_card())
        .with_provider(provider)
        .start_on(0)
        .await
        .unwrap();
    let base = format!("http://{}", server.addr());

    let response = rpc(&base, "message/send", json!({"message": {"text": "hi"}, "blocking": true})).await;
    let task = &response["result"];
    assert_eq!(task["status"]["state"], "completed");

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn tool_call_then_completion_end_to_end() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        ProviderMessage {
            role: ProviderRole::Assistant,
            content: String::new(),
            tool_calls: vec![agentcore::core::provider::NativeToolCall {
                id: "call-1".into(),
                name: "echo".into(),
                arguments: json!({"text": "ping"}),
            }],
        },
        ProviderMessage::new(ProviderRole::Assistant, "done"),
    ]));
    let server = ServerBuilder::new(ServerConfig::default())
        .with_agent_card(test_card())
        .with_tool(echo_tool())
        .await
        .with_provider(provider)
        .start_on(0)
        .await
        .unwrap();
    let base = format!("http://{}", server.addr());

    let response = rpc(&base, "message/send", json!({"message": {"text": "go"}, "blocking": true})).await;
    assert_eq!(response["result"]["status"]["state"], "completed");

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn input_required_pauses_the_task_end_to_end() {
    let provider = Arc::new(ScriptedProvider::new(vec![ProviderMessage {
        role: ProviderRole::Assistant,
        content: String::new(),
        tool_calls: vec![agentcore::core::provider::NativeToolCall {
            id: "call-1".into(),
            name: agentcore::core::tool::INPUT_REQUIRED_TOOL.into(),
            arguments: json!({"prompt": "which destination?"}),
        }],
    }]));
    let server = ServerBuilder::new(ServerConfig::default())
        .with_agent_card(test_card())
        .with_provider(provider)
        .start_on(0)
        .await
        .unwrap();
    let base = format!("http://{}", server.addr());

    let response = rpc(&base, "message/send", json!({"message": {"text": "plan a trip"}, "blocking": true})).await;
    assert_eq!(response["result"]["status"]["state"], "input-required");

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn max_iter_bound_is_respected_end_to_end() {
    let provider = Arc::new(ScriptedProvider::new(vec![ProviderMessage {
        role: ProviderRole::Assistant,
        content: String::new(),
        tool_calls: vec![agentcore::core::provider::NativeToolCall {
            id: "call-x".into(),
            name: "echo".into(),
            arguments: json!({"text": "again"}),
        }],
    }]));
    let mut config = ServerConfig::default();
    config.max_iter = 3;
    let server = ServerBuilder::new(config)
        .with_agent_card(test_card())
        .with_tool(echo_tool())
        .await
        .with_provider(provider.clone())
        .start_on(0)
        .await
        .unwrap();
    let base = format!("http://{}", server.addr());

    let response = rpc(&base, "message/send", json!({"message": {"text": "loop forever"}, "blocking": true})).await;
    assert_eq!(response["result"]["status"]["state"], "completed");
    assert_eq!(provider.calls_made(), 3);

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn push_notification_is_delivered_on_task_completion() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use axum::routing::post;
    use axum::Router;

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_for_handler = hits.clone();
    let webhook = Router::new().route(
        "/hook",
        post(move || {
            let hits = hits_for_handler.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                axum::http::StatusCode::OK
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let webhook_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, webhook).await;
    });

    let provider = Arc::new(SlowProvider {
        reply: ProviderMessage::new(ProviderRole::Assistant, "hello back"),
        delay: Duration::from_millis(150),
    });
    let server = ServerBuilder::new(ServerConfig::default())
        .with_agent_card(test_card())
        .with_provider(provider)
        .start_on(0)
        .await
        .unwrap();
    let base = format!("http://{}", server.addr());

    let send_response = rpc(&base, "message/send", json!({"message": {"text": "hi"}, "blocking": false})).await;
    let task_id = send_response["result"]["id"].as_str().unwrap().to_string();

    rpc(
        &base,
        "tasks/pushNotificationConfig/set",
        json!({"id": "webhook-1", "task_id": task_id, "url": format!("http://{}/hook", webhook_addr)}),
    )
    .await;

    let mut delivered = 0;
    for _ in 0..200 {
        delivered = hits.load(Ordering::SeqCst);
        if delivered > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(delivered > 0, "webhook should have received at least one delivery");

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn unknown_task_lookup_returns_canonical_error_code() {
    let provider = Arc::new(ScriptedProvider::new(vec![ProviderMessage::new(ProviderRole::Assistant, "hi")]));
    let server = ServerBuilder::new(ServerConfig::default())
        .with_agent_card(test_card())
        .with_provider(provider)
        .start_on(0)
        .await
        .unwrap();
    let base = format!("http://{}", server.addr());

    let response = rpc(&base, "tasks/get", json!({"task_id": "does-not-exist"})).await;
    assert_eq!(response["error"]["code"], -32001);

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn agent_card_is_served_at_well_known_path() {
    let provider = Arc::new(ScriptedProvider::new(vec![ProviderMessage::new(ProviderRole::Assistant, "hi")]));
    let server = ServerBuilder::new(ServerConfig::default())
        .with_agent_card(test_card())
        .with_provider(provider)
        .start_on(0)
        .await
        .unwrap();
    let base = format!("http://{}", server.addr());

    let card: Value = reqwest::get(format!("{base}/.well-known/agent-card.json"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(card["name"], "integration-test-agent");
    assert_eq!(card["capabilities"]["streaming"], true);

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn health_endpoint_reports_queue_and_uptime() {
    let provider = Arc::new(ScriptedProvider::new(vec![ProviderMessage::new(ProviderRole::Assistant, "hi")]));
    let server = ServerBuilder::new(ServerConfig::default())
        .with_agent_card(test_card())
        .with_provider(provider)
        .start_on(0)
        .await
        .unwrap();
    let base = format!("http://{}", server.addr());

    let health: Value = reqwest::get(format!("{base}/health")).await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert!(health["uptime_secs"].is_number());

    server.shutdown(Duration::from_secs(1)).await;
}
