//! Streaming Protocol Handler (C6): a single JSON-RPC 2.0 endpoint that maps
//! method calls to Task Store operations, an SSE multiplexer for
//! `message/stream`, the agent card, and a health record.
//!
//! Grounded in the toolkit's `mcp_http_adapter.rs`: the same shape of
//! "build an `axum::Router`, delegate each route to a method on the
//! handler, answer with `axum::Json`/`StatusCode`" carries over, generalized
//! from that file's four fixed tool routes into a JSON-RPC method table
//! dispatched from one `POST /a2a` route, with a second route switched to
//! `text/event-stream` for `message/stream`.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;
use tokio_util::sync::CancellationToken;

use crate::core::auth::Authenticator;
use crate::core::convert;
use crate::core::error::CoreError;
use crate::core::hooks::CallbackPipeline;
use crate::core::iteration::{run_iteration, IterationConfig};
use crate::core::message::{Message, Part, Role};
use crate::core::provider::LlmProvider;
use crate::core::queue::{InMemoryQueue, QueueEntry, QueueProvider};
use crate::core::store::TaskStore;
use crate::core::task::{PushNotificationConfig, Task, TaskFilter, TaskState};
use crate::core::tool::ToolRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCardCapabilities {
    pub streaming: bool,
    pub push_notifications: bool,
    pub state_transition_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSkill {
    pub name: String,
    pub description: String,
}

/// `GET /.well-known/agent-card.json` (§4.6, §6). Required before the
/// server may start (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub version: String,
    pub url: String,
    pub protocol_version: String,
    pub capabilities: AgentCardCapabilities,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
    pub skills: Vec<AgentSkill>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Serialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn err(id: Value, e: CoreError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcErrorBody { code: e.code(), message: e.to_string() }),
        }
    }
}

/// The assembled set of collaborators the protocol handler dispatches to.
/// Held behind an `Arc` and cloned into every axum handler, per the
/// "single server object owns lifecycle, no process-level singletons"
/// design note (§9).
pub struct ProtocolHandler {
    pub store: Arc<TaskStore>,
    pub tools: Arc<ToolRegistry>,
    pub provider: Arc<dyn LlmProvider>,
    pub hooks: Arc<CallbackPipeline>,
    pub queue: Arc<InMemoryQueue>,
    pub authenticator: Arc<dyn Authenticator>,
    pub agent_card: AgentCard,
    pub iteration_config: IterationConfig,
    pub started_at: Instant,
    /// Count of iterations currently executing (blocking sends, streamed
    /// sends, and queued work all increment/decrement this around their
    /// call to `run_iteration`). Queue depth itself is read directly off
    /// the channel via `InMemoryQueue::depth`, not tracked here.
    pub active_tasks: Arc<AtomicU64>,
}

/// RAII guard incrementing `active_tasks` on construction and decrementing
/// it on drop, so every exit path out of an iteration call — including an
/// early `?` or panic unwind — still decrements.
pub struct ActiveTaskGuard(Arc<AtomicU64>);

impl ActiveTaskGuard {
    pub fn start(counter: Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ActiveTaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

pub fn build_router(handler: Arc<ProtocolHandler>) -> Router {
    Router::new()
        .route("/a2a", post(handle_rpc))
        .route("/.well-known/agent-card.json", get(handle_agent_card))
        .route("/health", get(handle_health))
        .with_state(handler)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get("authorization").and_then(|v| v.to_str().ok())
}

async fn handle_rpc(
    State(handler): State<Arc<ProtocolHandler>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if !handler.authenticator.validate(extract_bearer(&headers)) {
        let resp = JsonRpcResponse::err(Value::Null, CoreError::AuthenticationRequired("missing or invalid bearer token".into()));
        return (StatusCode::UNAUTHORIZED, Json(resp)).into_response();
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            let resp = JsonRpcResponse::err(Value::Null, CoreError::ParseError(e.to_string()));
            return (StatusCode::BAD_REQUEST, Json(resp)).into_response();
        }
    };

    if request.method == "message/stream" {
        return handle_message_stream(handler, request).await.into_response();
    }

    let id = request.id.clone();
    let result = dispatch(&handler, request).await;
    match result {
        Ok(value) => (StatusCode::OK, Json(JsonRpcResponse::ok(id, value))).into_response(),
        Err(e) => {
            let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(JsonRpcResponse::err(id, e))).into_response()
        }
    }
}

async fn dispatch(handler: &Arc<ProtocolHandler>, request: JsonRpcRequest) -> Result<Value, CoreError> {
    match request.method.as_str() {
        "message/send" => message_send(handler, request.params).await,
        "tasks/get" => tasks_get(handler, request.params).await,
        "tasks/cancel" => tasks_cancel(handler, request.params).await,
        "tasks/list" => tasks_list(handler, request.params).await,
        "tasks/pushNotificationConfig/set" => push_config_set(handler, request.params).await,
        "tasks/pushNotificationConfig/get" => push_config_get(handler, request.params).await,
        "tasks/pushNotificationConfig/list" => push_config_list(handler, request.params).await,
        "tasks/pushNotificationConfig/delete" => push_config_delete(handler, request.params).await,
        other => Err(CoreError::MethodNotFound(other.to_string())),
    }
}

#[derive(Deserialize)]
struct SendParams {
    message: IncomingMessage,
    #[serde(default)]
    blocking: bool,
}

/// The wire shape of an incoming `message/send` / `message/stream` message.
/// `parts` carries the full Part model (§3 — text, file, or structured
/// data); `text` is sugar for callers that only ever send one Text part.
/// When both are given, `parts` wins.
#[derive(Deserialize)]
struct IncomingMessage {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    context_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl IncomingMessage {
    fn into_parts(&self) -> Vec<Part> {
        if !self.parts.is_empty() {
            self.parts.clone()
        } else {
            vec![Part::text(self.text.clone().unwrap_or_default())]
        }
    }
}

fn new_context_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Creates or resumes a task, then either runs the iteration synchronously
/// (`blocking: true`) or enqueues it for background execution (§4.6).
async fn message_send(handler: &Arc<ProtocolHandler>, params: Value) -> Result<Value, CoreError> {
    let params: SendParams = serde_json::from_value(params).map_err(|e| CoreError::InvalidParams(e.to_string()))?;
    let (task, context_id, trigger) = resume_or_create(handler, &params.message).await?;

    let cancel = CancellationToken::new();
    if params.blocking {
        let (tx, _rx) = mpsc::channel(256);
        let _active = ActiveTaskGuard::start(handler.active_tasks.clone());
        // Every state-changing `TaskStore::update_task` call inside the loop
        // fans its own push notification out (`TaskStore::fan_out_push`), so
        // nothing further is dispatched after it returns.
        run_iteration(
            &task.id,
            &context_id,
            trigger,
            &handler.store,
            &handler.tools,
            handler.provider.as_ref(),
            &handler.hooks,
            &handler.iteration_config,
            cancel,
            tx,
        )
        .await;
        drop(_active);
    } else {
        handler
            .queue
            .enqueue(QueueEntry { task_id: task.id.clone(), context_id: context_id.clone(), message: trigger, cancel })
            .await
            .map_err(CoreError::from)?;
    }

    let snapshot = handler.store.get_task(&task.id).await.map_err(CoreError::from)?;
    Ok(serde_json::to_value(snapshot).unwrap())
}

async fn resume_or_create(
    handler: &Arc<ProtocolHandler>,
    message: &IncomingMessage,
) -> Result<(Task, String, Message), CoreError> {
    let parts = message.into_parts();
    let trigger = Message::new(Role::User, parts);
    trigger.validate().map_err(CoreError::InvalidParams)?;

    match &message.task_id {
        Some(task_id) => {
            let task = handler.store.get_task(task_id).await.map_err(CoreError::from)?;
            let trigger = trigger.with_task(task_id.clone()).with_context(task.context_id.clone());
            handler.store.update_task(task_id, TaskState::Working, None, Some(trigger.clone())).await.map_err(CoreError::from)?;
            let context_id = task.context_id.clone();
            Ok((task, context_id, trigger))
        }
        None => {
            let context_id = message.context_id.clone().unwrap_or_else(new_context_id);
            let task = handler.store.create_task(&context_id, trigger.clone()).await;
            Ok((task, context_id, trigger))
        }
    }
}

async fn handle_message_stream(handler: Arc<ProtocolHandler>, request: JsonRpcRequest) -> impl IntoResponse {
    let params: SendParams = match serde_json::from_value(request.params) {
        Ok(p) => p,
        Err(e) => {
            let resp = JsonRpcResponse::err(request.id, CoreError::InvalidParams(e.to_string()));
            return (StatusCode::BAD_REQUEST, Json(resp)).into_response();
        }
    };

    let (task, context_id, trigger) = match resume_or_create(&handler, &params.message).await {
        Ok(v) => v,
        Err(e) => {
            let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, Json(JsonRpcResponse::err(request.id, e))).into_response();
        }
    };

    let (tx, rx) = mpsc::channel(256);
    let cancel = CancellationToken::new();
    let cancel_for_loop = cancel.clone();
    let task_id = task.id.clone();
    let store = handler.store.clone();
    let tools = handler.tools.clone();
    let provider = handler.provider.clone();
    let hooks = handler.hooks.clone();
    let config_clone = handler.iteration_config.clone();
    let active_tasks = handler.active_tasks.clone();

    tokio::spawn(async move {
        let _active = ActiveTaskGuard::start(active_tasks);
        // Every state-changing `TaskStore::update_task` call inside the loop
        // fans its own push notification out (`TaskStore::fan_out_push`).
        run_iteration(
            &task_id,
            &context_id,
            trigger,
            &store,
            &tools,
            provider.as_ref(),
            &hooks,
            &config_clone,
            cancel_for_loop,
            tx,
        )
        .await;
        drop(_active);
    });

    // The cancellation guard is dropped (cancelling the loop) when the SSE
    // response body itself is dropped, i.e. on client disconnect (§4.6,
    // §5's "client disconnect" cancellation trigger).
    let guard = CancelOnDrop(cancel);
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _keep_alive = &guard;
        Ok::<_, Infallible>(Event::default().data(serde_json::to_string(&event).unwrap_or_default()))
    });

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

struct CancelOnDrop(CancellationToken);
impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[derive(Deserialize)]
struct TaskIdParams {
    task_id: String,
}

async fn tasks_get(handler: &Arc<ProtocolHandler>, params: Value) -> Result<Value, CoreError> {
    let p: TaskIdParams = serde_json::from_value(params).map_err(|e| CoreError::InvalidParams(e.to_string()))?;
    let task = handler.store.get_task(&p.task_id).await.map_err(CoreError::from)?;
    Ok(serde_json::to_value(task).unwrap())
}

async fn tasks_cancel(handler: &Arc<ProtocolHandler>, params: Value) -> Result<Value, CoreError> {
    let p: TaskIdParams = serde_json::from_value(params).map_err(|e| CoreError::InvalidParams(e.to_string()))?;
    let task = handler.store.cancel_task(&p.task_id).await.map_err(CoreError::from)?;
    Ok(serde_json::to_value(task).unwrap())
}

#[derive(Deserialize, Default)]
struct ListParams {
    context_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    crate::core::task::DEFAULT_LIST_LIMIT
}

async fn tasks_list(handler: &Arc<ProtocolHandler>, params: Value) -> Result<Value, CoreError> {
    let p: ListParams = if params.is_null() { ListParams::default() } else {
        serde_json::from_value(params).map_err(|e| CoreError::InvalidParams(e.to_string()))?
    };
    let filter = TaskFilter { context_id: p.context_id, state: None };
    let page = handler.store.list_tasks(filter, p.limit, p.offset).await;
    Ok(json!({ "tasks": page.items, "total": page.total, "limit": page.limit, "offset": page.offset }))
}

async fn push_config_set(handler: &Arc<ProtocolHandler>, params: Value) -> Result<Value, CoreError> {
    let config: PushNotificationConfig = serde_json::from_value(params).map_err(|e| CoreError::InvalidParams(e.to_string()))?;
    let stored = handler.store.set_push_config(config).await;
    Ok(serde_json::to_value(stored).unwrap())
}

#[derive(Deserialize)]
struct PushGetParams {
    task_id: String,
    #[serde(default)]
    config_id: Option<String>,
}

async fn push_config_get(handler: &Arc<ProtocolHandler>, params: Value) -> Result<Value, CoreError> {
    let p: PushGetParams = serde_json::from_value(params).map_err(|e| CoreError::InvalidParams(e.to_string()))?;
    let config = handler.store.get_push_config(&p.task_id, p.config_id.as_deref()).await.map_err(CoreError::from)?;
    Ok(serde_json::to_value(config).unwrap())
}

async fn push_config_list(handler: &Arc<ProtocolHandler>, params: Value) -> Result<Value, CoreError> {
    let p: TaskIdParams = serde_json::from_value(params).map_err(|e| CoreError::InvalidParams(e.to_string()))?;
    let configs = handler.store.list_push_configs(&p.task_id).await;
    Ok(serde_json::to_value(configs).unwrap())
}

#[derive(Deserialize)]
struct PushDeleteParams {
    task_id: String,
    config_id: String,
}

async fn push_config_delete(handler: &Arc<ProtocolHandler>, params: Value) -> Result<Value, CoreError> {
    let p: PushDeleteParams = serde_json::from_value(params).map_err(|e| CoreError::InvalidParams(e.to_string()))?;
    handler.store.delete_push_config(&p.task_id, &p.config_id).await.map_err(CoreError::from)?;
    Ok(json!({ "ack": true }))
}

async fn handle_agent_card(State(handler): State<Arc<ProtocolHandler>>) -> Json<AgentCard> {
    Json(handler.agent_card.clone())
}

#[derive(Serialize)]
struct HealthRecord {
    status: &'static str,
    queue_depth: u64,
    active_tasks: u64,
    uptime_secs: u64,
}

async fn handle_health(State(handler): State<Arc<ProtocolHandler>>) -> Json<HealthRecord> {
    Json(HealthRecord {
        status: "ok",
        queue_depth: handler.queue.depth(),
        active_tasks: handler.active_tasks.load(Ordering::Relaxed),
        uptime_secs: handler.started_at.elapsed().as_secs(),
    })
}

// Keep `convert` reachable from this module's public surface for callers
// that translate a raw provider payload before handing it to `message/send`.
pub use convert::{from_provider, to_provider};
