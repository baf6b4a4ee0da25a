//! Callback Pipeline (C10): Before/After hooks at Agent, Model, and Tool
//! boundaries with short-circuit semantics (§4.8).
//!
//! Generalized from the toolkit's `event.rs` `EventHandler` trait shape —
//! an async trait with default no-op methods, invoked in registration
//! order — but where the teacher's handler is pure observability (returns
//! nothing), these hooks can short-circuit: a non-null return from a Before
//! hook replaces the guarded operation, and a non-null return from an After
//! hook replaces its output. Per §9's "pass an explicit callback-context
//! struct; do not rely on ambient state", every hook receives a
//! `CallbackContext` rather than reading agent-local fields.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Context passed to every callback: identifies the boundary being guarded
/// and carries a mutable per-task scratch map callbacks may use to
/// communicate with each other across the same iteration.
pub struct CallbackContext {
    pub agent_name: String,
    pub task_id: String,
    pub context_id: String,
    pub state: Arc<Mutex<HashMap<String, Value>>>,
}

impl CallbackContext {
    pub fn new(agent_name: impl Into<String>, task_id: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            task_id: task_id.into(),
            context_id: context_id.into(),
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// One callback registered at a hook point. Returning `Some(value)`
/// short-circuits (Before) or replaces (After) the guarded payload;
/// `None` preserves it and lets the chain continue.
#[async_trait]
pub trait Callback: Send + Sync {
    async fn call(&self, ctx: &CallbackContext, payload: Value) -> Option<Value>;
}

#[async_trait]
impl<F> Callback for F
where
    F: Fn(&CallbackContext, Value) -> Option<Value> + Send + Sync,
{
    async fn call(&self, ctx: &CallbackContext, payload: Value) -> Option<Value> {
        self(ctx, payload)
    }
}

/// The six hook points named in §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeAgent,
    AfterAgent,
    BeforeModel,
    AfterModel,
    BeforeTool,
    AfterTool,
}

#[derive(Default)]
pub struct CallbackPipeline {
    callbacks: HashMap<HookPoint, Vec<Arc<dyn Callback>>>,
}

impl CallbackPipeline {
    pub fn new() -> Self {
        Self { callbacks: HashMap::new() }
    }

    pub fn register(&mut self, point: HookPoint, callback: Arc<dyn Callback>) {
        self.callbacks.entry(point).or_default().push(callback);
    }

    /// Runs every callback at `point` in registration order. Returns the
    /// first non-null result, or `None` if every callback passed through.
    pub async fn run(&self, point: HookPoint, ctx: &CallbackContext, payload: Value) -> Option<Value> {
        if let Some(chain) = self.callbacks.get(&point) {
            for cb in chain {
                if let Some(result) = cb.call(ctx, payload.clone()).await {
                    return Some(result);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysShortCircuit(Value);

    #[async_trait]
    impl Callback for AlwaysShortCircuit {
        async fn call(&self, _ctx: &CallbackContext, _payload: Value) -> Option<Value> {
            Some(self.0.clone())
        }
    }

    struct AlwaysPassThrough;

    #[async_trait]
    impl Callback for AlwaysPassThrough {
        async fn call(&self, _ctx: &CallbackContext, _payload: Value) -> Option<Value> {
            None
        }
    }

    #[tokio::test]
    async fn first_non_null_short_circuits() {
        let mut pipeline = CallbackPipeline::new();
        pipeline.register(HookPoint::BeforeModel, Arc::new(AlwaysPassThrough));
        pipeline.register(
            HookPoint::BeforeModel,
            Arc::new(AlwaysShortCircuit(serde_json::json!("short-circuited"))),
        );
        let ctx = CallbackContext::new("agent-1", "task-1", "ctx-1");
        let result = pipeline
            .run(HookPoint::BeforeModel, &ctx, serde_json::json!("original"))
            .await;
        assert_eq!(result, Some(serde_json::json!("short-circuited")));
    }

    #[tokio::test]
    async fn no_callbacks_preserves_payload() {
        let pipeline = CallbackPipeline::new();
        let ctx = CallbackContext::new("agent-1", "task-1", "ctx-1");
        let result = pipeline
            .run(HookPoint::AfterTool, &ctx, serde_json::json!("original"))
            .await;
        assert_eq!(result, None);
    }
}
