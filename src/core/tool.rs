//! Tool Registry (C2): named callable tools with JSON-schema-like parameter
//! declarations, including the reserved `input_required` sentinel.
//!
//! Grounded in the toolkit's `tool_protocol.rs`: the manual `ToolError` enum
//! (no `thiserror`), the `ToolParameter`/`ToolMetadata` builder-pattern
//! structs, and the `Arc<RwLock<HashMap<...>>>`-backed registry idiom all
//! carry over. Simplified relative to the teacher's multi-protocol-routing
//! `ToolRegistry` (which federated several `ToolProtocol` backends): this
//! registry only needs register/lookup/list/execute plus the sentinel, since
//! the spec does not call for federating multiple tool backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The reserved tool name the iteration loop treats as a sentinel rather
/// than dispatching for execution.
pub const INPUT_REQUIRED_TOOL: &str = "input_required";

#[derive(Debug, Clone)]
pub enum ToolError {
    NotFound(String),
    ExecutionFailed(String),
    InvalidParameters(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "tool not found: {}", name),
            ToolError::ExecutionFailed(msg) => write!(f, "tool execution failed: {}", msg),
            ToolError::InvalidParameters(msg) => write!(f, "invalid tool parameters: {}", msg),
        }
    }
}

impl Error for ToolError {}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: ToolParameterType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: String::new(),
            required: false,
            default: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// A JSON-schema fragment describing this one parameter, for embedding
    /// in a `ToolDefinition.parameters_schema` sent to a provider.
    fn to_schema(&self) -> Value {
        let type_str = match self.param_type {
            ToolParameterType::String => "string",
            ToolParameterType::Number => "number",
            ToolParameterType::Integer => "integer",
            ToolParameterType::Boolean => "boolean",
            ToolParameterType::Array => "array",
            ToolParameterType::Object => "object",
        };
        serde_json::json!({ "type": type_str, "description": self.description })
    }
}

/// Name, description, and parameter declarations for a tool — the part a
/// provider needs to know a tool exists and how to call it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// JSON-schema-shaped parameter declaration, suitable for
    /// `ToolDefinition::parameters_schema`.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            properties.insert(p.name.clone(), p.to_schema());
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A callable tool: its metadata plus the executor backing it. `execute`
/// receives a cancellation-aware context (see `iteration::ToolContext`) and
/// returns a plain string, matching §4.2's `execute(context, arguments) →
/// string` contract.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, arguments: Value) -> Result<String, ToolError>;
}

pub struct Tool {
    pub metadata: ToolMetadata,
    executor: Arc<dyn ToolExecutor>,
}

impl Tool {
    pub fn new(metadata: ToolMetadata, executor: Arc<dyn ToolExecutor>) -> Self {
        Self { metadata, executor }
    }

    pub async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        self.executor.execute(arguments).await
    }
}

/// Read-mostly, runtime-mutable table of tools. Registrations during
/// runtime are allowed under the writer lock (§5); lookups are the hot
/// path and take a reader lock.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, tool: Tool) {
        let name = tool.metadata.name.clone();
        self.tools.write().await.insert(name, Arc::new(tool));
    }

    pub async fn lookup(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<ToolMetadata> {
        self.tools
            .read()
            .await
            .values()
            .map(|t| t.metadata.clone())
            .collect()
    }

    pub async fn execute(&self, name: &str, arguments: Value) -> Result<String, ToolError> {
        let tool = self
            .lookup(name)
            .await
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(arguments).await
    }
}

/// Wire up the `input_required` sentinel: calling it never side-effects
/// (the loop intercepts the name before dispatch — see `iteration.rs`), but
/// it is still registered so it is discoverable/describable to providers
/// like any other tool.
pub fn input_required_metadata() -> ToolMetadata {
    ToolMetadata::new(
        INPUT_REQUIRED_TOOL,
        "Pause the task and ask the user for more information.",
    )
    .with_parameter(
        ToolParameter::new("prompt", ToolParameterType::String)
            .with_description("The question to show the user.")
            .required(),
    )
}
