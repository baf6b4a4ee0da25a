// src/lib.rs
pub mod core;

pub use core::config::ServerConfig;
pub use core::error::CoreError;
pub use core::event::{CloudEvent, CloudEventType};
pub use core::message::{Message, Part, Role};
pub use core::protocol::AgentCard;
pub use core::provider::LlmProvider;
pub use core::server::{RunningServer, ServerBuilder};
pub use core::task::{Task, TaskState};
pub use core::tool::{Tool, ToolExecutor, ToolRegistry};
