//! Conversation model for the atelier chat pipeline.
//!
//! This crate provides:
//!
//! - **Messages**: Ordered, typed message parts as exchanged with the UI
//! - **Normalizer**: Rewrites structured parts into model-consumable text
//! - **Tool Registry**: Executors the model may invoke during a run

pub mod error;
pub mod message;
pub mod normalize;
pub mod tool;

pub use error::ToolError;
pub use message::{
    Conversation, ErrorReport, Message, MessageRole, Part, ToolCall, ToolInvocation, ToolResult,
};
pub use normalize::{normalize, normalize_message, render_error_report};
pub use tool::{ToolDefinition, ToolExecutor, ToolRegistry};
