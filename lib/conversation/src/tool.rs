//! Tool registry for chat runs.
//!
//! Tools are named operations the model may request while it streams. The
//! surrounding application supplies the executors; the registry resolves a
//! requested call to its executor and turns every failure into a failed
//! [`ToolResult`] so the model can decide how to respond.

use crate::error::ToolError;
use crate::message::{ToolCall, ToolResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Definition of a tool advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema for input parameters.
    pub input_schema: JsonValue,
}

impl ToolDefinition {
    /// Creates a new tool definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: JsonValue) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Trait for tool execution.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Returns the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with the given input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is invalid or the tool fails.
    async fn execute(&self, input: JsonValue) -> Result<JsonValue, ToolError>;
}

/// Registry of available tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolExecutor>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its definition name, replacing any previous one.
    pub fn register(&mut self, tool: Arc<dyn ToolExecutor>) {
        self.tools.insert(tool.definition().name, tool);
    }

    /// Registers a tool, builder style.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn ToolExecutor>) -> Self {
        self.register(tool);
        self
    }

    /// Returns the executor registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolExecutor>> {
        self.tools.get(name)
    }

    /// Returns all tool definitions, ordered by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Executes a model-requested call.
    ///
    /// Never fails: unknown tools and executor errors become failed results.
    #[tracing::instrument(skip(self, call), fields(tool = %call.name, tool_call_id = %call.id))]
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            let error = ToolError::NotFound {
                name: call.name.clone(),
            };
            tracing::warn!(%error, "model requested an unknown tool");
            return ToolResult::failure(error.to_string());
        };

        let started = Instant::now();
        let outcome = tool.execute(call.arguments.clone()).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => {
                tracing::debug!(latency_ms, "tool executed");
                ToolResult::success(value)
            }
            Err(error) => {
                tracing::warn!(%error, latency_ms, "tool execution failed, returning error to model");
                ToolResult::failure(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolExecutor for Echo {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("echo", "Echoes its input").with_input_schema(json!({
                "type": "object",
                "properties": { "value": { "type": "string" } }
            }))
        }

        async fn execute(&self, input: JsonValue) -> Result<JsonValue, ToolError> {
            input
                .get("value")
                .cloned()
                .ok_or_else(|| ToolError::InvalidInput {
                    name: "echo".to_string(),
                    reason: "missing value".to_string(),
                })
        }
    }

    #[test]
    fn registry_operations() {
        let registry = ToolRegistry::new().with_tool(Arc::new(Echo));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.definitions()[0].name, "echo");
    }

    #[tokio::test]
    async fn execute_returns_tool_output() {
        let registry = ToolRegistry::new().with_tool(Arc::new(Echo));
        let result = registry
            .execute(&ToolCall::new("c1", "echo", json!({"value": "hi"})))
            .await;
        assert!(result.is_success());
        assert_eq!(result.result, json!("hi"));
    }

    #[tokio::test]
    async fn execute_turns_tool_errors_into_failed_results() {
        let registry = ToolRegistry::new().with_tool(Arc::new(Echo));
        let result = registry
            .execute(&ToolCall::new("c1", "echo", json!({})))
            .await;
        assert!(!result.is_success());
        assert!(result.error.as_deref().unwrap_or_default().contains("missing value"));
    }

    #[tokio::test]
    async fn execute_unknown_tool_fails_without_panicking() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute(&ToolCall::new("c1", "missing", json!({})))
            .await;
        assert_eq!(result.error.as_deref(), Some("tool not found: missing"));
    }
}
