//! Error types for the conversation crate.
//!
//! Tool errors never reach the client: the registry converts them into
//! failed tool results that are fed back to the model.

use std::fmt;

/// Errors from tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool not found.
    NotFound { name: String },
    /// Tool execution failed.
    ExecutionFailed { name: String, reason: String },
    /// Invalid tool input.
    InvalidInput { name: String, reason: String },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "tool not found: {name}"),
            Self::ExecutionFailed { name, reason } => {
                write!(f, "tool '{name}' execution failed: {reason}")
            }
            Self::InvalidInput { name, reason } => {
                write!(f, "invalid input for tool '{name}': {reason}")
            }
        }
    }
}

impl std::error::Error for ToolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_display() {
        let err = ToolError::ExecutionFailed {
            name: "get_cloud_resources".to_string(),
            reason: "timeout".to_string(),
        };
        assert!(err.to_string().contains("get_cloud_resources"));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn invalid_input_display() {
        let err = ToolError::InvalidInput {
            name: "echo".to_string(),
            reason: "missing value".to_string(),
        };
        assert_eq!(err.to_string(), "invalid input for tool 'echo': missing value");
    }
}
