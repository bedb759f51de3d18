//! Message types for conversations.
//!
//! A conversation is an ordered list of [`Message`]s, each carrying an
//! ordered list of typed [`Part`]s. The JSON shape matches what the browser
//! UI sends: parts are tagged by a `type` field and use camelCase keys.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// An ordered sequence of messages.
pub type Conversation = Vec<Message>;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
    /// System message.
    System,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Client-assigned message identifier.
    #[serde(default)]
    pub id: String,
    /// Message role.
    pub role: MessageRole,
    /// Ordered message parts.
    #[serde(default)]
    pub parts: Vec<Part>,
    /// Opaque metadata attached by the server or the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

impl Message {
    /// Creates a new message with no parts.
    #[must_use]
    pub fn new(role: MessageRole, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            parts: Vec::new(),
            metadata: None,
        }
    }

    /// Creates a user message holding a single text part.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, "").with_part(Part::text(text))
    }

    /// Creates an assistant message holding a single text part.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, "").with_part(Part::text(text))
    }

    /// Creates a system message holding a single text part.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, "").with_part(Part::text(text))
    }

    /// Appends a part.
    #[must_use]
    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Concatenation of all text parts, in order.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool calls in this message that have no outcome yet.
    ///
    /// A call counts as resolved when a `tool-result` part answers it or when
    /// the invocation part itself already carries its output.
    #[must_use]
    pub fn pending_tool_calls(&self) -> Vec<ToolCall> {
        self.parts
            .iter()
            .filter_map(Part::tool_invocation)
            .filter(|invocation| invocation.outcome.is_none())
            .map(|invocation| invocation.call)
            .filter(|call| !self.has_tool_result(&call.id))
            .collect()
    }

    fn has_tool_result(&self, id: &str) -> bool {
        self.parts.iter().any(|part| {
            matches!(part, Part::ToolResult { tool_call_id, .. } if tool_call_id == id)
        })
    }
}

/// One typed fragment of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    /// Plain text.
    Text { text: String },
    /// Model reasoning output.
    Reasoning { text: String },
    /// A model-requested tool invocation.
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        input: JsonValue,
    },
    /// The outcome of a tool invocation.
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        output: JsonValue,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Structured report of errors found in generated code.
    #[serde(rename = "data-report-errors")]
    ReportErrors { data: ErrorReport },
    /// Any other part, kept verbatim. Covers step markers, data parts and the
    /// UI's own `tool-<name>` invocation parts.
    #[serde(untagged)]
    Other(JsonValue),
}

impl Part {
    /// Creates a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a tool-result part from an executed call.
    #[must_use]
    pub fn tool_result(call: &ToolCall, result: &ToolResult) -> Self {
        Self::ToolResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: result.to_model_value(),
            is_error: !result.is_success(),
        }
    }

    /// Returns true if the model can consume this part without rewriting.
    #[must_use]
    pub fn is_model_consumable(&self) -> bool {
        !matches!(self, Self::ReportErrors { .. })
    }

    /// The `type` tag of a part kept verbatim.
    #[must_use]
    pub fn other_type(&self) -> Option<&str> {
        match self {
            Self::Other(raw) => raw.get("type").and_then(JsonValue::as_str),
            _ => None,
        }
    }

    /// Reads this part as a tool invocation.
    ///
    /// Besides `tool-call` parts this understands the UI's `tool-<name>` and
    /// `dynamic-tool` parts, whose `state` tells whether the output is
    /// already known.
    #[must_use]
    pub fn tool_invocation(&self) -> Option<ToolInvocation> {
        match self {
            Self::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => Some(ToolInvocation {
                call: ToolCall::new(tool_call_id.clone(), tool_name.clone(), input.clone()),
                outcome: None,
            }),
            Self::Other(raw) => ui_tool_invocation(raw),
            _ => None,
        }
    }
}

fn ui_tool_invocation(raw: &JsonValue) -> Option<ToolInvocation> {
    let kind = raw.get("type")?.as_str()?;
    let name = match kind {
        "dynamic-tool" => raw.get("toolName")?.as_str()?,
        // Malformed parts of our own kinds never count as UI invocations.
        "tool-call" | "tool-result" => return None,
        _ => kind.strip_prefix("tool-")?,
    };
    let id = raw.get("toolCallId")?.as_str()?;
    let input = raw.get("input").cloned().unwrap_or(JsonValue::Null);

    let outcome = match raw.get("state").and_then(JsonValue::as_str) {
        Some("output-available") => Some(ToolResult::success(
            raw.get("output").cloned().unwrap_or(JsonValue::Null),
        )),
        Some("output-error") => Some(ToolResult::failure(
            raw.get("errorText")
                .and_then(JsonValue::as_str)
                .unwrap_or("tool execution failed"),
        )),
        _ => None,
    };
    Some(ToolInvocation {
        call: ToolCall::new(id, name, input),
        outcome,
    })
}

/// A tool invocation read from a message part.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// The requested call.
    pub call: ToolCall,
    /// The outcome, when the part already carries it.
    pub outcome: Option<ToolResult>,
}

/// Payload of an error report part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Summary of the errors.
    pub summary: String,
    /// Files that may contain the errors.
    #[serde(default)]
    pub paths: Vec<String>,
}

/// A tool call made by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// The tool name.
    pub name: String,
    /// Arguments for the tool.
    pub arguments: JsonValue,
}

impl ToolCall {
    /// Creates a new tool call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: JsonValue) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The result value.
    pub result: JsonValue,
    /// Error message if the tool failed.
    pub error: Option<String>,
}

impl ToolResult {
    /// Creates a successful tool result.
    #[must_use]
    pub fn success(result: JsonValue) -> Self {
        Self {
            result,
            error: None,
        }
    }

    /// Creates a failed tool result.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            result: JsonValue::Null,
            error: Some(error.into()),
        }
    }

    /// Returns true if the tool call succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The value fed back to the model for this result.
    #[must_use]
    pub fn to_model_value(&self) -> JsonValue {
        match &self.error {
            Some(error) => serde_json::json!({ "error": error }),
            None => self.result.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_creation() {
        let msg = Message::user("Hello!");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.text(), "Hello!");
    }

    #[test]
    fn text_concatenates_parts_in_order() {
        let msg = Message::new(MessageRole::Assistant, "m1")
            .with_part(Part::text("Hello, "))
            .with_part(Part::Reasoning {
                text: "thinking".to_string(),
            })
            .with_part(Part::text("world"));
        assert_eq!(msg.text(), "Hello, world");
    }

    #[test]
    fn parses_client_parts() {
        let raw = json!({
            "id": "abc",
            "role": "user",
            "parts": [
                { "type": "text", "text": "Build it" },
                { "type": "data-report-errors", "data": { "summary": "boom", "paths": ["a.ts"] } },
                { "type": "tool-call", "toolCallId": "c1", "toolName": "search", "input": { "q": 1 } }
            ]
        });
        let msg: Message = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(msg.parts.len(), 3);
        assert_eq!(
            msg.parts[1],
            Part::ReportErrors {
                data: ErrorReport {
                    summary: "boom".to_string(),
                    paths: vec!["a.ts".to_string()],
                }
            }
        );
        assert!(!msg.parts[1].is_model_consumable());
    }

    #[test]
    fn error_report_paths_default_to_empty() {
        let part: Part = serde_json::from_value(json!({
            "type": "data-report-errors",
            "data": { "summary": "boom" }
        }))
        .expect("deserialize");
        match part {
            Part::ReportErrors { data } => assert!(data.paths.is_empty()),
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn unknown_parts_are_kept_verbatim() {
        let raw = json!({
            "id": "a1",
            "role": "assistant",
            "parts": [
                { "type": "step-start" },
                { "type": "text", "text": "Hello!", "state": "done" },
                { "type": "source-url", "sourceId": "s1", "url": "https://example.com" }
            ]
        });
        let msg: Message = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(msg.parts[0], Part::Other(json!({ "type": "step-start" })));
        assert_eq!(msg.parts[1], Part::text("Hello!"));
        assert_eq!(msg.parts[2].other_type(), Some("source-url"));
        assert_eq!(msg.text(), "Hello!");

        let json = serde_json::to_value(&msg.parts[2]).expect("serialize");
        assert_eq!(json["url"], "https://example.com");
    }

    #[test]
    fn ui_tool_parts_read_as_invocations() {
        let done = Part::Other(json!({
            "type": "tool-get_cloud_resources",
            "toolCallId": "c1",
            "state": "output-available",
            "input": { "service": "s3" },
            "output": { "buckets": 2 }
        }));
        let invocation = done.tool_invocation().expect("invocation");
        assert_eq!(invocation.call.name, "get_cloud_resources");
        assert_eq!(invocation.call.arguments, json!({ "service": "s3" }));
        assert_eq!(invocation.outcome, Some(ToolResult::success(json!({ "buckets": 2 }))));

        let failed = Part::Other(json!({
            "type": "dynamic-tool",
            "toolName": "search",
            "toolCallId": "c2",
            "state": "output-error",
            "errorText": "timeout"
        }));
        let invocation = failed.tool_invocation().expect("invocation");
        assert_eq!(invocation.call.name, "search");
        assert_eq!(invocation.outcome, Some(ToolResult::failure("timeout")));

        assert!(Part::Other(json!({ "type": "step-start" })).tool_invocation().is_none());
    }

    #[test]
    fn interrupted_ui_tool_part_is_pending() {
        let msg = Message::new(MessageRole::Assistant, "a1")
            .with_part(Part::Other(json!({
                "type": "tool-get_cloud_resources",
                "toolCallId": "c1",
                "state": "input-available",
                "input": {}
            })))
            .with_part(Part::Other(json!({
                "type": "tool-get_cloud_resources",
                "toolCallId": "c2",
                "state": "output-available",
                "input": {},
                "output": []
            })));
        let pending = msg.pending_tool_calls();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "c1");
    }

    #[test]
    fn pending_tool_calls_skip_resolved_calls() {
        let msg = Message::new(MessageRole::Assistant, "m1")
            .with_part(Part::ToolCall {
                tool_call_id: "c1".to_string(),
                tool_name: "search".to_string(),
                input: json!({}),
            })
            .with_part(Part::ToolCall {
                tool_call_id: "c2".to_string(),
                tool_name: "fetch".to_string(),
                input: json!({"url": "x"}),
            })
            .with_part(Part::ToolResult {
                tool_call_id: "c1".to_string(),
                tool_name: "search".to_string(),
                output: json!([]),
                is_error: false,
            });

        let pending = msg.pending_tool_calls();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "c2");
        assert_eq!(pending[0].name, "fetch");
    }

    #[test]
    fn tool_result_failure_feeds_error_to_model() {
        let result = ToolResult::failure("Connection timeout");
        assert!(!result.is_success());
        assert_eq!(result.to_model_value(), json!({"error": "Connection timeout"}));

        let call = ToolCall::new("c1", "search", json!({}));
        match Part::tool_result(&call, &result) {
            Part::ToolResult { is_error, .. } => assert!(is_error),
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn tool_result_part_omits_false_error_flag() {
        let call = ToolCall::new("c1", "search", json!({}));
        let part = Part::tool_result(&call, &ToolResult::success(json!({"answer": 42})));
        let json = serde_json::to_value(&part).expect("serialize");
        assert_eq!(json["type"], "tool-result");
        assert_eq!(json["toolCallId"], "c1");
        assert!(json.get("isError").is_none());
    }
}
