//! LLM backend abstraction.
//!
//! Provides a unified streaming interface over model providers. A backend
//! turns an [`InferenceRequest`] into a stream of [`StreamChunk`]s; tool-call
//! fragments are assembled by the backend so the stream only ever yields
//! complete calls.

use crate::error::LlmError;
use crate::options::ProviderOptions;
use async_trait::async_trait;
use atelier_conversation::{Message, MessageRole, Part, ToolCall, ToolDefinition};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// The role of a message sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    /// System message.
    System,
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
    /// Tool result message.
    Tool,
}

/// A message in model-facing form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    /// The role of the message sender.
    pub role: LlmRole,
    /// Text content.
    pub content: Option<String>,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The call answered by a tool message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl LlmMessage {
    fn with_role(role: LlmRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(LlmRole::System, content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(LlmRole::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(LlmRole::Assistant, content)
    }

    /// Creates an assistant message carrying tool calls.
    #[must_use]
    pub fn assistant_with_tool_calls(content: String, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: LlmRole::Assistant,
            content: (!content.is_empty()).then_some(content),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Creates a tool result message.
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Converts a normalized conversation into model messages.
///
/// Only text is sent for user and system messages. An assistant message is
/// split at every answered tool round, so the model sees its text, calls and
/// their results in the order they happened. Calls without a result, reasoning
/// and unrecognized parts are not sent.
#[must_use]
pub fn to_model_messages(conversation: &[Message]) -> Vec<LlmMessage> {
    let mut messages = Vec::with_capacity(conversation.len());
    for message in conversation {
        match message.role {
            MessageRole::System => messages.push(LlmMessage::system(message.text())),
            MessageRole::User => messages.push(LlmMessage::user(message.text())),
            MessageRole::Assistant => push_assistant(message, &mut messages),
        }
    }
    messages
}

/// Tool outputs of a message keyed by call id, wherever they appear in it.
fn tool_outcomes(message: &Message) -> HashMap<&str, JsonValue> {
    let mut outcomes = HashMap::new();
    for part in &message.parts {
        match part {
            Part::ToolResult {
                tool_call_id,
                output,
                ..
            } => {
                outcomes.entry(tool_call_id.as_str()).or_insert_with(|| output.clone());
            }
            Part::Other(_) => {
                let outcome = part.tool_invocation().and_then(|invocation| invocation.outcome);
                if let (Some(id), Some(outcome)) = (tool_call_id(part), outcome) {
                    outcomes.entry(id).or_insert_with(|| outcome.to_model_value());
                }
            }
            _ => {}
        }
    }
    outcomes
}

fn tool_call_id(part: &Part) -> Option<&str> {
    match part {
        Part::Other(raw) => raw.get("toolCallId").and_then(JsonValue::as_str),
        _ => None,
    }
}

/// One assistant turn: text and calls, followed by the calls' results.
#[derive(Default)]
struct Round {
    text: String,
    calls: Vec<ToolCall>,
    answered: bool,
}

impl Round {
    fn flush(&mut self, outcomes: &HashMap<&str, JsonValue>, messages: &mut Vec<LlmMessage>) {
        let round = std::mem::take(self);
        if round.text.is_empty() && round.calls.is_empty() {
            return;
        }
        let results: Vec<LlmMessage> = round
            .calls
            .iter()
            .filter_map(|call| {
                outcomes
                    .get(call.id.as_str())
                    .map(|output| LlmMessage::tool(call.id.clone(), output.to_string()))
            })
            .collect();
        messages.push(LlmMessage::assistant_with_tool_calls(round.text, round.calls));
        messages.extend(results);
    }
}

fn push_assistant(message: &Message, messages: &mut Vec<LlmMessage>) {
    let outcomes = tool_outcomes(message);
    let mut round = Round::default();
    for part in &message.parts {
        match part {
            Part::Text { text } => {
                if round.answered {
                    round.flush(&outcomes, messages);
                }
                round.text.push_str(text);
            }
            Part::ToolResult { tool_call_id, .. } => {
                if round.calls.iter().any(|call| &call.id == tool_call_id) {
                    round.answered = true;
                }
            }
            other => {
                let Some(invocation) = other.tool_invocation() else {
                    continue;
                };
                if !outcomes.contains_key(invocation.call.id.as_str()) {
                    continue;
                }
                if round.answered {
                    round.flush(&outcomes, messages);
                }
                round.answered |= invocation.outcome.is_some();
                round.calls.push(invocation.call);
            }
        }
    }
    round.flush(&outcomes, messages);
}

/// A streaming request to an LLM.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Resolved model id and request shaping.
    pub options: ProviderOptions,
    /// System prompt, if any.
    pub system: Option<String>,
    /// Conversation so far.
    pub messages: Vec<LlmMessage>,
    /// Tools the model may call.
    pub tools: Vec<ToolDefinition>,
}

impl InferenceRequest {
    /// Creates a new request for the given options and messages.
    #[must_use]
    pub fn new(options: ProviderOptions, messages: Vec<LlmMessage>) -> Self {
        Self {
            options,
            system: None,
            messages,
            tools: Vec::new(),
        }
    }

    /// Adds a system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Adds tool definitions.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens.
    pub input_tokens: u32,
    /// Number of output tokens.
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Returns the total number of tokens.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// One item of a model output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Incremental answer text.
    TextDelta(String),
    /// Incremental reasoning text.
    ReasoningDelta(String),
    /// A fully assembled tool call.
    ToolCall(ToolCall),
    /// End of this model turn.
    Finish {
        reason: Option<String>,
        usage: Option<TokenUsage>,
    },
}

/// A live model output stream.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, LlmError>>;

/// Trait for LLM backends.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Starts a streaming generation.
    ///
    /// Dropping the returned stream aborts the upstream request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected before streaming starts.
    async fn stream(&self, request: &InferenceRequest) -> atelier_core::Result<ChunkStream, LlmError>;

    /// Returns the provider name, for diagnostics.
    fn provider(&self) -> &str;
}
