//! OpenAI-compatible streaming backend.
//!
//! Talks to `{base_url}/chat/completions` with `stream: true`, either
//! directly against OpenAI or through a gateway that fronts many providers.
//! Server-sent events are decoded into [`StreamChunk`]s; tool-call argument
//! fragments are buffered per call index and emitted once the model finishes
//! its turn.

use crate::backend::{
    ChunkStream, InferenceRequest, LlmBackend, LlmMessage, LlmRole, StreamChunk, TokenUsage,
};
use crate::error::LlmError;
use crate::options::{ProviderOptionBag, ReasoningEffort, ServiceTier};
use async_trait::async_trait;
use atelier_conversation::ToolCall;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

const DONE_SENTINEL: &str = "[DONE]";
const BILLING_MARKERS: &[&str] = &["insufficient_quota", "insufficient_funds"];

/// How requests are shaped for the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// OpenAI itself: provider options become top-level request fields.
    Direct,
    /// A multi-provider gateway: provider options are forwarded verbatim.
    Gateway,
}

/// Streaming chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    flavor: ApiFlavor,
    timeout: Duration,
}

impl OpenAiCompatibleBackend {
    /// Creates a backend for the given endpoint.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        flavor: ApiFlavor,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            flavor,
            timeout: Duration::from_secs(120),
        }
    }

    /// Sets how long to wait for the response headers.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    #[tracing::instrument(skip_all, fields(provider = self.provider(), model = %request.options.model))]
    async fn stream(&self, request: &InferenceRequest) -> atelier_core::Result<ChunkStream, LlmError> {
        let body = CompletionRequest::build(request, self.flavor);
        let mut builder = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body);
        for (name, value) in &request.options.headers {
            builder = builder.header(name, value);
        }

        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::ProviderUnavailable {
                        provider: self.provider().to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok());
            let body = response.text().await.unwrap_or_default();
            let error = classify_failure(status.as_u16(), retry_after, &body);
            tracing::warn!(status = status.as_u16(), %error, "upstream rejected completion request");
            return Err(error.into());
        }

        tracing::debug!("completion stream opened");
        Ok(decode_events(response.bytes_stream().eventsource().boxed()))
    }

    fn provider(&self) -> &str {
        match self.flavor {
            ApiFlavor::Direct => "openai",
            ApiFlavor::Gateway => "gateway",
        }
    }
}

/// Maps a failed upstream response to an [`LlmError`].
#[must_use]
pub fn classify_failure(status: u16, retry_after_secs: Option<u64>, body: &str) -> LlmError {
    let reason = error_message(body);
    if status == 402 || BILLING_MARKERS.iter().any(|marker| body.contains(marker)) {
        return LlmError::BillingRequired { reason };
    }
    if status == 429 {
        return LlmError::RateLimited { retry_after_secs };
    }
    LlmError::RequestFailed {
        reason: format!("HTTP {status}: {reason}"),
    }
}

fn classify_stream_error(error: &JsonValue) -> LlmError {
    let body = serde_json::json!({ "error": error }).to_string();
    let reason = error_message(&body);
    if BILLING_MARKERS.iter().any(|marker| body.contains(marker)) {
        LlmError::BillingRequired { reason }
    } else {
        LlmError::RequestFailed { reason }
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|json| {
            let error = json.get("error")?;
            error
                .get("message")
                .and_then(JsonValue::as_str)
                .or_else(|| error.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().chars().take(512).collect())
}

// ---- request body ----

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    stream_options: StreamOptions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_tier: Option<ServiceTier>,
    #[serde(rename = "providerOptions", skip_serializing_if = "Option::is_none")]
    provider_options: Option<&'a ProviderOptionBag>,
}

impl<'a> CompletionRequest<'a> {
    fn build(request: &'a InferenceRequest, flavor: ApiFlavor) -> Self {
        let system = request.system.as_deref().map(|content| WireMessage {
            role: LlmRole::System,
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: None,
        });
        let messages = system
            .into_iter()
            .chain(request.messages.iter().map(WireMessage::from))
            .collect();
        let tools = request
            .tools
            .iter()
            .map(|tool| WireTool {
                kind: "function",
                function: WireFunction {
                    name: &tool.name,
                    description: &tool.description,
                    parameters: &tool.input_schema,
                },
            })
            .collect();

        let options = &request.options;
        let (reasoning_effort, service_tier, provider_options) = match flavor {
            ApiFlavor::Direct => (options.reasoning_effort(), options.service_tier(), None),
            ApiFlavor::Gateway => (None, None, options.provider.as_ref()),
        };

        Self {
            model: &options.model,
            messages,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
            tools,
            reasoning_effort,
            service_tier,
            provider_options,
        }
    }
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: LlmRole,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a LlmMessage> for WireMessage<'a> {
    fn from(message: &'a LlmMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.as_deref(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: &call.id,
                    kind: "function",
                    function: WireFunctionCall {
                        name: &call.name,
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a JsonValue,
}

// ---- response stream ----

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Default)]
struct ToolCallAccumulator {
    by_index: BTreeMap<usize, PartialToolCall>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallAccumulator {
    fn merge(&mut self, delta: ToolCallDelta) {
        let entry = self.by_index.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            entry.id = Some(id);
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                entry.name = Some(name);
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    fn drain(&mut self) -> Result<Vec<ToolCall>, LlmError> {
        let entries = std::mem::take(&mut self.by_index);
        let mut calls = Vec::with_capacity(entries.len());
        for (index, entry) in entries {
            let id = entry.id.ok_or_else(|| LlmError::ResponseParseFailed {
                reason: format!("streamed tool call at index {index} is missing an id"),
            })?;
            let name = entry.name.ok_or_else(|| LlmError::ResponseParseFailed {
                reason: format!("streamed tool call at index {index} is missing a function name"),
            })?;
            let raw = if entry.arguments.trim().is_empty() {
                "{}"
            } else {
                entry.arguments.as_str()
            };
            // Unparseable arguments are passed on as a string so the tool can
            // reject them and the model sees why.
            let arguments = serde_json::from_str(raw).unwrap_or_else(|error| {
                tracing::warn!(tool = %name, %error, "tool call arguments are not valid JSON");
                JsonValue::String(raw.to_string())
            });
            calls.push(ToolCall::new(id, name, arguments));
        }
        Ok(calls)
    }
}

/// Incremental decoder for chat-completion SSE payloads.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    tool_calls: ToolCallAccumulator,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
    done: bool,
}

impl ChunkDecoder {
    /// Creates a decoder for one model turn.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal `[DONE]` event has been seen.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decodes one SSE `data` payload.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed payloads and in-band upstream errors.
    pub fn decode(&mut self, data: &str) -> Result<Vec<StreamChunk>, LlmError> {
        if self.done {
            return Ok(Vec::new());
        }
        if data.trim() == DONE_SENTINEL {
            return self.finish();
        }

        let chunk: CompletionChunk =
            serde_json::from_str(data).map_err(|e| LlmError::ResponseParseFailed {
                reason: format!("{e}, data: {data}"),
            })?;
        if let Some(error) = chunk.error {
            return Err(classify_stream_error(&error));
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        let mut out = Vec::new();
        for choice in chunk.choices {
            let delta = choice.delta.unwrap_or_default();
            if let Some(reasoning) = delta.reasoning_content.or(delta.reasoning) {
                if !reasoning.is_empty() {
                    out.push(StreamChunk::ReasoningDelta(reasoning));
                }
            }
            if let Some(content) = delta.content {
                if !content.is_empty() {
                    out.push(StreamChunk::TextDelta(content));
                }
            }
            for call in delta.tool_calls {
                self.tool_calls.merge(call);
            }
            if let Some(reason) = choice.finish_reason {
                out.extend(self.tool_calls.drain()?.into_iter().map(StreamChunk::ToolCall));
                self.finish_reason = Some(reason);
            }
        }
        Ok(out)
    }

    /// Handles the end of the byte stream.
    ///
    /// A stream that closes after a finish reason but without `[DONE]` is
    /// accepted; one that closes mid-turn is an error.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::StreamInterrupted`] if the turn never finished.
    pub fn end_of_stream(&mut self) -> Result<Vec<StreamChunk>, LlmError> {
        if self.done {
            return Ok(Vec::new());
        }
        if self.finish_reason.is_none() {
            return Err(LlmError::StreamInterrupted {
                reason: "stream closed before the model finished".to_string(),
            });
        }
        self.finish()
    }

    fn finish(&mut self) -> Result<Vec<StreamChunk>, LlmError> {
        self.done = true;
        let mut out: Vec<StreamChunk> = self
            .tool_calls
            .drain()?
            .into_iter()
            .map(StreamChunk::ToolCall)
            .collect();
        out.push(StreamChunk::Finish {
            reason: self.finish_reason.take(),
            usage: self.usage.take(),
        });
        Ok(out)
    }
}

type EventStream = BoxStream<'static, Result<Event, EventStreamError<reqwest::Error>>>;

struct DecodeState {
    events: EventStream,
    decoder: ChunkDecoder,
    queued: VecDeque<StreamChunk>,
    finished: bool,
}

fn decode_events(events: EventStream) -> ChunkStream {
    let state = DecodeState {
        events,
        decoder: ChunkDecoder::new(),
        queued: VecDeque::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.queued.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }
            let decoded = match state.events.next().await {
                Some(Ok(event)) => state.decoder.decode(&event.data),
                Some(Err(error)) => Err(LlmError::StreamInterrupted {
                    reason: error.to_string(),
                }),
                None => state.decoder.end_of_stream(),
            };
            match decoded {
                Ok(chunks) => {
                    state.queued.extend(chunks);
                    state.finished = state.decoder.is_done();
                }
                Err(error) => {
                    tracing::warn!(%error, "completion stream failed");
                    state.finished = true;
                    return Some((Err(error), state));
                }
            }
        }
    })
    .boxed()
}
