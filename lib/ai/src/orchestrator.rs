//! Streaming orchestrator.
//!
//! Drives one chat run: validates the request, then alternates between
//! streaming a model turn and executing the tools that turn requested,
//! until the model stops calling tools or the step budget runs out.
//!
//! ```text
//! validating ──► streaming ◄──► tool-pending
//!     │              │
//!     ▼              ▼
//!   failed      done | failed | cancelled
//! ```
//!
//! Validation failures are returned as a [`ChatError`] and no stream is
//! created. Once a run is spawned, everything it produces goes through the
//! [`PartStream`](crate::stream::PartStream), including late errors.

use crate::backend::{ChunkStream, InferenceRequest, LlmBackend, StreamChunk, to_model_messages};
use crate::error::{ChatError, LlmError};
use crate::models::{DEFAULT_MODEL, ModelDescriptor, find_model};
use crate::options::{ProviderOptions, ReasoningEffort, ResolveOptions, resolve};
use crate::stream::{MessageMetadata, PartStream, PartWriter, StreamClosed, UiEvent, channel};
use atelier_conversation::{
    Conversation, Message, MessageRole, Part, ToolCall, ToolRegistry, normalize,
};
use atelier_core::{ChatRunId, MessageId};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Default cap on tool executions per run.
pub const DEFAULT_MAX_STEPS: u32 = 20;

const MISSING_CREDENTIAL: &str =
    "OpenAI API key not configured. Please add OPENAI_API_KEY to environment variables.";

/// Inbound chat request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The conversation so far, oldest first.
    pub messages: Conversation,
    /// Requested model; the default model when absent.
    #[serde(default)]
    pub model_id: Option<String>,
    /// Overrides the reasoning effort of reasoning models.
    #[serde(default)]
    pub reasoning_effort: Option<ReasoningEffort>,
}

/// Request-scoped run configuration.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Whether a model credential is available.
    pub credential_configured: bool,
    /// System prompt sent with every model turn.
    pub system_prompt: String,
    /// Maximum tool executions per run.
    pub max_steps: u32,
    /// Output channel capacity.
    pub stream_buffer: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            credential_configured: false,
            system_prompt: String::new(),
            max_steps: DEFAULT_MAX_STEPS,
            stream_buffer: 64,
        }
    }
}

/// Hard cap on tool executions in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepBudget {
    limit: u32,
    used: u32,
}

impl StepBudget {
    /// Creates a budget allowing `limit` steps.
    #[must_use]
    pub const fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    /// Takes one step. Returns `false` once the budget is spent.
    pub fn try_consume(&mut self) -> bool {
        if self.used >= self.limit {
            return false;
        }
        self.used += 1;
        true
    }

    /// Steps taken so far.
    #[must_use]
    pub const fn used(&self) -> u32 {
        self.used
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    /// Checking credentials and the requested model.
    Validating,
    /// A model turn is being streamed.
    Streaming,
    /// Tools requested by the last turn are executing.
    ToolPending,
    /// Finished normally, possibly truncated by the step budget.
    Done,
    /// Stopped by an error.
    Failed,
    /// The client went away.
    Cancelled,
}

/// Final report of a spawned run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Terminal state.
    pub state: RunState,
    /// Tool executions performed.
    pub steps_used: u32,
    /// Whether the run stopped because the budget ran out.
    pub truncated: bool,
    /// The conversation as the model last saw it, plus the final turn.
    pub conversation: Conversation,
}

/// A started run.
#[derive(Debug)]
pub struct ChatRun {
    /// Identifies the run in logs.
    pub id: ChatRunId,
    /// The model serving the run.
    pub model: ModelDescriptor,
    /// Ordered UI events; closes when the run ends.
    pub stream: PartStream,
    /// Resolves to the outcome once the run has ended.
    pub handle: JoinHandle<RunOutcome>,
}

/// Runs chat requests against one backend and tool set.
#[derive(Clone)]
pub struct ChatOrchestrator {
    backend: Arc<dyn LlmBackend>,
    tools: Arc<ToolRegistry>,
    settings: RunSettings,
}

impl ChatOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, tools: Arc<ToolRegistry>, settings: RunSettings) -> Self {
        Self {
            backend,
            tools,
            settings,
        }
    }

    /// Validates a request and starts its run.
    ///
    /// When the conversation has no pending tool calls the first model turn
    /// is opened before returning, so upstream rejections surface here as
    /// errors rather than inside the stream.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError`] if validation fails or the upstream rejects
    /// the first turn.
    #[tracing::instrument(skip_all, fields(model_id = request.model_id.as_deref().unwrap_or(DEFAULT_MODEL.id())))]
    pub async fn start(
        &self,
        request: ChatRequest,
        models: &[ModelDescriptor],
    ) -> Result<ChatRun, ChatError> {
        if !self.settings.credential_configured {
            tracing::warn!("rejecting chat request: no model credential configured");
            return Err(ChatError::Configuration {
                reason: MISSING_CREDENTIAL.to_string(),
            });
        }

        let model_id = request
            .model_id
            .unwrap_or_else(|| DEFAULT_MODEL.id().to_string());
        let Some(model) = find_model(models, &model_id).cloned() else {
            tracing::info!(%model_id, "rejecting chat request: unknown model");
            return Err(ChatError::ModelNotFound {
                requested: model_id,
                available: models.iter().map(|m| m.id.clone()).collect(),
            });
        };

        let conversation = normalize(&request.messages);
        let options = resolve(
            &model.id,
            ResolveOptions {
                reasoning_effort: request.reasoning_effort,
            },
        );
        let pending = conversation
            .last()
            .map(Message::pending_tool_calls)
            .unwrap_or_default();

        let first_turn = if pending.is_empty() {
            let inference = self.inference_request(&options, &conversation);
            let stream = self.backend.stream(&inference).await.map_err(|report| {
                let error = ChatError::from(report.current_context());
                tracing::warn!(error = %report, kind = %error.kind(), "upstream rejected first turn");
                error
            })?;
            Some(stream)
        } else {
            None
        };

        let id = ChatRunId::new();
        let (writer, stream) = channel(self.settings.stream_buffer);
        let run = Run {
            backend: Arc::clone(&self.backend),
            tools: Arc::clone(&self.tools),
            system_prompt: self.settings.system_prompt.clone(),
            options,
            model: model.clone(),
            conversation,
            budget: StepBudget::new(self.settings.max_steps),
            writer,
            state: RunState::Validating,
            truncated: false,
        };
        let span = tracing::info_span!("chat_run", run_id = %id, model_id = %model.id);
        let handle = tokio::spawn(run.drive(pending, first_turn).instrument(span));

        Ok(ChatRun {
            id,
            model,
            stream,
            handle,
        })
    }

    fn inference_request(&self, options: &ProviderOptions, conversation: &[Message]) -> InferenceRequest {
        build_inference(
            options,
            &self.settings.system_prompt,
            conversation,
            &self.tools,
        )
    }
}

fn build_inference(
    options: &ProviderOptions,
    system_prompt: &str,
    conversation: &[Message],
    tools: &ToolRegistry,
) -> InferenceRequest {
    let mut request = InferenceRequest::new(options.clone(), to_model_messages(conversation))
        .with_tools(tools.definitions());
    if !system_prompt.is_empty() {
        request = request.with_system(system_prompt);
    }
    request
}

/// Why a run stopped early.
enum Halt {
    Cancelled,
    Failed(ChatError),
}

impl From<StreamClosed> for Halt {
    fn from(_: StreamClosed) -> Self {
        Self::Cancelled
    }
}

/// What one model turn produced.
#[derive(Default)]
struct Turn {
    reasoning: String,
    text: String,
    calls: Vec<ToolCall>,
}

impl Turn {
    fn into_message(self) -> Message {
        let mut message = Message::new(MessageRole::Assistant, MessageId::new().to_string());
        if !self.reasoning.is_empty() {
            message.parts.push(Part::Reasoning {
                text: self.reasoning,
            });
        }
        if !self.text.is_empty() {
            message.parts.push(Part::text(self.text));
        }
        message.parts.extend(self.calls.into_iter().map(|call| Part::ToolCall {
            tool_call_id: call.id,
            tool_name: call.name,
            input: call.arguments,
        }));
        message
    }
}

struct Run {
    backend: Arc<dyn LlmBackend>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    options: ProviderOptions,
    model: ModelDescriptor,
    conversation: Conversation,
    budget: StepBudget,
    writer: PartWriter,
    state: RunState,
    truncated: bool,
}

impl Run {
    fn enter(&mut self, state: RunState) {
        tracing::debug!(from = ?self.state, to = ?state, "run state changed");
        self.state = state;
    }

    async fn drive(mut self, pending: Vec<ToolCall>, first_turn: Option<ChunkStream>) -> RunOutcome {
        let result = self.steps(pending, first_turn).await;
        let state = match result {
            Ok(()) => self.finish().await,
            Err(Halt::Cancelled) => RunState::Cancelled,
            Err(Halt::Failed(error)) => {
                tracing::warn!(%error, kind = %error.kind(), "chat run failed after streaming started");
                // The consumer may already be gone; nothing else to do then.
                let _ = self.writer.close_block().await;
                let _ = self
                    .writer
                    .send(UiEvent::Error {
                        error_text: error.to_string(),
                    })
                    .await;
                RunState::Failed
            }
        };

        self.enter(state);
        if state == RunState::Cancelled {
            tracing::info!(steps_used = self.budget.used(), "client disconnected, run cancelled");
        } else {
            tracing::info!(
                state = ?state,
                steps_used = self.budget.used(),
                truncated = self.truncated,
                "chat run finished"
            );
        }
        RunOutcome {
            state,
            steps_used: self.budget.used(),
            truncated: self.truncated,
            conversation: self.conversation,
        }
    }

    async fn steps(
        &mut self,
        pending: Vec<ToolCall>,
        mut first_turn: Option<ChunkStream>,
    ) -> Result<(), Halt> {
        self.writer
            .send(UiEvent::Start {
                message_id: MessageId::new(),
                message_metadata: self.metadata(),
            })
            .await?;

        if !pending.is_empty() {
            let last = self.conversation.len() - 1;
            if !self.execute_tools(&pending, last).await? {
                return Ok(());
            }
        }

        loop {
            self.enter(RunState::Streaming);
            let stream = match first_turn.take() {
                Some(stream) => stream,
                None => self.open_turn().await?,
            };

            self.writer.send(UiEvent::StartStep).await?;
            let turn = self.consume_turn(stream).await?;
            self.writer.close_block().await?;
            self.writer.send(UiEvent::FinishStep).await?;

            let calls = turn.calls.clone();
            self.conversation.push(turn.into_message());
            if calls.is_empty() {
                return Ok(());
            }

            let last = self.conversation.len() - 1;
            if !self.execute_tools(&calls, last).await? {
                return Ok(());
            }
        }
    }

    async fn open_turn(&self) -> Result<ChunkStream, Halt> {
        let request = build_inference(
            &self.options,
            &self.system_prompt,
            &self.conversation,
            &self.tools,
        );
        tokio::select! {
            biased;
            () = self.writer.cancelled() => Err(Halt::Cancelled),
            opened = self.backend.stream(&request) => opened.map_err(|report| {
                Halt::Failed(ChatError::from(report.current_context()))
            }),
        }
    }

    async fn consume_turn(&mut self, mut stream: ChunkStream) -> Result<Turn, Halt> {
        let mut turn = Turn::default();
        loop {
            let next = tokio::select! {
                biased;
                () = self.writer.cancelled() => return Err(Halt::Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(StreamChunk::TextDelta(delta))) => {
                    turn.text.push_str(&delta);
                    self.writer.text_delta(delta).await?;
                }
                Some(Ok(StreamChunk::ReasoningDelta(delta))) => {
                    turn.reasoning.push_str(&delta);
                    self.writer.reasoning_delta(delta).await?;
                }
                Some(Ok(StreamChunk::ToolCall(call))) => {
                    self.writer.close_block().await?;
                    self.writer
                        .send(UiEvent::ToolInputAvailable {
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            input: call.arguments.clone(),
                        })
                        .await?;
                    turn.calls.push(call);
                }
                Some(Ok(StreamChunk::Finish { reason, usage })) => {
                    tracing::debug!(
                        ?reason,
                        total_tokens = usage.map(|usage| usage.total()),
                        "model turn finished"
                    );
                    return Ok(turn);
                }
                Some(Err(error)) => return Err(Halt::Failed(ChatError::from(&error))),
                None => {
                    return Err(Halt::Failed(ChatError::from(&LlmError::StreamInterrupted {
                        reason: "model stream ended without a finish event".to_string(),
                    })));
                }
            }
        }
    }

    /// Executes `calls` one at a time and appends each result to the message
    /// at `target`. Returns `false` if the budget ran out.
    async fn execute_tools(&mut self, calls: &[ToolCall], target: usize) -> Result<bool, Halt> {
        self.enter(RunState::ToolPending);
        for call in calls {
            if !self.budget.try_consume() {
                tracing::info!(
                    limit = self.budget.used(),
                    tool = %call.name,
                    "step budget exhausted, truncating run"
                );
                self.truncated = true;
                return Ok(false);
            }

            let result = tokio::select! {
                biased;
                () = self.writer.cancelled() => return Err(Halt::Cancelled),
                result = self.tools.execute(call) => result,
            };

            let event = match &result.error {
                None => UiEvent::ToolOutputAvailable {
                    tool_call_id: call.id.clone(),
                    output: result.result.clone(),
                },
                Some(error) => UiEvent::ToolOutputError {
                    tool_call_id: call.id.clone(),
                    error_text: error.clone(),
                },
            };
            if let Some(message) = self.conversation.get_mut(target) {
                message.parts.push(Part::tool_result(call, &result));
            }
            self.writer.send(event).await?;
        }
        Ok(true)
    }

    async fn finish(&mut self) -> RunState {
        let sent = self
            .writer
            .send(UiEvent::Finish {
                message_metadata: self.metadata(),
            })
            .await;
        match sent {
            Ok(()) => RunState::Done,
            Err(StreamClosed) => RunState::Cancelled,
        }
    }

    fn metadata(&self) -> MessageMetadata {
        MessageMetadata {
            model: self.model.name.clone(),
        }
    }
}
